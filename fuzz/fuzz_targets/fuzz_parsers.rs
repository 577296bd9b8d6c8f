//! Fuzz testing for the request and response parsers.
//!
//! Every function here sees untrusted input (response bodies, request paths,
//! operator-supplied configuration) and must never panic.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_parsers -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `rewrite_list_body`: list envelope detection and re-serialization
//! - `path_prefix`: metric label derivation, with and without a version prefix
//! - `StatusCodeMap` parsing and lookup

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use api_commons::db::StatusCodeMap;
use api_commons::middleware::{path_prefix, rewrite_list_body};

#[derive(Debug, Arbitrary)]
struct Input {
    body: Vec<u8>,
    path: String,
    version_prefix: Option<String>,
    status_map: String,
    code: String,
}

fuzz_target!(|input: Input| {
    if let Some(rewritten) = rewrite_list_body(&input.body) {
        // The rewritten body is always valid JSON
        assert!(serde_json::from_slice::<serde_json::Value>(&rewritten.body).is_ok());
    }

    let label = path_prefix(&input.path, input.version_prefix.as_deref());
    assert!(!label.is_empty());
    assert!(!label.contains('/'));

    if let Ok(map) = input.status_map.parse::<StatusCodeMap>() {
        let _ = map.status_for(&input.code);
    }
    let _ = StatusCodeMap::postgres().status_for(&input.code);
});


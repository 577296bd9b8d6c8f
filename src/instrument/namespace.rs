//! Namespaces of named operations and the instrumenter that times them.
//!
//! A [`Namespace`] is an explicit, ordered registration table. Each member
//! remembers the namespace that declared it, so members re-exported from
//! elsewhere are never timed twice under two different labels.
//!
//! ```rust,ignore
//! let mut orders = Namespace::new(module_path!())
//!     .define("list", Endpoint::new("/orders", get(list_orders)))
//!     .define("create", Endpoint::new("/orders", post(create_order)))
//!     .reexport("my_service::status", "health", Endpoint::new("/orders/health", get(health)));
//!
//! orders.instrument(&registry.call_durations()?, &[]);
//! let router = orders.into_router();
//! ```

use axum::Router;
use tracing::{debug, info};

use super::Instrument;
use super::endpoint::Endpoint;
use super::timer::{CallTimer, short_name};
use crate::metrics::HistogramFamily;

struct Member<Op> {
    name: String,
    declared_in: String,
    op: Op,
    instrumented: bool,
}

/// An ordered table of named operations belonging to one namespace.
pub struct Namespace<Op> {
    name: String,
    members: Vec<Member<Op>>,
}

impl<Op: Instrument> Namespace<Op> {
    /// Create an empty namespace. `name` is usually `module_path!()`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Full namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last segment of the namespace name, used in metric labels.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Register an operation declared in this namespace.
    ///
    /// Registering an existing name replaces the previous member.
    pub fn define(self, name: impl Into<String>, op: Op) -> Self {
        let declared_in = self.name.clone();
        self.insert(name.into(), declared_in, op)
    }

    /// Register an operation declared in another namespace.
    ///
    /// Re-exported members are never instrumented here; the declaring
    /// namespace owns their timing.
    pub fn reexport(self, declared_in: impl Into<String>, name: impl Into<String>, op: Op) -> Self {
        self.insert(name.into(), declared_in.into(), op)
    }

    fn insert(mut self, name: String, declared_in: String, op: Op) -> Self {
        let member = Member {
            name,
            declared_in,
            op,
            instrumented: false,
        };
        match self.members.iter_mut().find(|m| m.name == member.name) {
            Some(existing) => *existing = member,
            None => self.members.push(member),
        }
        self
    }

    /// Look up a member by name.
    pub fn get(&self, name: &str) -> Option<&Op> {
        self.members.iter().find(|m| m.name == name).map(|m| &m.op)
    }

    /// Whether the named member has been wrapped with a call timer.
    pub fn is_instrumented(&self, name: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.name == name && m.instrumented)
    }

    /// Member names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Wrap every eligible member with a [`CallTimer`] recording into `family`.
    ///
    /// A member is skipped when its name is in `exclude`, when it was declared
    /// in another namespace, or when it is already instrumented. Running this
    /// again is a no-op for members wrapped earlier.
    ///
    /// Returns the number of members wrapped by this call.
    pub fn instrument(&mut self, family: &HistogramFamily, exclude: &[&str]) -> usize {
        let mut wrapped = 0;
        let members = std::mem::take(&mut self.members);

        self.members = members
            .into_iter()
            .map(|mut member| {
                if member.instrumented
                    || member.declared_in != self.name
                    || exclude.iter().any(|excluded| *excluded == member.name)
                {
                    return member;
                }

                let timer = CallTimer::new(family, &self.name, &member.name);
                debug!(call = timer.label(), "Instrumenting operation");
                member.op = member.op.instrument(timer);
                member.instrumented = true;
                wrapped += 1;
                member
            })
            .collect();

        info!(
            namespace = %self.name,
            wrapped,
            total = self.members.len(),
            "Namespace instrumented"
        );
        wrapped
    }

    /// Consume the namespace, yielding `(name, op)` pairs in registration order.
    pub fn into_members(self) -> impl Iterator<Item = (String, Op)> {
        self.members.into_iter().map(|m| (m.name, m.op))
    }
}

/// Instrument several namespaces in order with the same rules.
///
/// Returns the total number of members wrapped.
pub fn instrument_all<'a, Op>(
    namespaces: impl IntoIterator<Item = &'a mut Namespace<Op>>,
    family: &HistogramFamily,
    exclude: &[&str],
) -> usize
where
    Op: Instrument + 'a,
{
    namespaces
        .into_iter()
        .map(|namespace| namespace.instrument(family, exclude))
        .sum()
}

impl<S> Namespace<Endpoint<S>>
where
    S: Clone + Send + Sync + 'static,
{
    /// Mount every endpoint on a new router.
    pub fn into_router(self) -> Router<S> {
        self.into_members()
            .fold(Router::new(), |router, (_, endpoint)| endpoint.mount(router))
    }
}

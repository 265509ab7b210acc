//! Discrete event keys.
//!
//! A discrete event is identified by a value from a closed set declared by the
//! host at startup. Any hashable, comparable type works as a key; enums that can
//! list their own variants implement [`EventDomain`] so a registry can be built
//! from the type alone.

use std::fmt::Debug;
use std::hash::Hash;

/// Marker for types usable as discrete event keys.
///
/// Blanket-implemented; keys are only ever compared and hashed.
pub trait EventKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> EventKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// A closed, enumerable set of event keys.
///
/// ```
/// use eventgate::EventDomain;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Lifecycle {
///     Started,
///     Stopped,
/// }
///
/// impl EventDomain for Lifecycle {
///     fn domain() -> Vec<Self> {
///         vec![Self::Started, Self::Stopped]
///     }
/// }
///
/// assert_eq!(Lifecycle::domain().len(), 2);
/// ```
pub trait EventDomain: EventKey {
    /// Every key in the domain, in declaration order.
    fn domain() -> Vec<Self>;
}

//! Identity-keyed predicates.
//!
//! A [`Predicate`] is a zero-argument boolean callable used as a registry key.
//! Equality and hashing use the [`PredicateId`] minted at construction, never
//! the callable's behaviour: two predicates with identical logic are distinct
//! unless one is a clone of the other.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateId(Uuid);

impl PredicateId {
    /// Create a new random predicate id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PredicateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PredicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A dynamic condition, re-evaluated on every poll.
#[derive(Clone)]
pub struct Predicate {
    id: PredicateId,
    label: Option<Arc<str>>,
    check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Predicate {
    /// Wrap a closure as a new, distinct predicate.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            id: PredicateId::new(),
            label: None,
            check: Arc::new(check),
        }
    }

    /// Like [`Predicate::new`], with a label that shows up in logs.
    pub fn labeled<F>(label: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let mut predicate = Self::new(check);
        predicate.label = Some(Arc::from(label.into()));
        predicate
    }

    /// Identity of this predicate.
    #[must_use]
    pub const fn id(&self) -> PredicateId {
        self.id
    }

    /// Optional label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Evaluate the condition now. Panics from the closure propagate.
    #[must_use]
    pub fn evaluate(&self) -> bool {
        (self.check)()
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Predicate {}

impl Hash for Predicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_identical_logic_is_not_equal() {
        let p = Predicate::new(|| true);
        let q = Predicate::new(|| true);
        assert_ne!(p, q);
        assert_eq!(p, p.clone());

        let set: HashSet<Predicate> = [p.clone(), q, p].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_evaluate_reads_live_state() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        let p = Predicate::new(move || flag_clone.load(Ordering::SeqCst));
        assert!(!p.evaluate());
        flag.store(true, Ordering::SeqCst);
        assert!(p.evaluate());
    }

    #[test]
    fn test_label_is_optional() {
        assert_eq!(Predicate::new(|| false).label(), None);
        let p = Predicate::labeled("hp_low", || false);
        assert_eq!(p.label(), Some("hp_low"));
        assert!(format!("{p:?}").contains("hp_low"));
    }
}

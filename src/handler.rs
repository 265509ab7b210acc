//! Subscriber handles and ordered subscriber lists.
//!
//! Closures cannot be compared, so every handler is wrapped in a handle that
//! carries a [`HandlerId`]. Clones of a handle share the id; unsubscribing
//! matches on the id, which is how a caller names "that exact handler".

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a subscribed handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Create a new random handler id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything stored in a [`SubscriberList`].
pub trait Subscriber: Clone {
    /// Identity used for removal.
    fn id(&self) -> HandlerId;
}

/// A handler invoked without a payload.
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Handler {
    /// Wrap a callback in a new handle with a fresh identity.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::new(),
            callback: Arc::new(callback),
        }
    }

    /// Identity of this handle.
    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// Run the callback.
    pub fn call(&self) {
        (self.callback)();
    }
}

impl Subscriber for Handler {
    fn id(&self) -> HandlerId {
        self.id
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish_non_exhaustive()
    }
}

/// A handler invoked with a borrowed payload.
pub struct PayloadHandler<P> {
    id: HandlerId,
    callback: Arc<dyn Fn(&P) + Send + Sync>,
}

impl<P> PayloadHandler<P> {
    /// Wrap a callback in a new handle with a fresh identity.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::new(),
            callback: Arc::new(callback),
        }
    }

    /// Identity of this handle.
    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// Run the callback with `data`.
    pub fn call(&self, data: &P) {
        (self.callback)(data);
    }
}

// Manual impl: a derive would require `P: Clone`.
impl<P> Clone for PayloadHandler<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<P> Subscriber for PayloadHandler<P> {
    fn id(&self) -> HandlerId {
        self.id
    }
}

impl<P> fmt::Debug for PayloadHandler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadHandler")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Ordered multicast list bound to one key or predicate.
///
/// The same handle may appear more than once; each occurrence is invoked.
#[derive(Debug, Clone)]
pub struct SubscriberList<H> {
    entries: Vec<H>,
}

impl<H> Default for SubscriberList<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Subscriber> SubscriberList<H> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handle at the end.
    pub fn push(&mut self, handler: H) {
        self.entries.push(handler);
    }

    /// Remove the first occurrence of `id`. Returns whether one was removed.
    pub fn remove_one(&mut self, id: HandlerId) -> bool {
        match self.entries.iter().position(|h| h.id() == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Copy of the current handles, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<H> {
        self.entries.clone()
    }

    /// Number of registered occurrences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_clone_shares_identity() {
        let h = Handler::new(|| {});
        let c = h.clone();
        assert_eq!(h.id(), c.id());
        assert_ne!(h.id(), Handler::new(|| {}).id());
    }

    #[test]
    fn test_handler_call_runs_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let h = Handler::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        h.call();
        h.clone().call();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_payload_handler_receives_data() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let h = PayloadHandler::<i64>::new(move |v| seen_clone.lock().unwrap().push(*v));
        h.call(&7);
        h.call(&-1);
        assert_eq!(*seen.lock().unwrap(), vec![7, -1]);
    }

    #[test]
    fn test_remove_one_removes_single_occurrence() {
        let a = Handler::new(|| {});
        let b = Handler::new(|| {});
        let mut list = SubscriberList::new();
        list.push(a.clone());
        list.push(b.clone());
        list.push(a.clone());
        assert_eq!(list.len(), 3);

        assert!(list.remove_one(a.id()));
        let ids: Vec<_> = list.snapshot().iter().map(Handler::id).collect();
        assert_eq!(ids, vec![b.id(), a.id()]);

        assert!(list.remove_one(a.id()));
        assert!(!list.remove_one(a.id()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut list: SubscriberList<Handler> = SubscriberList::new();
        assert!(list.is_empty());
        assert!(!list.remove_one(HandlerId::new()));
        assert!(list.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_list() {
        let a = Handler::new(|| {});
        let mut list = SubscriberList::new();
        list.push(a.clone());
        let snap = list.snapshot();
        list.remove_one(a.id());
        assert_eq!(snap.len(), 1);
        assert!(list.is_empty());
    }
}

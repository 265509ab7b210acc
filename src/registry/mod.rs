//! The dispatch registry.
//!
//! A [`Registry`] owns two families of subscriptions:
//!
//! - **Discrete events**, keyed by a value from a closed domain fixed at
//!   construction and fired explicitly with [`Registry::emit`].
//! - **Conditions**, keyed by [`Predicate`] identity and fired by
//!   [`Registry::poll_conditions`] whenever the predicate holds.
//!
//! Each key or predicate has a no-payload and a with-payload subscriber list.
//! Handlers always run on the calling thread, in registration order, after the
//! relevant lock has been released, so a handler may subscribe, unsubscribe,
//! emit or poll without deadlocking. Such changes apply to the next dispatch.

/// Predicate table and poll bookkeeping.
pub mod conditions;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::catalog::ConditionCatalog;
use crate::error::{lock_err, DispatchError, DispatchResult};
use crate::handler::{Handler, PayloadHandler, SubscriberList};
use crate::key::{EventDomain, EventKey};
use crate::predicate::{Predicate, PredicateId};

pub use conditions::{PollReport, TriggerMode};

use conditions::ConditionTable;

/// Registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Level- or edge-triggered condition polling.
    pub trigger_mode: TriggerMode,
}

#[derive(Debug)]
struct EventChannel<P> {
    plain: SubscriberList<Handler>,
    payload: SubscriberList<PayloadHandler<P>>,
}

impl<P> Default for EventChannel<P> {
    fn default() -> Self {
        Self {
            plain: SubscriberList::new(),
            payload: SubscriberList::new(),
        }
    }
}

/// Subscriber registry for discrete and predicate-gated events.
///
/// `K` is the discrete key type, `P` the opaque payload type.
pub struct Registry<K: EventKey, P = serde_json::Value> {
    config: RegistryConfig,
    catalog: ConditionCatalog,
    keys: Vec<K>,
    events: RwLock<HashMap<K, EventChannel<P>>>,
    conditions: RwLock<ConditionTable<P>>,
    sequence: AtomicU64,
    ticks: AtomicU64,
}

impl<K: EventKey, P: Send + Sync + 'static> Registry<K, P> {
    /// Build a registry over an explicit key domain.
    ///
    /// Every key gets empty subscriber lists and every catalog predicate gets
    /// an entry. Duplicate keys are collapsed.
    pub fn new(
        keys: impl IntoIterator<Item = K>,
        catalog: ConditionCatalog,
        config: RegistryConfig,
    ) -> Self {
        let mut events = HashMap::new();
        let mut order = Vec::new();
        for key in keys {
            if events.contains_key(&key) {
                continue;
            }
            events.insert(key.clone(), EventChannel::default());
            order.push(key);
        }

        let mut conditions = ConditionTable::default();
        for predicate in catalog.predicates() {
            conditions.entry(predicate);
        }

        debug!(
            keys = order.len(),
            conditions = conditions.len(),
            trigger_mode = ?config.trigger_mode,
            "Registry initialized"
        );

        Self {
            config,
            catalog,
            keys: order,
            events: RwLock::new(events),
            conditions: RwLock::new(conditions),
            sequence: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    /// Build a registry over every key of an [`EventDomain`].
    pub fn for_domain(catalog: ConditionCatalog, config: RegistryConfig) -> Self
    where
        K: EventDomain,
    {
        Self::new(K::domain(), catalog, config)
    }

    /// Invoke the subscribers of `key`.
    ///
    /// No-payload subscribers always run. Payload subscribers run afterwards,
    /// and only when `data` is `Some`.
    pub fn emit(&self, key: &K, data: Option<&P>) -> DispatchResult<()> {
        let (plain, payload) = {
            let events = self.events.read().map_err(|_| lock_err("events.emit"))?;
            let Some(channel) = events.get(key) else {
                warn!(key = ?key, "Emit on unknown event key");
                return Err(DispatchError::unknown_key(key));
            };
            let payload = if data.is_some() {
                channel.payload.snapshot()
            } else {
                Vec::new()
            };
            (channel.plain.snapshot(), payload)
        };

        trace!(
            key = ?key,
            plain = plain.len(),
            payload = payload.len(),
            with_data = data.is_some(),
            "Emitting event"
        );

        for handler in &plain {
            handler.call();
        }
        if let Some(data) = data {
            for handler in &payload {
                handler.call(data);
            }
        }
        Ok(())
    }

    /// Append a no-payload handler to `key`.
    pub fn subscribe(&self, key: &K, handler: &Handler) -> DispatchResult<()> {
        self.with_channel(key, "events.subscribe", |channel| {
            channel.plain.push(handler.clone());
        })
    }

    /// Append a payload handler to `key`.
    pub fn subscribe_with_payload(
        &self,
        key: &K,
        handler: &PayloadHandler<P>,
    ) -> DispatchResult<()> {
        self.with_channel(key, "events.subscribe_with_payload", |channel| {
            channel.payload.push(handler.clone());
        })
    }

    /// Remove one occurrence of `handler` from `key`.
    ///
    /// Unknown keys and handlers are ignored. Returns whether anything was removed.
    pub fn unsubscribe(&self, key: &K, handler: &Handler) -> bool {
        let Ok(mut events) = self.events.write() else {
            warn!(context = "events.unsubscribe", "Poisoned lock, handler not removed");
            return false;
        };
        events
            .get_mut(key)
            .is_some_and(|channel| channel.plain.remove_one(handler.id()))
    }

    /// Remove one occurrence of a payload handler from `key`.
    pub fn unsubscribe_with_payload(&self, key: &K, handler: &PayloadHandler<P>) -> bool {
        let Ok(mut events) = self.events.write() else {
            warn!(
                context = "events.unsubscribe_with_payload",
                "Poisoned lock, handler not removed"
            );
            return false;
        };
        events
            .get_mut(key)
            .is_some_and(|channel| channel.payload.remove_one(handler.id()))
    }

    /// Append a no-payload handler to `predicate`, registering the predicate if new.
    pub fn subscribe_condition(
        &self,
        predicate: &Predicate,
        handler: &Handler,
    ) -> DispatchResult<()> {
        let mut table = self
            .conditions
            .write()
            .map_err(|_| lock_err("conditions.subscribe"))?;
        let (entry, inserted) = table.entry(predicate);
        entry.plain.push(handler.clone());
        if inserted {
            debug!(predicate = %predicate.id(), label = ?predicate.label(), "Registered condition");
        }
        Ok(())
    }

    /// Append a payload handler to `predicate`, registering the predicate if new.
    pub fn subscribe_condition_with_payload(
        &self,
        predicate: &Predicate,
        handler: &PayloadHandler<P>,
    ) -> DispatchResult<()> {
        let mut table = self
            .conditions
            .write()
            .map_err(|_| lock_err("conditions.subscribe_with_payload"))?;
        let (entry, inserted) = table.entry(predicate);
        entry.payload.push(handler.clone());
        if inserted {
            debug!(predicate = %predicate.id(), label = ?predicate.label(), "Registered condition");
        }
        Ok(())
    }

    /// Remove one occurrence of `handler` from `predicate`. Absent entries are ignored.
    pub fn unsubscribe_condition(&self, predicate: &Predicate, handler: &Handler) -> bool {
        let Ok(mut table) = self.conditions.write() else {
            warn!(context = "conditions.unsubscribe", "Poisoned lock, handler not removed");
            return false;
        };
        table
            .get_mut(predicate.id())
            .is_some_and(|entry| entry.plain.remove_one(handler.id()))
    }

    /// Remove one occurrence of a payload handler from `predicate`.
    pub fn unsubscribe_condition_with_payload(
        &self,
        predicate: &Predicate,
        handler: &PayloadHandler<P>,
    ) -> bool {
        let Ok(mut table) = self.conditions.write() else {
            warn!(
                context = "conditions.unsubscribe_with_payload",
                "Poisoned lock, handler not removed"
            );
            return false;
        };
        table
            .get_mut(predicate.id())
            .is_some_and(|entry| entry.payload.remove_one(handler.id()))
    }

    /// Evaluate every registered predicate and fire the no-payload subscribers
    /// of those that hold.
    ///
    /// Call once per host tick. A panicking predicate or handler propagates.
    pub fn poll_conditions(&self) -> DispatchResult<PollReport> {
        self.poll_conditions_with(None)
    }

    /// Like [`Registry::poll_conditions`]; when `data` is `Some`, payload
    /// subscribers of fired predicates also run, after the no-payload ones.
    ///
    /// Polls may overlap across threads. Each takes a sequence stamp with its
    /// snapshot, and a result older than one already recorded for the same
    /// predicate is dropped, so edge triggering never fires on a stale value.
    /// The report's `tick` is assigned once results are recorded; a poll that
    /// fails or panics before then does not consume one.
    pub fn poll_conditions_with(&self, data: Option<&P>) -> DispatchResult<PollReport> {
        let polled_at = Utc::now();

        let (stamp, predicates) = {
            let table = self
                .conditions
                .read()
                .map_err(|_| lock_err("conditions.poll"))?;
            (
                self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
                table.predicates(),
            )
        };

        let results: Vec<(PredicateId, bool)> = predicates
            .iter()
            .map(|p| (p.id(), p.evaluate()))
            .collect();

        let (tick, firings) = {
            let mut table = self
                .conditions
                .write()
                .map_err(|_| lock_err("conditions.poll"))?;
            let firings = table.settle(stamp, &results, self.config.trigger_mode, data.is_some());
            (self.ticks.fetch_add(1, Ordering::Relaxed) + 1, firings)
        };

        let mut invoked = 0;
        for firing in &firings {
            for handler in &firing.plain {
                handler.call();
            }
            invoked += firing.plain.len();
            if let Some(data) = data {
                for handler in &firing.payload {
                    handler.call(data);
                }
                invoked += firing.payload.len();
            }
        }

        let report = PollReport {
            tick,
            evaluated: results.len(),
            fired: firings.len(),
            invoked,
            polled_at,
        };
        trace!(
            tick = report.tick,
            evaluated = report.evaluated,
            fired = report.fired,
            invoked = report.invoked,
            "Polled conditions"
        );
        Ok(report)
    }

    /// True if `key` belongs to the domain.
    #[must_use]
    pub fn has_event(&self, key: &K) -> bool {
        match self.events.read() {
            Ok(events) => events.contains_key(key),
            Err(_) => {
                warn!(context = "events.has_event", "Poisoned lock");
                false
            }
        }
    }

    /// True if `predicate` has an entry.
    #[must_use]
    pub fn has_condition(&self, predicate: &Predicate) -> bool {
        match self.conditions.read() {
            Ok(table) => table.contains(predicate.id()),
            Err(_) => {
                warn!(context = "conditions.has_condition", "Poisoned lock");
                false
            }
        }
    }

    /// Keys of the domain, in declaration order.
    #[must_use]
    pub fn event_keys(&self) -> &[K] {
        &self.keys
    }

    /// Number of registered predicates.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        match self.conditions.read() {
            Ok(table) => table.len(),
            Err(_) => {
                warn!(context = "conditions.condition_count", "Poisoned lock");
                0
            }
        }
    }

    /// `(no-payload, payload)` subscriber counts for `key`.
    pub fn subscriber_count(&self, key: &K) -> DispatchResult<(usize, usize)> {
        let events = self
            .events
            .read()
            .map_err(|_| lock_err("events.subscriber_count"))?;
        events
            .get(key)
            .map(|c| (c.plain.len(), c.payload.len()))
            .ok_or_else(|| DispatchError::unknown_key(key))
    }

    /// `(no-payload, payload)` subscriber counts for `predicate`, zero when absent.
    #[must_use]
    pub fn condition_subscriber_count(&self, predicate: &Predicate) -> (usize, usize) {
        match self.conditions.read() {
            Ok(table) => table
                .get(predicate.id())
                .map_or((0, 0), |e| (e.plain.len(), e.payload.len())),
            Err(_) => {
                warn!(context = "conditions.condition_subscriber_count", "Poisoned lock");
                (0, 0)
            }
        }
    }

    /// Polls that recorded their results so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The catalog this registry was seeded from.
    #[must_use]
    pub const fn catalog(&self) -> &ConditionCatalog {
        &self.catalog
    }

    fn with_channel(
        &self,
        key: &K,
        context: &'static str,
        f: impl FnOnce(&mut EventChannel<P>),
    ) -> DispatchResult<()> {
        let mut events = self.events.write().map_err(|_| lock_err(context))?;
        let Some(channel) = events.get_mut(key) else {
            warn!(key = ?key, "Subscribe on unknown event key");
            return Err(DispatchError::unknown_key(key));
        };
        f(channel);
        Ok(())
    }
}

impl<K: EventKey, P> fmt::Debug for Registry<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogMutability;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Lifecycle {
        Started,
        Stopped,
    }

    impl EventDomain for Lifecycle {
        fn domain() -> Vec<Self> {
            vec![Self::Started, Self::Stopped]
        }
    }

    fn registry() -> Registry<Lifecycle, String> {
        Registry::for_domain(ConditionCatalog::empty(), RegistryConfig::default())
    }

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let handler = Handler::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        (hits, handler)
    }

    #[test]
    fn test_emit_with_no_subscribers_succeeds() {
        let reg = registry();
        for key in Lifecycle::domain() {
            reg.emit(&key, None).unwrap();
            reg.emit(&key, Some(&"x".to_string())).unwrap();
        }
    }

    #[test]
    fn test_unknown_key_errors_on_emit_and_subscribe() {
        let reg: Registry<&'static str> =
            Registry::new(["started"], ConditionCatalog::empty(), RegistryConfig::default());
        let (_, h) = counter();

        let err = reg.emit(&"missing", None).unwrap_err();
        assert!(err.is_unknown_key());
        assert!(reg.subscribe(&"missing", &h).unwrap_err().is_unknown_key());
        assert!(reg
            .subscribe_with_payload(&"missing", &PayloadHandler::new(|_| {}))
            .unwrap_err()
            .is_unknown_key());
        assert!(!reg.unsubscribe(&"missing", &h));
        assert!(reg.subscriber_count(&"missing").is_err());
    }

    #[test]
    fn test_payload_order_and_opt_in() {
        let reg = registry();
        let log = Arc::new(Mutex::new(Vec::new()));

        let plain_log = Arc::clone(&log);
        let plain = Handler::new(move || plain_log.lock().unwrap().push("plain".to_string()));
        let payload_log = Arc::clone(&log);
        let payload =
            PayloadHandler::new(move |s: &String| payload_log.lock().unwrap().push(s.clone()));

        reg.subscribe_with_payload(&Lifecycle::Started, &payload).unwrap();
        reg.subscribe(&Lifecycle::Started, &plain).unwrap();

        reg.emit(&Lifecycle::Started, None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["plain"]);

        reg.emit(&Lifecycle::Started, Some(&"data".to_string())).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["plain", "plain", "data"]);
    }

    #[test]
    fn test_double_subscribe_then_single_unsubscribe() {
        let reg = registry();
        let (hits, h) = counter();

        reg.subscribe(&Lifecycle::Started, &h).unwrap();
        reg.subscribe(&Lifecycle::Started, &h).unwrap();
        reg.emit(&Lifecycle::Started, None).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(reg.unsubscribe(&Lifecycle::Started, &h));
        reg.emit(&Lifecycle::Started, None).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(reg.subscriber_count(&Lifecycle::Started).unwrap(), (1, 0));
    }

    #[test]
    fn test_condition_lazy_insert_and_poll() {
        let reg = registry();
        let (hits, h) = counter();
        let p = Predicate::new(|| true);

        assert!(!reg.has_condition(&p));
        reg.subscribe_condition(&p, &h).unwrap();
        assert!(reg.has_condition(&p));
        assert_eq!(reg.condition_count(), 1);

        let report = reg.poll_conditions().unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.fired, 1);
        assert_eq!(report.invoked, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_catalog_predicates_are_seeded() {
        let catalog = ConditionCatalog::example(CatalogMutability::Static).unwrap();
        let first = catalog.predicates()[0].clone();
        let reg: Registry<Lifecycle> = Registry::for_domain(catalog, RegistryConfig::default());

        assert_eq!(reg.condition_count(), 2);
        assert!(reg.has_condition(&first));
        assert_eq!(reg.condition_subscriber_count(&first), (0, 0));

        let report = reg.poll_conditions().unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.fired, 2);
        assert_eq!(report.invoked, 0);
    }

    #[test]
    fn test_edge_mode_fires_on_rise_only() {
        let reg: Registry<Lifecycle> = Registry::for_domain(
            ConditionCatalog::empty(),
            RegistryConfig {
                trigger_mode: TriggerMode::Edge,
            },
        );
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let flag_clone = Arc::clone(&flag);
        let p = Predicate::new(move || flag_clone.load(Ordering::SeqCst));
        let (hits, h) = counter();
        reg.subscribe_condition(&p, &h).unwrap();

        for _ in 0..3 {
            reg.poll_conditions().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        flag.store(false, Ordering::SeqCst);
        reg.poll_conditions().unwrap();
        flag.store(true, Ordering::SeqCst);
        reg.poll_conditions().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_condition_absent_is_noop() {
        let reg = registry();
        let (_, h) = counter();
        let p = Predicate::new(|| true);
        assert!(!reg.unsubscribe_condition(&p, &h));
        assert!(!reg.unsubscribe_condition_with_payload(&p, &PayloadHandler::new(|_| {})));
        assert!(!reg.has_condition(&p));
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let reg: Registry<u8> =
            Registry::new([1, 2, 1, 3], ConditionCatalog::empty(), RegistryConfig::default());
        assert_eq!(reg.event_keys(), &[1, 2, 3]);
        assert!(reg.has_event(&2));
        assert!(!reg.has_event(&9));
    }

    fn poison<T>(lock: &RwLock<T>) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.write().unwrap();
            panic!("poisoning lock");
        }));
        assert!(outcome.is_err());
        assert!(lock.is_poisoned());
    }

    #[test]
    fn test_poisoned_events_lock_degrades_without_panicking() {
        let reg = registry();
        let (_, h) = counter();
        reg.subscribe(&Lifecycle::Started, &h).unwrap();
        poison(&reg.events);

        let err = reg.emit(&Lifecycle::Started, None).unwrap_err();
        assert!(matches!(err, DispatchError::Internal { .. }));
        assert!(matches!(
            reg.subscribe(&Lifecycle::Started, &h),
            Err(DispatchError::Internal { .. })
        ));
        assert!(!reg.unsubscribe(&Lifecycle::Started, &h));
        assert!(!reg.unsubscribe_with_payload(&Lifecycle::Started, &PayloadHandler::new(|_| {})));
        assert!(!reg.has_event(&Lifecycle::Started));
        assert!(reg.subscriber_count(&Lifecycle::Started).is_err());
    }

    #[test]
    fn test_poisoned_conditions_lock_consumes_no_tick() {
        let reg = registry();
        let (_, h) = counter();
        let p = Predicate::new(|| true);
        reg.subscribe_condition(&p, &h).unwrap();
        reg.poll_conditions().unwrap();
        poison(&reg.conditions);

        assert!(matches!(
            reg.poll_conditions(),
            Err(DispatchError::Internal { .. })
        ));
        assert_eq!(reg.ticks(), 1);
        assert!(!reg.has_condition(&p));
        assert_eq!(reg.condition_count(), 0);
        assert_eq!(reg.condition_subscriber_count(&p), (0, 0));
        assert!(!reg.unsubscribe_condition(&p, &h));
    }

    #[test]
    fn test_panicking_predicate_consumes_no_tick() {
        let reg = registry();
        let (_, h) = counter();
        reg.subscribe_condition(&Predicate::new(|| panic!("predicate failed")), &h)
            .unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            reg.poll_conditions()
        }));
        assert!(outcome.is_err());
        assert_eq!(reg.ticks(), 0);
    }

    #[test]
    fn test_config_serde_default() {
        let cfg: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trigger_mode, TriggerMode::Level);
        let cfg: RegistryConfig = serde_json::from_str(r#"{"trigger_mode":"edge"}"#).unwrap();
        assert_eq!(cfg.trigger_mode, TriggerMode::Edge);
    }
}

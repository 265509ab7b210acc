//! Predicate-keyed subscriber table and trigger modes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handler::{Handler, PayloadHandler, SubscriberList};
use crate::predicate::{Predicate, PredicateId};

/// When a true predicate fires its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fire on every poll where the predicate is true.
    #[default]
    Level,
    /// Fire only when the predicate was false (or unseen) on the previous poll.
    Edge,
}

impl TriggerMode {
    /// Whether a predicate with this poll's value `now` fires, given its previous value.
    #[must_use]
    pub const fn fires(self, previous: bool, now: bool) -> bool {
        match self {
            Self::Level => now,
            Self::Edge => now && !previous,
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// Per-registry poll counter, starting at 1.
    pub tick: u64,
    /// Predicates evaluated.
    pub evaluated: usize,
    /// Predicates that fired.
    pub fired: usize,
    /// Handler invocations performed.
    pub invoked: usize,
    /// When the poll started.
    pub polled_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct ConditionEntry<P> {
    pub predicate: Predicate,
    pub plain: SubscriberList<Handler>,
    pub payload: SubscriberList<PayloadHandler<P>>,
    pub last: bool,
    /// Stamp of the poll that recorded `last`.
    pub seen: u64,
}

impl<P> ConditionEntry<P> {
    fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            plain: SubscriberList::new(),
            payload: SubscriberList::new(),
            last: false,
            seen: 0,
        }
    }
}

/// Handlers selected for one fired predicate.
pub(crate) struct Firing<P> {
    pub plain: Vec<Handler>,
    pub payload: Vec<PayloadHandler<P>>,
}

/// Predicates in registration order, each with both subscriber lists.
#[derive(Debug)]
pub(crate) struct ConditionTable<P> {
    order: Vec<PredicateId>,
    entries: HashMap<PredicateId, ConditionEntry<P>>,
}

impl<P> Default for ConditionTable<P> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<P> ConditionTable<P> {
    /// Entry for `predicate`, inserting an empty one first if needed.
    /// The flag reports whether an insert happened.
    pub fn entry(&mut self, predicate: &Predicate) -> (&mut ConditionEntry<P>, bool) {
        let id = predicate.id();
        let inserted = !self.entries.contains_key(&id);
        if inserted {
            self.order.push(id);
        }
        let entry = self
            .entries
            .entry(id)
            .or_insert_with(|| ConditionEntry::new(predicate.clone()));
        (entry, inserted)
    }

    pub fn get(&self, id: PredicateId) -> Option<&ConditionEntry<P>> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: PredicateId) -> Option<&mut ConditionEntry<P>> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: PredicateId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// All predicates in registration order.
    pub fn predicates(&self) -> Vec<Predicate> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.predicate.clone())
            .collect()
    }

    /// Record this poll's results and collect handlers for predicates that fire.
    ///
    /// `stamp` orders overlapping polls: a result older than the one already
    /// recorded for a predicate is dropped and never fires. Payload handlers
    /// are only collected when `with_payload` is set.
    pub fn settle(
        &mut self,
        stamp: u64,
        results: &[(PredicateId, bool)],
        mode: TriggerMode,
        with_payload: bool,
    ) -> Vec<Firing<P>> {
        let mut out = Vec::new();
        for &(id, now) in results {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if stamp < entry.seen {
                continue;
            }
            entry.seen = stamp;
            let previous = std::mem::replace(&mut entry.last, now);
            if !mode.fires(previous, now) {
                continue;
            }
            out.push(Firing {
                plain: entry.plain.snapshot(),
                payload: if with_payload {
                    entry.payload.snapshot()
                } else {
                    Vec::new()
                },
            });
        }
        out
    }
}

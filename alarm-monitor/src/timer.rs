//! Event-time timer service
//!
//! Pending deadlines are kept in a `BTreeMap` keyed by `(deadline, seq)`,
//! where `seq` is the schedule order. Iterating the map therefore yields
//! timers by increasing deadline with ties in FIFO order.

use crate::types::{MatchId, Timestamp};
use std::collections::{BTreeMap, HashMap};

/// A timer that reached its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub deadline: Timestamp,
    pub match_id: MatchId,
}

/// Pending deadlines for one partition
#[derive(Debug, Default)]
pub struct TimerService {
    /// (deadline, schedule sequence) -> match
    queue: BTreeMap<(Timestamp, u64), MatchId>,
    /// match -> queue slot, for cancellation
    slots: HashMap<MatchId, (Timestamp, u64)>,
    next_seq: u64,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer for `match_id` at `deadline`
    ///
    /// Rescheduling an id that is still pending replaces its old deadline.
    pub fn schedule(&mut self, deadline: Timestamp, match_id: MatchId) {
        if let Some(slot) = self.slots.remove(&match_id) {
            log::warn!("Timer for match {} rescheduled", match_id);
            self.queue.remove(&slot);
        }

        let slot = (deadline, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(slot, match_id);
        self.slots.insert(match_id, slot);
    }

    /// Cancel the pending timer of `match_id`
    ///
    /// Returns false if nothing was pending (already fired or already
    /// canceled). Calling it twice is harmless.
    pub fn cancel(&mut self, match_id: MatchId) -> bool {
        match self.slots.remove(&match_id) {
            Some(slot) => {
                self.queue.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Fire every timer whose deadline is at or before `clock`
    ///
    /// Fired timers are removed and returned in firing order.
    pub fn advance_to(&mut self, clock: Timestamp) -> Vec<FiredTimer> {
        let mut fired = Vec::new();

        while let Some(entry) = self.queue.first_entry() {
            let (deadline, _) = *entry.key();
            if deadline > clock {
                break;
            }
            let match_id = entry.remove();
            self.slots.remove(&match_id);
            fired.push(FiredTimer { deadline, match_id });
        }

        fired
    }

    /// Whether `match_id` has a pending timer
    pub fn is_pending(&self, match_id: MatchId) -> bool {
        self.slots.contains_key(&match_id)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

//! Per-key pattern automaton
//!
//! Each open match moves through a tiny state machine:
//!
//! ```text
//!                CLEAR (deadline >= t)
//!   CRITICAL ──► OPEN ─────────────────► RESOLVED  => Suppressed
//!                 │
//!                 │ timer (clock >= deadline)
//!                 └────────────────────► EXPIRED   => Alarm
//! ```
//!
//! A key with no open match is idle; there is no explicit idle state.
//! Closing a match always removes it from its [`PartitionState`] and settles
//! its timer in the same step: resolution cancels the timer, expiry consumes
//! it. A timer that cannot be matched to an open match is a
//! [`MonitorError::TimerDesync`].
//!
//! A key whose matches all expired is remembered as lapsed until its next
//! CRITICAL or CLEAR, so a CLEAR that comes after the alarm can be told
//! apart from one that never had a CRITICAL.

use crate::config::{MatchPolicy, MonitorConfig};
use crate::timer::{FiredTimer, TimerService};
use crate::types::{
    EntityKey, Event, MatchId, MatchResult, MonitorError, Result, Severity, Timestamp,
};
use std::collections::{HashMap, HashSet};

/// A CRITICAL waiting for its CLEAR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMatch {
    pub match_id: MatchId,
    pub first_event: Event,
    /// `first_event.event_time + window`, fixed at creation
    pub deadline: Timestamp,
}

impl OpenMatch {
    pub fn key(&self) -> &EntityKey {
        &self.first_event.entity_key
    }
}

/// Open matches of one key, oldest first
#[derive(Debug, Clone, Default)]
pub struct PartitionState {
    matches: Vec<OpenMatch>,
}

impl PartitionState {
    pub fn matches(&self) -> &[OpenMatch] {
        &self.matches
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn take(&mut self, match_id: MatchId) -> Option<OpenMatch> {
        let pos = self.matches.iter().position(|m| m.match_id == match_id)?;
        Some(self.matches.remove(pos))
    }
}

/// What an incoming event did to its key's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A CRITICAL opened a new match
    Opened(MatchId),
    /// A CRITICAL arrived while a match was open under [`MatchPolicy::SingleOpen`]
    Folded,
    /// A CLEAR resolved one or more matches
    Resolved(Vec<MatchResult>),
    /// A CLEAR arrived after every match of its key had expired
    Expired,
    /// A CLEAR found nothing to resolve
    Unmatched,
    /// Any other severity
    Ignored,
}

/// The matching state machine for all keys of one partition
#[derive(Debug)]
pub struct PatternAutomaton {
    window: i64,
    policy: MatchPolicy,
    partitions: HashMap<EntityKey, PartitionState>,
    /// Open match -> owning key
    owners: HashMap<MatchId, EntityKey>,
    /// Idle keys whose last match expired without a CLEAR
    lapsed: HashSet<EntityKey>,
    next_match_id: u64,
}

impl PatternAutomaton {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            window: config.window(),
            policy: config.match_policy,
            partitions: HashMap::new(),
            owners: HashMap::new(),
            lapsed: HashSet::new(),
            next_match_id: 0,
        }
    }

    /// Apply one event to the state of its key
    ///
    /// The caller must already have fired every timer strictly before
    /// `event.event_time`, so that a CLEAR only sees matches still in window.
    pub fn on_event(&mut self, event: Event, timers: &mut TimerService) -> Result<EventOutcome> {
        match event.severity {
            Severity::Critical => self.open(event, timers),
            Severity::Clear => self.resolve(event, timers),
            Severity::Other => Ok(EventOutcome::Ignored),
        }
    }

    /// Expire the match a fired timer belongs to
    pub fn on_timer(&mut self, fired: FiredTimer) -> Result<MatchResult> {
        let key = self
            .owners
            .remove(&fired.match_id)
            .ok_or_else(|| desync(fired.match_id, "timer fired for a match that is not open"))?;

        let state = self
            .partitions
            .get_mut(&key)
            .ok_or_else(|| desync(fired.match_id, "owning key has no partition state"))?;
        let expired = state
            .take(fired.match_id)
            .ok_or_else(|| desync(fired.match_id, "match missing from partition state"))?;
        if state.is_empty() {
            self.partitions.remove(&key);
            self.lapsed.insert(key);
        }

        if expired.deadline != fired.deadline {
            return Err(desync(
                fired.match_id,
                &format!(
                    "timer deadline {} differs from match deadline {}",
                    fired.deadline, expired.deadline
                ),
            ));
        }

        log::trace!(
            "Match {} on {} expired at {}",
            expired.match_id,
            expired.key(),
            fired.deadline
        );
        Ok(MatchResult::Alarm {
            first_event: expired.first_event,
        })
    }

    fn open(&mut self, event: Event, timers: &mut TimerService) -> Result<EventOutcome> {
        let single_open = self.policy == MatchPolicy::SingleOpen;
        if single_open && self.partitions.contains_key(&event.entity_key) {
            log::debug!("Folding {} into the open match of its key", event);
            return Ok(EventOutcome::Folded);
        }

        let deadline = event.event_time.checked_add(self.window).ok_or_else(|| {
            MonitorError::InvalidEvent(format!(
                "deadline of {} overflows with a {}ms window",
                event, self.window
            ))
        })?;

        let match_id = MatchId(self.next_match_id);
        self.next_match_id += 1;

        self.lapsed.remove(&event.entity_key);
        timers.schedule(deadline, match_id);
        self.owners.insert(match_id, event.entity_key.clone());

        log::trace!("Match {} opened by {}, deadline {}", match_id, event, deadline);
        self.partitions
            .entry(event.entity_key.clone())
            .or_default()
            .matches
            .push(OpenMatch {
                match_id,
                first_event: event,
                deadline,
            });

        Ok(EventOutcome::Opened(match_id))
    }

    fn resolve(&mut self, clear: Event, timers: &mut TimerService) -> Result<EventOutcome> {
        let lapsed = self.lapsed.remove(&clear.entity_key);
        let Some(state) = self.partitions.get_mut(&clear.entity_key) else {
            return Ok(if lapsed {
                EventOutcome::Expired
            } else {
                EventOutcome::Unmatched
            });
        };

        let (in_window, remaining): (Vec<OpenMatch>, Vec<OpenMatch>) = state
            .matches
            .drain(..)
            .partition(|m| m.deadline >= clear.event_time);
        state.matches = remaining;
        if state.is_empty() {
            self.partitions.remove(&clear.entity_key);
        }

        if in_window.is_empty() {
            return Ok(EventOutcome::Unmatched);
        }

        let mut results = Vec::with_capacity(in_window.len());
        for resolved in in_window {
            self.owners.remove(&resolved.match_id);
            if !timers.cancel(resolved.match_id) {
                return Err(desync(resolved.match_id, "open match had no pending timer"));
            }
            log::trace!("Match {} resolved by {}", resolved.match_id, clear);
            results.push(MatchResult::Suppressed {
                first_event: resolved.first_event,
                second_event: clear.clone(),
            });
        }

        Ok(EventOutcome::Resolved(results))
    }

    /// Open matches of `key`, oldest first
    pub fn open_matches_for(&self, key: &EntityKey) -> &[OpenMatch] {
        self.partitions
            .get(key)
            .map(PartitionState::matches)
            .unwrap_or(&[])
    }

    /// Whether `key` is idle because its last match expired
    pub fn is_lapsed(&self, key: &EntityKey) -> bool {
        self.lapsed.contains(key)
    }

    /// Total open matches across all keys
    pub fn open_matches(&self) -> usize {
        self.owners.len()
    }
}

fn desync(match_id: MatchId, reason: &str) -> MonitorError {
    MonitorError::TimerDesync {
        match_id,
        reason: reason.to_string(),
    }
}

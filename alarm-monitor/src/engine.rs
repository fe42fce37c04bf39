//! Main monitor API
//!
//! [`PartitionWorker`] wires the components of one partition together:
//!
//! 1. the watermark tracker accepts or rejects the event and yields the clock
//! 2. timers strictly before the clock fire (expired matches become alarms)
//! 3. the automaton applies the event (a CLEAR at a deadline still resolves)
//!
//! A timer due exactly at the clock stays pending, since more events with
//! the same timestamp may follow. It fires once a later event moves the
//! clock past it, or when [`PartitionWorker::advance_watermark`] reaches it.
//!
//! [`Monitor`] shards keys across several workers and can run a batch of
//! events on all of them in parallel. A partition that fails does not take
//! the records of the others down with it, see [`BatchOutput`].

use crate::automaton::{EventOutcome, PatternAutomaton};
use crate::config::MonitorConfig;
use crate::emitter::{OutputRecord, ResultEmitter};
use crate::timer::TimerService;
use crate::types::{EntityKey, Event, MatchId, MonitorError, RawEvent, Result, Timestamp};
use crate::watermark::{merged_watermark, WatermarkTracker};
use rayon::prelude::*;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Counters describing a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Events accepted by the watermark tracker
    pub events_processed: u64,
    /// Events dropped for a missing or unrecognized field, or a CRITICAL
    /// whose deadline does not fit in a timestamp
    pub invalid_events: u64,
    /// Events dropped for arriving below the watermark, and CLEARs that
    /// arrived after their match had already expired into an alarm
    pub late_events: u64,
    /// CRITICALs ignored because their key already had an open match
    pub folded_criticals: u64,
    /// CLEARs for a key that had no match, open or expired
    pub unmatched_clears: u64,
    pub alarms: u64,
    pub suppressed: u64,
    /// Matches still waiting for a CLEAR or a timeout
    pub open_matches: u64,
}

impl MonitorStats {
    /// Add another set of counters to this one
    pub fn merge(&mut self, other: &MonitorStats) {
        self.events_processed += other.events_processed;
        self.invalid_events += other.invalid_events;
        self.late_events += other.late_events;
        self.folded_criticals += other.folded_criticals;
        self.unmatched_clears += other.unmatched_clears;
        self.alarms += other.alarms;
        self.suppressed += other.suppressed;
        self.open_matches += other.open_matches;
    }
}

/// Matching engine for the keys of one partition
///
/// A worker is strictly sequential. After a fatal error it refuses all
/// further input.
#[derive(Debug)]
pub struct PartitionWorker {
    index: usize,
    tracker: WatermarkTracker,
    timers: TimerService,
    automaton: PatternAutomaton,
    emitter: ResultEmitter,
    stats: MonitorStats,
    failure: Option<(MatchId, String)>,
}

impl PartitionWorker {
    pub fn new(index: usize, config: &MonitorConfig) -> Self {
        Self {
            index,
            tracker: WatermarkTracker::new(),
            timers: TimerService::new(),
            automaton: PatternAutomaton::new(config),
            emitter: ResultEmitter::new(),
            stats: MonitorStats::default(),
            failure: None,
        }
    }

    /// Validate and process a raw source record
    ///
    /// Invalid records are counted and dropped.
    pub fn process(&mut self, raw: RawEvent) -> Result<Vec<OutputRecord>> {
        self.ensure_alive()?;
        match Event::try_from(raw) {
            Ok(event) => self.process_event(event),
            Err(err) => {
                self.stats.invalid_events += 1;
                log::debug!("Partition {}: dropping event: {}", self.index, err);
                Ok(Vec::new())
            }
        }
    }

    /// Process one validated event
    ///
    /// Returns the records of every match closed by this step, in closing
    /// order. Late events are counted and dropped without touching any
    /// match.
    pub fn process_event(&mut self, event: Event) -> Result<Vec<OutputRecord>> {
        self.ensure_alive()?;
        log::trace!("Partition {}: {}", self.index, event);

        let clock = match self.tracker.advance(&event) {
            Ok(clock) => clock,
            Err(err @ MonitorError::LateEvent { .. }) => {
                self.stats.late_events += 1;
                log::debug!("Partition {}: dropping event: {}", self.index, err);
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        self.stats.events_processed += 1;

        let mut out = Vec::new();
        match self.step(event, clock, &mut out) {
            Ok(()) => Ok(out),
            Err(err) => Err(self.halt(err)),
        }
    }

    /// Advance the clock without an event, firing due timers
    pub fn advance_watermark(&mut self, clock: Timestamp) -> Result<Vec<OutputRecord>> {
        self.ensure_alive()?;
        let clock = self.tracker.advance_to(clock);

        let mut out = Vec::new();
        match self.fire_timers(clock, &mut out) {
            Ok(()) => Ok(out),
            Err(err) => Err(self.halt(err)),
        }
    }

    fn step(&mut self, event: Event, clock: Timestamp, out: &mut Vec<OutputRecord>) -> Result<()> {
        // Deadlines at the clock wait, a CLEAR stamped `clock` may still follow
        self.fire_timers(clock.saturating_sub(1), out)?;

        match self.automaton.on_event(event, &mut self.timers) {
            Ok(EventOutcome::Resolved(results)) => {
                for result in results {
                    self.emitter.emit(result, out);
                }
            }
            Ok(EventOutcome::Folded) => self.stats.folded_criticals += 1,
            Ok(EventOutcome::Expired) => {
                self.stats.late_events += 1;
                log::debug!("Partition {}: CLEAR after alarm at {}", self.index, clock);
            }
            Ok(EventOutcome::Unmatched) => self.stats.unmatched_clears += 1,
            Ok(EventOutcome::Opened(_)) | Ok(EventOutcome::Ignored) => {}
            Err(err @ MonitorError::InvalidEvent(_)) => {
                self.stats.invalid_events += 1;
                log::debug!("Partition {}: dropping event: {}", self.index, err);
            }
            Err(err) => return Err(err),
        }

        Ok(())
    }

    fn fire_timers(&mut self, clock: Timestamp, out: &mut Vec<OutputRecord>) -> Result<()> {
        for fired in self.timers.advance_to(clock) {
            let result = self.automaton.on_timer(fired)?;
            self.emitter.emit(result, out);
        }
        Ok(())
    }

    fn ensure_alive(&self) -> Result<()> {
        match &self.failure {
            Some((match_id, reason)) => Err(MonitorError::TimerDesync {
                match_id: *match_id,
                reason: format!("partition {} halted earlier: {}", self.index, reason),
            }),
            None => Ok(()),
        }
    }

    fn halt(&mut self, err: MonitorError) -> MonitorError {
        if let MonitorError::TimerDesync { match_id, reason } = &err {
            log::error!("Partition {} halted: {}", self.index, err);
            self.failure = Some((*match_id, reason.clone()));
        }
        err
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Current event-time clock of this partition
    pub fn watermark(&self) -> Option<Timestamp> {
        self.tracker.current()
    }

    pub fn automaton(&self) -> &PatternAutomaton {
        &self.automaton
    }

    /// Whether a fatal error stopped this worker
    pub fn is_halted(&self) -> bool {
        self.failure.is_some()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            alarms: self.emitter.alarms(),
            suppressed: self.emitter.suppressed(),
            open_matches: self.automaton.open_matches() as u64,
            ..self.stats
        }
    }
}

/// Records produced by a batch, and the partitions that failed on it
///
/// Records of healthy partitions are always delivered, as are the records a
/// failed partition produced before its error.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub records: Vec<OutputRecord>,
    /// Partition index and the fatal error that halted it
    pub halted: Vec<(usize, MonitorError)>,
}

impl BatchOutput {
    /// Whether every partition handled the batch
    pub fn is_complete(&self) -> bool {
        self.halted.is_empty()
    }

    fn absorb(&mut self, index: usize, records: Vec<OutputRecord>, failure: Option<MonitorError>) {
        self.records.extend(records);
        if let Some(err) = failure {
            self.halted.push((index, err));
        }
    }
}

/// Key-sharded set of partition workers
///
/// Each key is owned by exactly one worker for the lifetime of the monitor,
/// so workers never share state.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    workers: Vec<PartitionWorker>,
    /// Records that could not be routed because they failed validation
    invalid_events: u64,
}

impl Monitor {
    /// Create a monitor with `config.partition_count` workers
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let workers = (0..config.partition_count)
            .map(|index| PartitionWorker::new(index, &config))
            .collect();

        log::info!(
            "Monitor started: window {}ms, {} partition(s), {:?} matching",
            config.window_duration_ms,
            config.partition_count,
            config.match_policy
        );

        Ok(Self {
            config,
            workers,
            invalid_events: 0,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Worker responsible for `key`
    pub fn partition_for(&self, key: &EntityKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.workers.len() as u64) as usize
    }

    /// Validate, route and process one raw record
    pub fn process(&mut self, raw: RawEvent) -> Result<Vec<OutputRecord>> {
        match Event::try_from(raw) {
            Ok(event) => self.process_event(event),
            Err(err) => {
                self.invalid_events += 1;
                log::debug!("Dropping event: {}", err);
                Ok(Vec::new())
            }
        }
    }

    /// Route and process one validated event
    pub fn process_event(&mut self, event: Event) -> Result<Vec<OutputRecord>> {
        let partition = self.partition_for(&event.entity_key);
        self.workers[partition].process_event(event)
    }

    /// Process a batch with one rayon task per partition
    ///
    /// Records of the same key keep their relative order. Records of
    /// different partitions are concatenated by partition index. A partition
    /// that hits a fatal error stops at that event and is listed in
    /// [`BatchOutput::halted`]; the other partitions finish the batch.
    pub fn process_batch(&mut self, batch: Vec<RawEvent>) -> BatchOutput {
        let mut shards: Vec<Vec<Event>> = vec![Vec::new(); self.workers.len()];
        for raw in batch {
            match Event::try_from(raw) {
                Ok(event) => {
                    let partition = self.partition_for(&event.entity_key);
                    shards[partition].push(event);
                }
                Err(err) => {
                    self.invalid_events += 1;
                    log::debug!("Dropping event: {}", err);
                }
            }
        }

        let per_partition: Vec<(Vec<OutputRecord>, Option<MonitorError>)> = self
            .workers
            .par_iter_mut()
            .zip(shards.into_par_iter())
            .map(|(worker, events)| {
                let mut out = Vec::new();
                for event in events {
                    match worker.process_event(event) {
                        Ok(records) => out.extend(records),
                        Err(err) => return (out, Some(err)),
                    }
                }
                (out, None)
            })
            .collect();

        let mut output = BatchOutput::default();
        for (index, (records, failure)) in per_partition.into_iter().enumerate() {
            output.absorb(index, records, failure);
        }
        output
    }

    /// Advance every partition's clock to at least `clock`
    ///
    /// Halted partitions are reported in the output and skipped.
    pub fn advance_watermark(&mut self, clock: Timestamp) -> BatchOutput {
        let mut output = BatchOutput::default();
        for worker in &mut self.workers {
            match worker.advance_watermark(clock) {
                Ok(records) => output.absorb(worker.index, records, None),
                Err(err) => output.absorb(worker.index, Vec::new(), Some(err)),
            }
        }
        output
    }

    /// Clock that every partition has passed
    pub fn global_watermark(&self) -> Option<Timestamp> {
        merged_watermark(self.workers.iter().map(|w| &w.tracker))
    }

    pub fn workers(&self) -> &[PartitionWorker] {
        &self.workers
    }

    /// Counters summed over all partitions
    pub fn stats(&self) -> MonitorStats {
        let mut total = MonitorStats {
            invalid_events: self.invalid_events,
            ..MonitorStats::default()
        };
        for worker in &self.workers {
            total.merge(&worker.stats());
        }
        total
    }
}

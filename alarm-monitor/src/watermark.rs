//! Event-time clock
//!
//! Watermarks are punctual: every accepted event moves the clock to its own
//! timestamp with no buffering delay. The clock never moves backwards.

use crate::types::{Event, MonitorError, Result, Timestamp};

/// Tracks the event-time clock of one partition
#[derive(Debug, Clone, Default)]
pub struct WatermarkTracker {
    current: Option<Timestamp>,
}

impl WatermarkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current clock value (None until the first event or punctuation)
    pub fn current(&self) -> Option<Timestamp> {
        self.current
    }

    /// Advance the clock with an event's timestamp
    ///
    /// An event strictly below the current watermark is rejected with
    /// [`MonitorError::LateEvent`] and leaves the clock untouched. An event
    /// equal to the watermark is accepted.
    pub fn advance(&mut self, event: &Event) -> Result<Timestamp> {
        if let Some(watermark) = self.current {
            if event.event_time < watermark {
                return Err(MonitorError::LateEvent {
                    key: event.entity_key.clone(),
                    event_time: event.event_time,
                    watermark,
                });
            }
        }
        self.current = Some(event.event_time);
        Ok(event.event_time)
    }

    /// Advance the clock without an event (punctuation)
    ///
    /// A punctuation behind the current clock is ignored.
    pub fn advance_to(&mut self, clock: Timestamp) -> Timestamp {
        let next = self.current.map_or(clock, |current| current.max(clock));
        self.current = Some(next);
        next
    }
}

/// Effective clock of several merged partitions
///
/// Time has only passed once every partition has seen it, so the merged
/// clock is the minimum. Returns None while any partition has no clock yet.
pub fn merged_watermark<'a, I>(trackers: I) -> Option<Timestamp>
where
    I: IntoIterator<Item = &'a WatermarkTracker>,
{
    let mut merged: Option<Timestamp> = None;
    for tracker in trackers {
        let current = tracker.current()?;
        merged = Some(merged.map_or(current, |m| m.min(current)));
    }
    merged
}

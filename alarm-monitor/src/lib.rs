//! Alarm Monitor Library
//!
//! An event-time engine that separates real alarms from flapping faults.
//! A CRITICAL event for an entity opens a grace window; a CLEAR for the same
//! entity inside the window suppresses it, otherwise an alarm is raised once
//! the event-time clock passes the window.
//!
//! # Architecture
//!
//! - [`watermark`]: punctual event-time clock, rejects late events
//! - [`timer`]: ordered deadlines, fired as the clock advances
//! - [`automaton`]: per-key state machine over open matches
//! - [`emitter`]: closed matches to output records
//! - [`engine`]: partition workers and the key-sharded [`Monitor`]
//!
//! The library does NOT:
//! - Generate or read events (the source is the caller's concern)
//! - Persist open matches across restarts
//! - Deliver alarms anywhere; it only returns records
//!
//! # Example Usage
//!
//! ```
//! use alarm_monitor::{Event, Monitor, MonitorConfig, RecordKind};
//!
//! let config = MonitorConfig::new().with_window_duration_ms(3000);
//! let mut monitor = Monitor::new(config).unwrap();
//!
//! monitor.process_event(Event::critical("ne-7", 0)).unwrap();
//! let records = monitor.process_event(Event::clear("ne-7", 2500)).unwrap();
//!
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].kind, RecordKind::Suppressed);
//! ```

// Public modules
pub mod automaton;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod timer;
pub mod types;
pub mod watermark;

// Re-export main types for convenience
pub use config::{MatchPolicy, MonitorConfig};
pub use emitter::{OutputRecord, RecordKind};
pub use engine::{BatchOutput, Monitor, MonitorStats, PartitionWorker};
pub use types::{
    EntityKey, Event, MatchId, MatchResult, MonitorError, RawEvent, Result, Severity, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

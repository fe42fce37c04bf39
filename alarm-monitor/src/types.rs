//! Core types for the alarm monitor library
//!
//! This module defines the records the engine consumes (events), the records
//! it produces (match results) and the error type shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event-time timestamp in milliseconds
pub type Timestamp = i64;

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Identifier of a monitored entity (e.g. a network element)
///
/// Sources may identify entities by number or by name; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    /// Numeric identifier (rack id, element id, ...)
    Id(i64),
    /// Symbolic identifier
    Name(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Id(id) => write!(f, "{}", id),
            EntityKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(id: i64) -> Self {
        EntityKey::Id(id)
    }
}

impl From<i32> for EntityKey {
    fn from(id: i32) -> Self {
        EntityKey::Id(i64::from(id))
    }
}

impl From<String> for EntityKey {
    fn from(name: String) -> Self {
        EntityKey::Name(name)
    }
}

impl From<&str> for EntityKey {
    fn from(name: &str) -> Self {
        EntityKey::Name(name.to_string())
    }
}

/// Severity reported by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Fault condition, opens a match window
    Critical,
    /// Resolution of a fault, closes open windows
    Clear,
    /// Any other recognized severity; only advances the clock
    Other,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Clear => write!(f, "CLEAR"),
            Severity::Other => write!(f, "OTHER"),
        }
    }
}

impl FromStr for Severity {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "CLEAR" => Ok(Severity::Clear),
            "MAJOR" | "MINOR" | "WARNING" | "INFO" | "OTHER" => Ok(Severity::Other),
            _ => Err(MonitorError::InvalidEvent(format!(
                "unrecognized severity '{}'",
                s
            ))),
        }
    }
}

/// A validated severity event - the unit the engine consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Entity this event reports on
    pub entity_key: EntityKey,
    /// Reported severity
    pub severity: Severity,
    /// Event time in milliseconds
    pub event_time: Timestamp,
}

impl Event {
    /// Create a new event
    pub fn new(
        entity_key: impl Into<EntityKey>,
        severity: Severity,
        event_time: Timestamp,
    ) -> Self {
        Self {
            entity_key: entity_key.into(),
            severity,
            event_time,
        }
    }

    /// Shorthand for a CRITICAL event
    pub fn critical(entity_key: impl Into<EntityKey>, event_time: Timestamp) -> Self {
        Self::new(entity_key, Severity::Critical, event_time)
    }

    /// Shorthand for a CLEAR event
    pub fn clear(entity_key: impl Into<EntityKey>, event_time: Timestamp) -> Self {
        Self::new(entity_key, Severity::Clear, event_time)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}[{}]", self.severity, self.event_time, self.entity_key)
    }
}

/// Event as delivered by the source, before validation
///
/// Every field is optional so that incomplete records can be deserialized
/// and rejected as [`MonitorError::InvalidEvent`] instead of failing the
/// whole input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub entity_key: Option<EntityKey>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub event_time: Option<Timestamp>,
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        Self {
            entity_key: Some(event.entity_key),
            severity: Some(event.severity.to_string()),
            event_time: Some(event.event_time),
        }
    }
}

impl TryFrom<RawEvent> for Event {
    type Error = MonitorError;

    fn try_from(raw: RawEvent) -> Result<Self> {
        let entity_key = raw
            .entity_key
            .ok_or_else(|| MonitorError::InvalidEvent("missing entity key".to_string()))?;
        let severity = raw
            .severity
            .as_deref()
            .ok_or_else(|| MonitorError::InvalidEvent("missing severity".to_string()))?
            .parse::<Severity>()?;
        let event_time = raw
            .event_time
            .ok_or_else(|| MonitorError::InvalidEvent("missing event time".to_string()))?;

        Ok(Event {
            entity_key,
            severity,
            event_time,
        })
    }
}

/// Identifier of one open match instance
///
/// Ids are allocated in creation order, so comparing ids compares age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one match, produced exactly once when it closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// A CLEAR arrived within the window; no alarm is raised
    Suppressed {
        first_event: Event,
        second_event: Event,
    },
    /// The window elapsed without a CLEAR
    Alarm { first_event: Event },
}

impl MatchResult {
    /// The CRITICAL event that opened the match
    pub fn first_event(&self) -> &Event {
        match self {
            MatchResult::Suppressed { first_event, .. } => first_event,
            MatchResult::Alarm { first_event } => first_event,
        }
    }
}

/// Errors raised by the monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Late event for {key}: time {event_time} is below watermark {watermark}")]
    LateEvent {
        key: EntityKey,
        event_time: Timestamp,
        watermark: Timestamp,
    },

    #[error("Timer desync on match {match_id}: {reason}")]
    TimerDesync { match_id: MatchId, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    /// Structural errors that leave the engine state untrustworthy
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::TimerDesync { .. })
    }
}

//! Output records
//!
//! Turns closed matches into the flat records handed to downstream
//! consumers. Alarms are operator-facing; suppressed records only exist for
//! audit and carry both events of the pair.

use crate::types::{EntityKey, MatchResult, Severity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record kind on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    Alarm,
    Suppressed,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Alarm => write!(f, "ALARM"),
            RecordKind::Suppressed => write!(f, "SUPPRESSED"),
        }
    }
}

/// One output record per closed match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub kind: RecordKind,
    pub entity_key: EntityKey,
    pub first_event_time: Timestamp,
    pub first_event_severity: Severity,
    /// Time of the resolving CLEAR; only present for suppressed records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_event_time: Option<Timestamp>,
}

impl From<MatchResult> for OutputRecord {
    fn from(result: MatchResult) -> Self {
        match result {
            MatchResult::Suppressed {
                first_event,
                second_event,
            } => OutputRecord {
                kind: RecordKind::Suppressed,
                entity_key: first_event.entity_key,
                first_event_time: first_event.event_time,
                first_event_severity: first_event.severity,
                second_event_time: Some(second_event.event_time),
            },
            MatchResult::Alarm { first_event } => OutputRecord {
                kind: RecordKind::Alarm,
                entity_key: first_event.entity_key,
                first_event_time: first_event.event_time,
                first_event_severity: first_event.severity,
                second_event_time: None,
            },
        }
    }
}

/// Appends exactly one record per closed match to an output stream
#[derive(Debug, Default)]
pub struct ResultEmitter {
    alarms: u64,
    suppressed: u64,
}

impl ResultEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, result: MatchResult, out: &mut Vec<OutputRecord>) {
        let record = OutputRecord::from(result);
        match record.kind {
            RecordKind::Alarm => {
                self.alarms += 1;
                log::info!(
                    "ALARM {} (critical since {})",
                    record.entity_key,
                    record.first_event_time
                );
            }
            RecordKind::Suppressed => {
                self.suppressed += 1;
                log::debug!(
                    "Suppressed flap on {} ({} -> {:?})",
                    record.entity_key,
                    record.first_event_time,
                    record.second_event_time
                );
            }
        }
        out.push(record);
    }

    /// Number of alarm records emitted so far
    pub fn alarms(&self) -> u64 {
        self.alarms
    }

    /// Number of suppressed records emitted so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

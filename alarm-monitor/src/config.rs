//! Monitor configuration types
//!
//! Only the options that change matching semantics live here. Source-side
//! parameters (file paths, pacing, ...) belong to the application layer.

use crate::types::{MonitorError, Result};
use serde::{Deserialize, Serialize};

/// How a CRITICAL is handled while another match is open for the same key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Every CRITICAL opens its own independently timed match
    #[default]
    Overlapping,
    /// At most one open match per key; extra CRITICALs are folded into it
    SingleOpen,
}

/// Configuration for the monitor engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Grace period between CRITICAL and CLEAR in milliseconds (default: 3000ms)
    #[serde(default = "default_window_duration")]
    pub window_duration_ms: u64,

    /// Number of key-sharded partition workers (default: 1)
    #[serde(default = "default_partition_count")]
    pub partition_count: usize,

    /// Policy for a CRITICAL arriving while a match is already open
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

fn default_window_duration() -> u64 {
    3000
}

fn default_partition_count() -> usize {
    1
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_duration_ms: default_window_duration(),
            partition_count: default_partition_count(),
            match_policy: MatchPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Create a new monitor configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the grace window
    pub fn with_window_duration_ms(mut self, window_ms: u64) -> Self {
        self.window_duration_ms = window_ms;
        self
    }

    /// Builder method: set the number of partition workers
    pub fn with_partition_count(mut self, partitions: usize) -> Self {
        self.partition_count = partitions;
        self
    }

    /// Builder method: set the concurrent match policy
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Window length as a signed event-time offset
    pub fn window(&self) -> i64 {
        i64::try_from(self.window_duration_ms).unwrap_or(i64::MAX)
    }

    /// Check that the configuration can drive an engine
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(MonitorError::InvalidConfig(
                "partition_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

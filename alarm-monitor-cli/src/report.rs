//! Record output and run summary
//!
//! Records are written as JSON lines (one record per line, the wire format)
//! or as aligned text with RFC 3339 times for reading on a terminal.

use crate::config::OutputFormat;
use alarm_monitor::{MonitorStats, OutputRecord, RecordKind, Timestamp};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use std::io::Write;

pub struct RecordWriter<W: Write> {
    out: W,
    format: OutputFormat,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    pub fn write(&mut self, record: &OutputRecord) -> Result<()> {
        match self.format {
            OutputFormat::Jsonl => {
                serde_json::to_writer(&mut self.out, record).context("Failed to serialize record")?;
                writeln!(self.out)?;
            }
            OutputFormat::Txt => writeln!(self.out, "{}", format_record(record))?,
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Failed to flush output")
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush().context("Failed to flush output")?;
        Ok(self.out)
    }
}

/// Render a millisecond timestamp as RFC 3339, falling back to raw millis
pub fn format_time(ms: Timestamp) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{}ms", ms))
}

pub fn format_record(record: &OutputRecord) -> String {
    match record.kind {
        RecordKind::Alarm => format!(
            "{:<10} {:<16} {} since {}",
            record.kind.to_string(),
            record.entity_key.to_string(),
            record.first_event_severity,
            format_time(record.first_event_time)
        ),
        RecordKind::Suppressed => format!(
            "{:<10} {:<16} {} at {}, cleared at {}",
            record.kind.to_string(),
            record.entity_key.to_string(),
            record.first_event_severity,
            format_time(record.first_event_time),
            record
                .second_event_time
                .map(format_time)
                .unwrap_or_else(|| "-".to_string())
        ),
    }
}

/// Print the run counters
pub fn write_summary(out: &mut dyn Write, stats: &MonitorStats) -> Result<()> {
    writeln!(out, "───────────────────────────────────────────────")?;
    writeln!(out, "  Run Summary")?;
    writeln!(out, "───────────────────────────────────────────────")?;
    writeln!(out, "  Events processed:  {}", stats.events_processed)?;
    writeln!(out, "  Invalid events:    {}", stats.invalid_events)?;
    writeln!(out, "  Late events:       {}", stats.late_events)?;
    writeln!(out, "  Folded CRITICALs:  {}", stats.folded_criticals)?;
    writeln!(out, "  Unmatched CLEARs:  {}", stats.unmatched_clears)?;
    writeln!(out, "  Alarms:            {}", stats.alarms)?;
    writeln!(out, "  Suppressed flaps:  {}", stats.suppressed)?;
    writeln!(out, "  Still open:        {}", stats.open_matches)?;
    Ok(())
}

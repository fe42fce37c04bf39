//! Event source: JSON-lines records from files or stdin
//!
//! Each non-empty line is one [`RawEvent`]. Lines that are not valid JSON
//! are skipped and counted; validation of the fields themselves happens in
//! the monitor.

use alarm_monitor::RawEvent;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

pub struct JsonLinesSource {
    reader: Box<dyn BufRead>,
    label: String,
    line_no: usize,
    malformed: u64,
}

impl JsonLinesSource {
    /// Open a file, or stdin for "-"
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Self::from_reader(Box::new(BufReader::new(io::stdin())), "<stdin>"));
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open event file: {:?}", path))?;
        Ok(Self::from_reader(
            Box::new(BufReader::new(file)),
            &path.display().to_string(),
        ))
    }

    pub fn from_reader(reader: Box<dyn BufRead>, label: &str) -> Self {
        Self {
            reader,
            label: label.to_string(),
            line_no: 0,
            malformed: 0,
        }
    }

    /// Lines skipped because they were not valid JSON
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

impl Iterator for JsonLinesSource {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(
                        Err(e).with_context(|| format!("Failed to read from {}", self.label)),
                    )
                }
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<RawEvent>(trimmed) {
                Ok(raw) => return Some(Ok(raw)),
                Err(e) => {
                    self.malformed += 1;
                    log::warn!("{}:{}: skipping malformed event: {}", self.label, self.line_no, e);
                }
            }
        }
    }
}

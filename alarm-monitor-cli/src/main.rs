//! Alarm Monitor CLI Application
//!
//! This is the command-line front end for the alarm-monitor library.
//! It adds:
//! - JSON-lines event ingestion from files or stdin
//! - TOML configuration with command-line overrides
//! - Record output (JSON lines or text) and a run summary

use alarm_monitor::{BatchOutput, MatchPolicy, Monitor};
use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

mod config;
mod report;
mod source;

use config::{AppConfig, OutputFormat};
use report::RecordWriter;
use source::JsonLinesSource;

/// Alarm Monitor - Separate real alarms from flapping CRITICAL/CLEAR events
#[derive(Parser, Debug)]
#[command(name = "alarm-monitor-cli")]
#[command(about = "Suppress flapping alarms in a severity event stream", long_about = None)]
#[command(version)]
struct Args {
    /// JSON-lines event file(s); "-" or none reads stdin (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    input: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Grace window between CRITICAL and CLEAR in milliseconds
    #[arg(long, value_name = "MS")]
    window_ms: Option<u64>,

    /// Number of key-sharded partition workers
    #[arg(short, long, value_name = "N")]
    partitions: Option<usize>,

    /// Handling of a CRITICAL while a match is already open for its key
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Output file for records (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Record format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Events handed to the monitor per batch
    #[arg(long, value_name = "COUNT")]
    batch_size: Option<usize>,

    /// Advance every partition to this time once the input is exhausted
    #[arg(long, value_name = "MS")]
    final_watermark: Option<i64>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PolicyArg {
    Overlapping,
    SingleOpen,
}

impl From<PolicyArg> for MatchPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Overlapping => MatchPolicy::Overlapping,
            PolicyArg::SingleOpen => MatchPolicy::SingleOpen,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Alarm Monitor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using monitor library v{}", alarm_monitor::VERSION);

    let config = resolve_config(&args)?;
    run(&config, args.quiet)
}

/// Load the config file (if any) and apply command-line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if !args.input.is_empty() {
        config.input.files = args.input.clone();
    }
    if let Some(window) = args.window_ms {
        config.monitor.window_duration_ms = window;
    }
    if let Some(partitions) = args.partitions {
        config.monitor.partition_count = partitions;
    }
    if let Some(policy) = args.policy {
        config.monitor.match_policy = policy.into();
    }
    if let Some(output) = &args.output {
        config.output.path = Some(output.clone());
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(batch_size) = args.batch_size {
        config.input.batch_size = batch_size.max(1);
    }
    if args.final_watermark.is_some() {
        config.output.final_watermark = args.final_watermark;
    }

    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Feed every input through the monitor and write the records
fn run(config: &AppConfig, quiet: bool) -> Result<()> {
    let mut monitor = Monitor::new(config.monitor.clone())
        .context("Invalid monitor configuration")?;

    let sink: Box<dyn Write> = match &config.output.path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut writer = RecordWriter::new(sink, config.output.format);

    let inputs = if config.input.files.is_empty() {
        vec![PathBuf::from("-")]
    } else {
        config.input.files.clone()
    };

    let mut malformed = 0;
    for input in &inputs {
        log::info!("Reading events from {:?}", input);
        let mut source = JsonLinesSource::open(input)?;
        let mut batch = Vec::with_capacity(config.input.batch_size);

        for raw in source.by_ref() {
            batch.push(raw?);
            if batch.len() >= config.input.batch_size {
                write_output(&mut writer, monitor.process_batch(std::mem::take(&mut batch)))?;
            }
        }
        write_output(&mut writer, monitor.process_batch(batch))?;
        malformed += source.malformed();
    }

    if let Some(clock) = config.output.final_watermark {
        log::info!("Closing punctuation at {}", clock);
        write_output(&mut writer, monitor.advance_watermark(clock))?;
    }

    let written = writer.written();
    writer.finish()?;

    let mut stats = monitor.stats();
    stats.invalid_events += malformed;
    log::info!("{} record(s) written", written);
    if stats.open_matches > 0 {
        log::info!("{} open match(es) abandoned at end of input", stats.open_matches);
    }

    if config.output.include_summary && !quiet {
        report::write_summary(&mut io::stderr(), &stats)?;
    }

    Ok(())
}

/// Write every record of a batch, then fail if a partition halted on it
fn write_output<W: Write>(writer: &mut RecordWriter<W>, output: BatchOutput) -> Result<()> {
    for record in &output.records {
        writer.write(record)?;
    }
    if output.is_complete() {
        return Ok(());
    }

    writer.flush()?;
    let mut halted = output.halted.into_iter();
    let Some((partition, err)) = halted.next() else {
        return Ok(());
    };
    for (other, other_err) in halted {
        log::error!("Partition {} halted: {}", other, other_err);
    }
    Err(anyhow::Error::new(err).context(format!("Partition {} halted", partition)))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "alarm-monitor-cli",
            "--window-ms",
            "500",
            "-p",
            "3",
            "--policy",
            "single-open",
            "--format",
            "txt",
        ]);
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.monitor.window_duration_ms, 500);
        assert_eq!(config.monitor.partition_count, 3);
        assert_eq!(config.monitor.match_policy, MatchPolicy::SingleOpen);
        assert_eq!(config.output.format, OutputFormat::Txt);
    }

    #[test]
    fn test_records_written_before_partition_failure() {
        use alarm_monitor::{Event, MatchId, MatchResult, MonitorError, OutputRecord};

        let record = OutputRecord::from(MatchResult::Alarm {
            first_event: Event::critical(4, 0),
        });
        let output = BatchOutput {
            records: vec![record],
            halted: vec![(
                1,
                MonitorError::TimerDesync {
                    match_id: MatchId(0),
                    reason: "open match had no pending timer".to_string(),
                },
            )],
        };

        let mut writer = RecordWriter::new(Vec::new(), OutputFormat::Jsonl);
        let err = write_output(&mut writer, output).unwrap_err();
        assert!(format!("{:#}", err).contains("Partition 1 halted"));

        assert_eq!(writer.written(), 1);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert!(text.contains("\"ALARM\""));
        assert!(text.contains("\"entityKey\":4"));
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.jsonl");
        let output = dir.path().join("records.jsonl");
        std::fs::write(
            &input,
            concat!(
                "{\"entityKey\": 1, \"severity\": \"CRITICAL\", \"eventTime\": 0}\n",
                "{\"entityKey\": 1, \"severity\": \"CLEAR\", \"eventTime\": 2500}\n",
                "{\"entityKey\": 2, \"severity\": \"CRITICAL\", \"eventTime\": 3000}\n",
                "garbage\n",
            ),
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.input.files = vec![input];
        config.output.path = Some(output.clone());
        config.output.final_watermark = Some(10_000);
        run(&config, true).unwrap();

        let text = std::fs::read_to_string(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"SUPPRESSED\""));
        assert!(lines[1].contains("\"ALARM\""));
        assert!(lines[1].contains("\"entityKey\":2"));
    }
}

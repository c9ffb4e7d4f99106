//! Sentinel CLI - Command-line interface for Synheart Sentinel
//!
//! Commands:
//! - replay: Replay a recorded interaction stream and print the resulting snapshot
//! - score: Score a list of click records
//! - schema: Print the snapshot contract
//! - doctor: Diagnose configuration and stored state

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use synheart_sentinel::clock::ManualClock;
use synheart_sentinel::snapshot::SnapshotBuilder;
use synheart_sentinel::store::{FileStore, MemoryStore, SnapshotStore};
use synheart_sentinel::types::{BehavioralSnapshot, ClickRecord, InteractionEvent, TimedEvent};
use synheart_sentinel::{
    click_pattern_score, BehaviorSession, SentinelConfig, SentinelError, PRODUCER_NAME,
    SENTINEL_VERSION,
};

/// Sentinel - On-device behavioral telemetry engine
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author = "Synheart AI Inc")]
#[command(version = SENTINEL_VERSION)]
#[command(about = "Reduce interaction streams into behavioral snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON interaction events and print the final snapshot
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Directory holding the durable snapshot slot (in-memory if omitted)
        #[arg(long)]
        state: Option<PathBuf>,

        /// JSON config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Discard any stored snapshot and start a fresh session identity first
        #[arg(long)]
        reset: bool,

        /// Pretty-print the snapshot
        #[arg(long)]
        pretty: bool,
    },

    /// Score a JSON array of click records
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the snapshot contract
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },

    /// Diagnose configuration and stored state
    Doctor {
        /// JSON config file to validate
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding the durable snapshot slot
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SentinelCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            state,
            config,
            reset,
            pretty,
        } => cmd_replay(&input, &output, state.as_deref(), config.as_deref(), reset, pretty),

        Commands::Score { input } => cmd_score(&input),

        Commands::Schema { json_schema } => cmd_schema(json_schema),

        Commands::Doctor {
            config,
            state,
            json,
        } => cmd_doctor(config.as_deref(), state.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    state: Option<&Path>,
    config: Option<&Path>,
    reset: bool,
    pretty: bool,
) -> Result<(), SentinelCliError> {
    let config = load_config(config)?;
    let events = parse_timed_events(open_input(input)?)?;

    let Some(first) = events.first() else {
        return Err(SentinelCliError::NoEvents);
    };

    let clock = ManualClock::new(first.timestamp);
    let store: Box<dyn SnapshotStore> = match state {
        Some(dir) => Box::new(FileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    let mut session = BehaviorSession::new(config, clock.clone(), store);

    if reset {
        session.reset();
    } else {
        session.init();
    }

    let mut unloaded = false;
    for timed in &events {
        run_timers_until(&mut session, &clock, timed.timestamp);
        clock.set(timed.timestamp);
        session.handle_event(&timed.event);
        unloaded = timed.event == InteractionEvent::Unload;
    }

    // The recording ends where the page was left
    if !unloaded {
        session.handle_event(&InteractionEvent::Unload);
    }

    let snapshot = session.get_snapshot();
    let rendered = if pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    write_output(output, &rendered)
}

/// Fire every timer due at or before `until`, each at its own deadline
fn run_timers_until<S: SnapshotStore>(
    session: &mut BehaviorSession<ManualClock, S>,
    clock: &ManualClock,
    until: chrono::DateTime<chrono::Utc>,
) {
    while let Some(deadline) = session.next_deadline() {
        if deadline > until {
            break;
        }
        clock.set(deadline);
        session.poll_timers();
    }
}

fn cmd_score(input: &Path) -> Result<(), SentinelCliError> {
    let mut raw = String::new();
    open_input(input)?.read_to_string(&mut raw)?;
    let clicks: Vec<ClickRecord> = serde_json::from_str(&raw)?;

    let report = ScoreReport {
        clicks: clicks.len(),
        click_pattern_score: click_pattern_score(&clicks),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_schema(json_schema: bool) -> Result<(), SentinelCliError> {
    if json_schema {
        println!("{}", get_snapshot_json_schema());
        return Ok(());
    }

    println!("Snapshot Schema: {PRODUCER_NAME} {SENTINEL_VERSION}");
    println!();
    println!("A flat JSON object persisted after a 500 ms quiet period and on page exit:");
    println!();
    println!("- sessionId: opaque session identifier");
    println!("- startTimestamp: session start (RFC3339)");
    println!("- cursorTravelUnits: raw pointer distance travelled");
    println!("- typingSpeedCharsPerMinute: printable keystrokes per minute");
    println!("- clickPatternScore: click human-likeness, 0-1 (1 with fewer than 2 clicks)");
    println!("- secondsOnPage: time since session start");
    println!("- scrollTier: none | short (1-3) | medium (4-10) | long (>10 scroll events)");
    println!("- captchaSuccess: 1 if a verification challenge passed, else 0");
    println!("- formFillSeconds: total time spent in form-control spans");
    println!();
    println!("Numeric fields are rounded to 2 decimal places.");
    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    state: Option<&Path>,
    json: bool,
) -> Result<(), SentinelCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sentinel_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Sentinel version {SENTINEL_VERSION}"),
    });

    let resolved = match load_config(config) {
        Ok(cfg) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "debounce {} ms, form quiescence {} ms, slot '{}'",
                    cfg.debounce_ms, cfg.form_quiescence_ms, cfg.storage_key
                ),
            });
            Some(cfg)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            });
            None
        }
    };

    if let (Some(dir), Some(cfg)) = (state, resolved.as_ref()) {
        checks.push(check_state_slot(dir, &cfg.storage_key));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input <file> to replay)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay --input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SENTINEL_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sentinel Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SentinelCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_state_slot(dir: &Path, storage_key: &str) -> DoctorCheck {
    let store = FileStore::new(dir);
    let name = "state".to_string();

    match store.load(storage_key) {
        Ok(Some(raw)) => {
            let fallback = BehavioralSnapshot::zeroed("", chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
            match SnapshotBuilder::decode(&raw, &fallback) {
                Ok(snapshot) => DoctorCheck {
                    name,
                    status: CheckStatus::Ok,
                    message: format!(
                        "Snapshot for session '{}' ({} s on page)",
                        snapshot.session_id, snapshot.seconds_on_page
                    ),
                },
                Err(e) => DoctorCheck {
                    name,
                    status: CheckStatus::Warning,
                    message: format!("Stored snapshot unreadable, default will be served: {e}"),
                },
            }
        }
        Ok(None) => DoctorCheck {
            name,
            status: CheckStatus::Warning,
            message: format!("No snapshot at {}", store.slot_path(storage_key).display()),
        },
        Err(e) => DoctorCheck {
            name,
            status: CheckStatus::Error,
            message: format!("Cannot read state: {e}"),
        },
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<SentinelConfig, SentinelCliError> {
    match path {
        Some(path) => Ok(SentinelConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(SentinelConfig::default()),
    }
}

fn open_input(input: &Path) -> Result<Box<dyn BufRead>, SentinelCliError> {
    if input.to_string_lossy() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(input)?)))
    }
}

fn parse_timed_events(reader: Box<dyn BufRead>) -> Result<Vec<TimedEvent>, SentinelCliError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: TimedEvent = serde_json::from_str(trimmed).map_err(|e| {
            SentinelCliError::ParseError(format!("line {}: {}", index + 1, e))
        })?;
        events.push(event);
    }
    // Events are processed in dispatch order; a recording must not go back in time
    if events.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        return Err(SentinelCliError::ParseError(
            "events are not in timestamp order".to_string(),
        ));
    }
    Ok(events)
}

fn write_output(output: &Path, data: &str) -> Result<(), SentinelCliError> {
    if output.to_string_lossy() == "-" {
        println!("{data}");
    } else {
        fs::write(output, format!("{data}\n"))?;
    }
    Ok(())
}

fn get_snapshot_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "BehavioralSnapshot",
        "type": "object",
        "required": [
            "sessionId", "startTimestamp", "cursorTravelUnits", "typingSpeedCharsPerMinute",
            "clickPatternScore", "secondsOnPage", "scrollTier", "captchaSuccess", "formFillSeconds"
        ],
        "properties": {
            "sessionId": { "type": "string" },
            "startTimestamp": { "type": "string", "format": "date-time" },
            "cursorTravelUnits": { "type": "number", "minimum": 0 },
            "typingSpeedCharsPerMinute": { "type": "number", "minimum": 0 },
            "clickPatternScore": { "type": "number", "minimum": 0, "maximum": 1 },
            "secondsOnPage": { "type": "number", "minimum": 0 },
            "scrollTier": { "type": "string", "enum": ["none", "short", "medium", "long"] },
            "captchaSuccess": { "type": "integer", "enum": [0, 1] },
            "formFillSeconds": { "type": "number", "minimum": 0 }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum SentinelCliError {
    Io(io::Error),
    Engine(SentinelError),
    Json(serde_json::Error),
    NoEvents,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for SentinelCliError {
    fn from(e: io::Error) -> Self {
        SentinelCliError::Io(e)
    }
}

impl From<SentinelError> for SentinelCliError {
    fn from(e: SentinelError) -> Self {
        SentinelCliError::Engine(e)
    }
}

impl From<serde_json::Error> for SentinelCliError {
    fn from(e: serde_json::Error) -> Self {
        SentinelCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SentinelCliError> for CliError {
    fn from(e: SentinelCliError) -> Self {
        match e {
            SentinelCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SentinelCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the config file and state directory".to_string()),
            },
            SentinelCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            SentinelCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            SentinelCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            SentinelCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Each line must be a timestamped interaction event".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ScoreReport {
    clicks: usize,
    click_pattern_score: f64,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::io::Cursor;

    fn reader(text: &str) -> Box<dyn BufRead> {
        Box::new(Cursor::new(text.to_string()))
    }

    #[test]
    fn test_parse_timed_events_skips_blank_lines() {
        let input = concat!(
            r#"{"timestamp":"2024-01-15T14:00:00Z","type":"pointer_move","x":1.0,"y":2.0}"#,
            "\n\n",
            r#"{"timestamp":"2024-01-15T14:00:01Z","type":"unload"}"#,
            "\n",
        );
        let events = parse_timed_events(reader(input)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event, InteractionEvent::Unload);
    }

    #[test]
    fn test_parse_timed_events_rejects_out_of_order() {
        let input = concat!(
            r#"{"timestamp":"2024-01-15T14:00:05Z","type":"scroll"}"#,
            "\n",
            r#"{"timestamp":"2024-01-15T14:00:01Z","type":"scroll"}"#,
        );
        assert!(matches!(
            parse_timed_events(reader(input)),
            Err(SentinelCliError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_timed_events_reports_line() {
        let input = "{\"timestamp\":\"2024-01-15T14:00:00Z\",\"type\":\"scroll\"}\nnot json\n";
        match parse_timed_events(reader(input)) {
            Err(SentinelCliError::ParseError(msg)) => assert!(msg.starts_with("line 2")),
            _ => panic!("expected a parse error"),
        }
    }

    #[test]
    fn test_run_timers_until_fires_at_deadline() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let store = MemoryStore::new();
        let mut session =
            BehaviorSession::new(SentinelConfig::default(), clock.clone(), store.clone());
        session.init();
        session.handle_event(&InteractionEvent::Scroll);
        assert_eq!(store.write_count(), 1);

        run_timers_until(&mut session, &clock, start + Duration::seconds(10));

        assert_eq!(store.write_count(), 2);
        assert!(!session.has_pending_write());
        // The write happened at the debounce deadline, not at the horizon
        assert_eq!(session.get_snapshot().seconds_on_page, 0.5);
    }
}

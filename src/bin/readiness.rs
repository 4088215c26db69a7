//! Readiness CLI - Command-line interface for Synheart Readiness
//!
//! Commands:
//! - run: Process daily records into readiness reports
//! - learn: Learn a personalized emission table from history
//! - defaults: Print the built-in model
//! - doctor: Validate model, personalization and state files

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use synheart_readiness::cpt::CptStore;
use synheart_readiness::mapper::EvidenceMapper;
use synheart_readiness::personalization::{PersonalizedCpt, ShrinkageParams, DEFAULT_SHRINK_K};
use synheart_readiness::pipeline::{DailyRecord, ProcessorState, ReadinessProcessor};
use synheart_readiness::report::DailyReport;
use synheart_readiness::{PRODUCER_NAME, READINESS_VERSION};

/// Readiness - Daily athlete recovery and readiness estimation
#[derive(Parser)]
#[command(name = "readiness")]
#[command(author = "Synheart AI Inc")]
#[command(version = READINESS_VERSION)]
#[command(about = "Estimate daily readiness state from training and recovery signals", long_about = None)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process daily records into readiness reports
    Run {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Model file (defaults to the built-in model)
        #[arg(long)]
        cpt: Option<PathBuf>,

        /// Personalized emission table produced by `learn`
        #[arg(long)]
        personalized: Option<PathBuf>,

        /// Load processor state from file
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save processor state to file after processing
        #[arg(long)]
        save_state: Option<PathBuf>,

        /// Map raw sleep measurements using the Apple sleep score
        #[arg(long)]
        apple_sleep_score: bool,
    },

    /// Learn a personalized emission table from a user's history
    Learn {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Model file (defaults to the built-in model)
        #[arg(long)]
        cpt: Option<PathBuf>,

        /// Per-cell shrinkage strength toward the defaults
        #[arg(long, default_value_t = DEFAULT_SHRINK_K)]
        shrink_k: f64,

        /// Map raw sleep measurements using the Apple sleep score
        #[arg(long)]
        apple_sleep_score: bool,
    },

    /// Print the built-in model as JSON
    Defaults {
        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Validate model, personalization and state files
    Doctor {
        /// Check a model file
        #[arg(long)]
        cpt: Option<PathBuf>,

        /// Check a personalized emission table
        #[arg(long)]
        personalized: Option<PathBuf>,

        /// Check a processor state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one daily record per line)
    Ndjson,
    /// JSON array of daily records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one report per line)
    Ndjson,
    /// JSON array of reports
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

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

/// Install a stderr subscriber; RUST_LOG takes precedence over `--log-level`
fn init_logging(level: &str, format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("synheart_readiness={level},readiness={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: Cli) -> Result<(), ReadinessCliError> {
    match cli.command {
        Commands::Run {
            input,
            output,
            input_format,
            output_format,
            cpt,
            personalized,
            load_state,
            save_state,
            apple_sleep_score,
        } => cmd_run(RunOptions {
            input: &input,
            output: &output,
            input_format,
            output_format,
            cpt: cpt.as_deref(),
            personalized: personalized.as_deref(),
            load_state: load_state.as_deref(),
            save_state: save_state.as_deref(),
            apple_sleep_score,
        }),

        Commands::Learn {
            input,
            output,
            input_format,
            cpt,
            shrink_k,
            apple_sleep_score,
        } => cmd_learn(
            &input,
            &output,
            input_format,
            cpt.as_deref(),
            shrink_k,
            apple_sleep_score,
        ),

        Commands::Defaults { output } => {
            let json = CptStore::default().to_json()?;
            write_output(&output, &(json + "\n"))
        }

        Commands::Doctor {
            cpt,
            personalized,
            state,
            json,
        } => cmd_doctor(cpt.as_deref(), personalized.as_deref(), state.as_deref(), json),
    }
}

struct RunOptions<'a> {
    input: &'a Path,
    output: &'a Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    cpt: Option<&'a Path>,
    personalized: Option<&'a Path>,
    load_state: Option<&'a Path>,
    save_state: Option<&'a Path>,
    apple_sleep_score: bool,
}

fn cmd_run(opts: RunOptions<'_>) -> Result<(), ReadinessCliError> {
    let store = Arc::new(load_store(opts.cpt)?);
    let mut processor = ReadinessProcessor::with_store(store)?
        .with_mapper(EvidenceMapper::new(opts.apple_sleep_score));

    if let Some(path) = opts.personalized {
        let cpt = PersonalizedCpt::from_json(&fs::read_to_string(path)?)?;
        processor.install_personalized(Arc::new(cpt))?;
    }

    if let Some(path) = opts.load_state {
        processor.load_state(&fs::read_to_string(path)?)?;
    }

    let records = read_records(opts.input, &opts.input_format)?;
    if records.is_empty() {
        return Err(ReadinessCliError::NoRecords);
    }

    let mut reports = Vec::with_capacity(records.len());
    for record in &records {
        reports.push(processor.process_day(record)?);
    }
    info!(days = reports.len(), "processed daily records");

    if let Some(path) = opts.save_state {
        fs::write(path, processor.save_state()?)?;
    }

    write_output(opts.output, &format_output(&reports, &opts.output_format)?)
}

fn cmd_learn(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    cpt: Option<&Path>,
    shrink_k: f64,
    apple_sleep_score: bool,
) -> Result<(), ReadinessCliError> {
    let store = load_store(cpt)?;
    let shrinkage = ShrinkageParams {
        shrink_k,
        ..Default::default()
    };
    shrinkage.validate().map_err(synheart_readiness::ComputeError::from)?;

    let records = read_records(input, &input_format)?;
    if records.is_empty() {
        return Err(ReadinessCliError::NoRecords);
    }

    let mapper = EvidenceMapper::new(apple_sleep_score);
    let personalized = PersonalizedCpt::fit(&store, &records, &mapper, &shrinkage);
    info!(
        learning_days = personalized.learning_days,
        alpha = personalized.alpha,
        "fitted personalized emission table"
    );

    write_output(output, &(personalized.to_json()? + "\n"))
}

fn cmd_doctor(
    cpt: Option<&Path>,
    personalized: Option<&Path>,
    state: Option<&Path>,
    json: bool,
) -> Result<(), ReadinessCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "readiness_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Readiness version {}", READINESS_VERSION),
    });

    let defaults = CptStore::default();
    checks.push(match defaults.validate() {
        Ok(()) => DoctorCheck::ok("builtin_model", "Built-in model is valid"),
        Err(e) => DoctorCheck::error("builtin_model", format!("Built-in model invalid: {}", e)),
    });

    if let Some(path) = cpt {
        checks.push(check_file("cpt", path, |content| {
            CptStore::from_json(content)
                .map(|_| "Model file valid".to_string())
                .map_err(|e| e.to_string())
        }));
    }

    if let Some(path) = personalized {
        checks.push(check_file("personalized", path, |content| {
            PersonalizedCpt::from_json(content)
                .map(|p| {
                    format!(
                        "Personalized table valid ({} learning days, alpha {:.3})",
                        p.learning_days, p.alpha
                    )
                })
                .map_err(|e| e.to_string())
        }));
    }

    if let Some(path) = state {
        checks.push(check_file("state", path, |content| {
            serde_json::from_str::<ProcessorState>(content)
                .map(|s| {
                    format!(
                        "State file valid ({} training days, last date {})",
                        s.history.len(),
                        s.last_date
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "none".to_string())
                    )
                })
                .map_err(|e| e.to_string())
        }));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)")
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (streaming mode ready)")
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: READINESS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Readiness Doctor Report");
        println!("=======================");
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
        Err(ReadinessCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn check_file<F>(name: &str, path: &Path, validate: F) -> DoctorCheck
where
    F: FnOnce(&str) -> Result<String, String>,
{
    if !path.exists() {
        return DoctorCheck {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist", path.display()),
        };
    }
    match fs::read_to_string(path) {
        Ok(content) => match validate(&content) {
            Ok(message) => DoctorCheck::ok(name, message),
            Err(e) => DoctorCheck::error(name, format!("Invalid file: {}", e)),
        },
        Err(e) => DoctorCheck::error(name, format!("Cannot read file: {}", e)),
    }
}

fn load_store(path: Option<&Path>) -> Result<CptStore, ReadinessCliError> {
    match path {
        Some(path) => Ok(CptStore::from_json(&fs::read_to_string(path)?)?),
        None => Ok(CptStore::default()),
    }
}

fn read_input(input: &Path) -> Result<String, ReadinessCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, format: &InputFormat) -> Result<Vec<DailyRecord>, ReadinessCliError> {
    let data = read_input(input)?;
    match format {
        InputFormat::Json => Ok(serde_json::from_str(&data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line.trim()).map_err(|e| {
                    ReadinessCliError::ParseError(format!("Line {}: {}", i + 1, e))
                })
            })
            .collect(),
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), ReadinessCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output(reports: &[DailyReport], format: &OutputFormat) -> Result<String, ReadinessCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for report in reports {
                lines.push(serde_json::to_string(report)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(reports)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(reports)?),
    }
}

// Error types

#[derive(Debug)]
enum ReadinessCliError {
    Io(io::Error),
    Compute(synheart_readiness::ComputeError),
    Json(serde_json::Error),
    NoRecords,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for ReadinessCliError {
    fn from(e: io::Error) -> Self {
        ReadinessCliError::Io(e)
    }
}

impl From<synheart_readiness::ComputeError> for ReadinessCliError {
    fn from(e: synheart_readiness::ComputeError) -> Self {
        ReadinessCliError::Compute(e)
    }
}

impl From<serde_json::Error> for ReadinessCliError {
    fn from(e: serde_json::Error) -> Self {
        ReadinessCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ReadinessCliError> for CliError {
    fn from(e: ReadinessCliError) -> Self {
        use synheart_readiness::ComputeError;
        match e {
            ReadinessCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ReadinessCliError::Compute(e @ ComputeError::Configuration(_)) => CliError {
                code: "CONFIGURATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'readiness doctor --cpt <file>' to check the model".to_string()),
            },
            ReadinessCliError::Compute(e @ ComputeError::OutOfOrderDay { .. }) => CliError {
                code: "OUT_OF_ORDER".to_string(),
                message: e.to_string(),
                hint: Some("Records must be in increasing date order, after any loaded state".to_string()),
            },
            ReadinessCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure input records match the daily record format".to_string()),
            },
            ReadinessCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ReadinessCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No daily records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            ReadinessCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            ReadinessCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

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

impl DoctorCheck {
    fn ok(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.into(),
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

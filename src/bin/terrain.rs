//! Terrain CLI - Command-line interface for VitalMind Terrain
//!
//! Commands:
//! - analyze: Build stress and calming clusters from a sample file
//! - validate: Report samples the pipeline would skip
//! - doctor: Diagnose configuration and environment
//! - config: Print the default configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

use vitalmind_terrain::ingest::SampleReader;
use vitalmind_terrain::overlay::{heatmap_points, HeatmapPoint, TerrainReport};
use vitalmind_terrain::types::HealthSample;
use vitalmind_terrain::{
    InMemorySampleStore, StressTerrainAnalyzer, TerrainConfig, TerrainError, PRODUCER_NAME,
    TERRAIN_VERSION,
};

/// Terrain - stress and calming zones from located heart-rate samples
#[derive(Parser)]
#[command(name = "terrain")]
#[command(version = TERRAIN_VERSION)]
#[command(about = "Map stress and calming zones from heart-rate samples", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build stress and calming clusters from a sample file
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Trailing window in days (defaults to the configured window)
        #[arg(long)]
        days: Option<u32>,

        /// End of the window (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// User identifier recorded in the report
        #[arg(long, default_value = "local")]
        user: String,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Local clock offset from UTC in minutes (overrides the config file)
        #[arg(long, allow_hyphen_values = true)]
        utc_offset_minutes: Option<i32>,

        /// Include map markers in the report
        #[arg(long)]
        markers: bool,
    },

    /// Report samples the pipeline would skip
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// One cluster per line
    Ndjson,
    /// Heatmap points only
    Heatmap,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), TerrainCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            days,
            now,
            user,
            config,
            utc_offset_minutes,
            markers,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(offset) = utc_offset_minutes {
                config.utc_offset_minutes = offset;
                config.validate()?;
            }
            let request = AnalyzeRequest {
                days: days.unwrap_or(config.default_day_window),
                now: parse_now(now.as_deref())?,
                user,
                markers,
            };
            cmd_analyze(&input, &output, input_format, output_format, config, request).await
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Config => {
            println!("{}", TerrainConfig::default().to_json()?);
            Ok(())
        }
    }
}

struct AnalyzeRequest {
    days: u32,
    now: DateTime<Utc>,
    user: String,
    markers: bool,
}

async fn cmd_analyze(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: TerrainConfig,
    request: AnalyzeRequest,
) -> Result<(), TerrainCliError> {
    let samples = read_samples(input, &input_format)?;
    if samples.is_empty() {
        return Err(TerrainCliError::NoSamples);
    }
    info!(samples = samples.len(), "Loaded health samples");

    if request.days == 0 {
        return Err(TerrainCliError::Terrain(TerrainError::InvalidWindow(
            "day count must be at least 1".to_string(),
        )));
    }

    let store = Arc::new(InMemorySampleStore::new());
    store.insert(&request.user, samples).await;

    let analyzer = StressTerrainAnalyzer::with_config(store, config);
    let result = analyzer
        .terrain_data_at(&request.user, request.days, request.now)
        .await;
    debug!(
        stress = result.stress_clusters.len(),
        calming = result.calming_clusters.len(),
        "Analysis complete"
    );

    let output_data = match output_format {
        OutputFormat::Heatmap => {
            let heatmap = HeatmapOutput {
                stress: heatmap_points(&result.stress_clusters),
                calming: heatmap_points(&result.calming_clusters),
            };
            serde_json::to_string_pretty(&heatmap)?
        }
        OutputFormat::Json | OutputFormat::JsonPretty | OutputFormat::Ndjson => {
            let mut report = TerrainReport::new(&request.user, request.days, result);
            if request.markers {
                report = report.with_markers();
            }
            match output_format {
                OutputFormat::Json => report.to_json()?,
                OutputFormat::Ndjson => report.to_ndjson()?,
                _ => report.to_json_pretty()?,
            }
        }
    };

    write_output(output, &output_data)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), TerrainCliError> {
    let samples = read_samples(input, &input_format)?;
    let issues = SampleReader::validate_samples(&samples);

    let report = ValidationReport {
        total_samples: samples.len(),
        usable_samples: samples.len() - issues.len(),
        skipped_samples: issues.len(),
        errors: issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                timestamp: issue.timestamp,
                error: issue.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total samples:   {}", report.total_samples);
        println!("Usable samples:  {}", report.usable_samples);
        println!("Skipped samples: {}", report.skipped_samples);

        if !report.errors.is_empty() {
            println!("\nSkipped:");
            for err in &report.errors {
                println!(
                    "  - Sample {} (timestamp {}): {}",
                    err.index, err.timestamp, err.error
                );
            }
        }
    }

    if report.usable_samples == 0 {
        Err(TerrainCliError::NoUsableSamples(report.total_samples))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), TerrainCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "terrain_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Terrain version {}", TERRAIN_VERSION),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match TerrainConfig::load(config_path) {
                Ok(loaded) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid ({} day window, {:.0} m cells, UTC{:+} min)",
                        loaded.default_day_window,
                        loaded.grid_cell_meters,
                        loaded.utc_offset_minutes
                    ),
                }),
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid config: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist, defaults will be used".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass samples with --input FILE)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: TERRAIN_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Terrain Doctor Report");
        println!("=====================");
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

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(TerrainCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<TerrainConfig, TerrainCliError> {
    match path {
        Some(path) => Ok(TerrainConfig::load(path)?),
        None => Ok(TerrainConfig::default()),
    }
}

fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>, TerrainCliError> {
    match now {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| TerrainCliError::BadTimestamp(format!("{text}: {e}"))),
        None => Ok(Utc::now()),
    }
}

fn read_samples(input: &Path, format: &InputFormat) -> Result<Vec<HealthSample>, TerrainCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let samples = match format {
        InputFormat::Ndjson => SampleReader::parse_ndjson(&input_data)?,
        InputFormat::Json => SampleReader::parse_array(&input_data)?,
    };
    Ok(samples)
}

fn write_output(output: &Path, data: &str) -> Result<(), TerrainCliError> {
    if output.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum TerrainCliError {
    Io(io::Error),
    Terrain(TerrainError),
    Json(serde_json::Error),
    BadTimestamp(String),
    NoSamples,
    NoUsableSamples(usize),
    DoctorFailed,
}

impl From<io::Error> for TerrainCliError {
    fn from(e: io::Error) -> Self {
        TerrainCliError::Io(e)
    }
}

impl From<TerrainError> for TerrainCliError {
    fn from(e: TerrainError) -> Self {
        TerrainCliError::Terrain(e)
    }
}

impl From<serde_json::Error> for TerrainCliError {
    fn from(e: serde_json::Error) -> Self {
        TerrainCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TerrainCliError> for CliError {
    fn from(e: TerrainCliError) -> Self {
        match e {
            TerrainCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TerrainCliError::Terrain(TerrainError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'terrain config' to see a valid configuration".to_string()),
            },
            TerrainCliError::Terrain(TerrainError::InvalidWindow(msg)) => CliError {
                code: "INVALID_WINDOW".to_string(),
                message: msg,
                hint: Some("Pass --days with a value of at least 1".to_string()),
            },
            TerrainCliError::Terrain(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Ensure each sample has a numeric timestamp field".to_string()),
            },
            TerrainCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TerrainCliError::BadTimestamp(msg) => CliError {
                code: "BAD_TIMESTAMP".to_string(),
                message: msg,
                hint: Some("Use RFC 3339, e.g. 2024-05-20T18:00:00Z".to_string()),
            },
            TerrainCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            TerrainCliError::NoUsableSamples(total) => CliError {
                code: "NO_USABLE_SAMPLES".to_string(),
                message: format!("None of {} samples has a location and heart rate", total),
                hint: Some("Samples need heart_rate, latitude and longitude".to_string()),
            },
            TerrainCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct HeatmapOutput {
    stress: Vec<HeatmapPoint>,
    calming: Vec<HeatmapPoint>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_samples: usize,
    usable_samples: usize,
    skipped_samples: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp: i64,
    error: String,
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

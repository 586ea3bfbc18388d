//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trigger Decoder - crank/cam trigger wheel decoding toolkit
#[derive(Parser, Debug)]
#[command(
    name = "trigger-decoder",
    author,
    version,
    about = "Crank/cam trigger wheel pattern toolkit",
    long_about = "Validate trigger wheel pattern files, inspect the generated edge template,\n\
                  and replay synthetic engine rotations through the phase tracker."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRIGGER_DECODER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRIGGER_DECODER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a pattern file and build its timeline
    Validate(ValidateArgs),

    /// Display the decoded pattern and its edge template
    Info(InfoArgs),

    /// Replay synthetic rotations through a decode worker
    Replay(ReplayArgs),
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to pattern file (TOML or JSON)
    #[arg(short, long, default_value = "trigger.toml", env = "TRIGGER_DECODER_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to pattern file (TOML or JSON)
    #[arg(short, long, default_value = "trigger.toml", env = "TRIGGER_DECODER_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every edge of one cycle
    #[arg(long)]
    pub events: bool,
}

/// Arguments for the `replay` command
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    /// Path to pattern file (TOML or JSON)
    #[arg(short, long, default_value = "trigger.toml", env = "TRIGGER_DECODER_CONFIG")]
    pub config: PathBuf,

    /// Engine cycles to generate
    #[arg(long, default_value = "4", env = "TRIGGER_DECODER_CYCLES")]
    pub cycles: usize,

    /// Constant engine speed
    #[arg(long, default_value = "1000.0", env = "TRIGGER_DECODER_RPM")]
    pub rpm: f64,

    /// Trigger angle the wheel is at when the replay starts
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    pub start_angle: f64,

    /// Leave out every secondary edge (sensor failure)
    #[arg(long, conflicts_with = "secondary_delay")]
    pub drop_secondary: bool,

    /// Delay every secondary edge by this many degrees
    #[arg(long)]
    pub secondary_delay: Option<f64>,

    /// Uniform per-edge angle noise in degrees
    #[arg(long, default_value = "0.0")]
    pub jitter: f64,

    /// Seed for the jitter generator
    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Edge queue capacity between feeder and decode thread
    #[arg(long, default_value = "1024", env = "TRIGGER_DECODER_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Replay timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TRIGGER_DECODER_TIMEOUT")]
    pub timeout: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRIGGER_DECODER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Print the replay report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "idvet",
    about = "idvet: verify, deduplicate, and count identity records",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest a tab-separated identity file
    Run(RunArgs),
    /// Write synthetic identity lines
    Generate(GenerateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Input file, one record per line
    pub input: PathBuf,
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Column layout: standard, split-name, no-password, auto
    #[arg(long)]
    pub layout: Option<String>,
    /// Verification strategy: direct, admission, backpressure, barrier, phase
    #[arg(long)]
    pub strategy: Option<String>,
    /// Simulated verifier latency in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u64>,
    /// List every malformed record after the summary
    #[arg(long)]
    pub show_malformed: bool,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Number of lines to write
    #[arg(short = 'n', long, default_value_t = 100)]
    pub count: usize,
    /// Fraction of lines that repeat an earlier person's name and email
    #[arg(long, default_value_t = 0.2)]
    pub duplicates: f64,
    /// Fraction of lines written with a missing column
    #[arg(long, default_value_t = 0.0)]
    pub malformed: f64,
    /// Seed for reproducible output
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML configuration file to merge over the defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

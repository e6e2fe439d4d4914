//! Metrics CLI for API request and webhook delivery logs.
//!
//! Reads a JSON log export, builds the metrics report and writes JSON and
//! text reports to the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use apimetrics::config::Config;
use apimetrics::config_loader::{self, CliOverrides};
use apimetrics::metrics::{self, input, report, Roster};

#[derive(Parser, Debug)]
#[command(name = "apimetrics")]
#[command(about = "Usage metrics and anomaly detection for API request and webhook logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long, global = true, default_value = "metrics_output")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Fixed UTC offset for hour/day buckets, e.g. +02:00 (default: local time)
    #[arg(long, global = true)]
    utc_offset: Option<String>,

    /// Number of entries in each summary leaderboard
    #[arg(long, global = true)]
    top_n: Option<usize>,

    /// Local OpenAPI document to use as the operation catalog
    #[arg(long, global = true)]
    catalog_file: Option<PathBuf>,

    /// URL of the OpenAPI document to use as the operation catalog
    #[arg(long, global = true)]
    catalog_url: Option<String>,

    /// Skip the operation catalog entirely
    #[arg(long, global = true)]
    no_catalog: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze an API request log export
    Requests {
        /// JSON array of request records
        input: PathBuf,

        /// JSON array of administrators ({id, name, email}) for actor labels
        #[arg(long)]
        roster: Option<PathBuf>,
    },

    /// Analyze a webhook delivery log export
    Webhooks {
        /// JSON array of delivery records
        input: PathBuf,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            utc_offset: self.utc_offset.clone(),
            top_n: self.top_n,
            catalog_file: self.catalog_file.clone(),
            catalog_url: self.catalog_url.clone(),
            no_catalog: self.no_catalog,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let mut config = config_loader::load_config_or_default(cli.config.as_deref())?;
    config_loader::apply_overrides(&mut config, &cli.overrides())?;

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory: {}", cli.output.display()))?;

    match &cli.command {
        Commands::Requests { input, roster } => {
            run_requests(&config, input, roster.as_deref(), &cli.output)?;
        }
        Commands::Webhooks { input } => {
            run_webhooks(&config, input, &cli.output)?;
        }
    }

    log::info!("Reports written to {}", cli.output.display());
    Ok(())
}

fn load_roster(path: Option<&Path>) -> Result<Roster> {
    let Some(path) = path else {
        return Ok(Roster::empty());
    };
    let value = input::read_json_file(path)?;
    let roster = input::parse_roster(value)
        .with_context(|| format!("Invalid roster file {}", path.display()))?;
    log::info!("Loaded {} roster entries", roster.len());
    Ok(roster)
}

fn run_requests(config: &Config, input_path: &Path, roster_path: Option<&Path>, output: &Path) -> Result<()> {
    log::info!("Loading request log from {}...", input_path.display());
    let value = input::read_json_file(input_path)?;
    let records = input::parse_request_records(value)
        .with_context(|| format!("Invalid request log {}", input_path.display()))?;
    let roster = load_roster(roster_path)?;

    let settings = config.engine_settings()?;
    let catalog_source = config.catalog_source();
    log::info!("Operation catalog source: {}", catalog_source.describe());

    let report = metrics::build_metrics_report(&records, &roster, catalog_source.as_ref(), &settings);

    report::generate_json_report(&report, &output.join("request_metrics.json"))?;
    report::generate_text_report(&report, &output.join("request_metrics.txt"))?;
    report::print_summary(&report);
    Ok(())
}

fn run_webhooks(config: &Config, input_path: &Path, output: &Path) -> Result<()> {
    log::info!("Loading webhook log from {}...", input_path.display());
    let value = input::read_json_file(input_path)?;
    let records = input::parse_delivery_records(value)
        .with_context(|| format!("Invalid webhook log {}", input_path.display()))?;

    let metrics = metrics::build_webhook_metrics(&records, config.time_basis()?);

    report::generate_json_report(&metrics, &output.join("webhook_metrics.json"))?;
    report::generate_webhook_text_report(&metrics, &output.join("webhook_metrics.txt"))?;
    report::print_webhook_summary(&metrics);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests_command() {
        let cli = Cli::try_parse_from([
            "apimetrics",
            "requests",
            "requests.json",
            "--roster",
            "admins.json",
            "--utc-offset",
            "+02:00",
            "--no-catalog",
        ])
        .unwrap();

        match &cli.command {
            Commands::Requests { input, roster } => {
                assert_eq!(input, &PathBuf::from("requests.json"));
                assert_eq!(roster.as_deref(), Some(Path::new("admins.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
        let overrides = cli.overrides();
        assert_eq!(overrides.utc_offset.as_deref(), Some("+02:00"));
        assert!(overrides.no_catalog);
        assert_eq!(cli.output, PathBuf::from("metrics_output"));
    }

    #[test]
    fn test_parse_webhooks_command() {
        let cli = Cli::try_parse_from(["apimetrics", "-j", "4", "webhooks", "deliveries.json"]).unwrap();
        assert_eq!(cli.threads, 4);
        assert!(matches!(cli.command, Commands::Webhooks { .. }));
    }

    #[test]
    fn test_input_is_required() {
        assert!(Cli::try_parse_from(["apimetrics", "requests"]).is_err());
    }
}

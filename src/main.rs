//! Civic-Collector main entry point
//!
//! This is the command-line interface for the municipal document link collector.

use anyhow::Context;
use civic_collector::config::{load_config, load_config_with_hash, Config, OutputConfig, SourceKind};
use civic_collector::crawler::{ExitStatus, RunCoordinator};
use civic_collector::logging::init_logging;
use civic_collector::output::{print_manifest_stats, print_run_summary, print_verify_report, verify_outputs};
use civic_collector::storage::{open_storage, Storage};
use civic_collector::CollectorError;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Civic-Collector: a polite municipal document link collector
///
/// Civic-Collector fetches the listing pages of configured municipal sources,
/// discovers document links, classifies them by document type, and merges
/// them into year-partitioned JSON stores.
#[derive(Parser, Debug)]
#[command(name = "civic-collector")]
#[command(version = "1.0.0")]
#[command(about = "A polite municipal document link collector", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect document links from the configured sources
    Collect {
        /// Path to TOML configuration file
        #[arg(long, default_value = "sources.toml")]
        config: PathBuf,

        /// Only collect this source (id or name), even if disabled
        #[arg(long)]
        source: Option<String>,

        /// Validate config and show what would be collected without any network access
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the store files on disk
    Verify {
        /// Configuration file locating the output directory
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output root, used when no configuration is given
        #[arg(long, default_value = "outputs")]
        output: PathBuf,

        /// Only this source id
        #[arg(long)]
        source: Option<String>,

        /// Only this year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Show manifest statistics
    Stats {
        /// Configuration file locating the output directory
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output root, used when no configuration is given
        #[arg(long, default_value = "outputs")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let status = match cli.command {
        Command::Collect {
            config,
            source,
            dry_run,
        } => handle_collect(&config, source.as_deref(), dry_run, cli.verbose, cli.quiet).await,
        Command::Verify {
            config,
            output,
            source,
            year,
        } => {
            init_logging(cli.verbose, cli.quiet, None);
            run_handler(|| handle_verify(config.as_deref(), &output, source.as_deref(), year))
        }
        Command::Stats { config, output } => {
            init_logging(cli.verbose, cli.quiet, None);
            run_handler(|| handle_stats(config.as_deref(), &output))
        }
    };

    ExitCode::from(status.code())
}

/// Maps a handler error to exit code 2 (it could not even start) after logging it
fn run_handler(handler: impl FnOnce() -> anyhow::Result<ExitStatus>) -> ExitStatus {
    match handler() {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitStatus::ConfigError
        }
    }
}

/// Handles `collect`, including `--dry-run`
async fn handle_collect(
    config_path: &Path,
    selector: Option<&str>,
    dry_run: bool,
    verbose: u8,
    quiet: bool,
) -> ExitStatus {
    let (config, config_hash) = match load_config_with_hash(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_logging(verbose, quiet, None);
            tracing::error!(
                "Failed to load configuration {}: {}",
                config_path.display(),
                e
            );
            return ExitStatus::ConfigError;
        }
    };

    if dry_run {
        init_logging(verbose, quiet, None);
        return handle_dry_run(&config, selector);
    }

    let logs_dir = config.output.logs_dir();
    if let Some(log_path) = init_logging(verbose, quiet, Some(logs_dir.as_path())) {
        tracing::debug!("Logging to {}", log_path.display());
    }
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        config_path.display(),
        config_hash
    );

    // Nothing has run yet, so any error here is a startup abort
    let coordinator = match RunCoordinator::new(config, &config_hash) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("Failed to start run: {}", e);
            return ExitStatus::ConfigError;
        }
    };

    match coordinator.run(selector).await {
        Ok(summary) => {
            if !quiet {
                print_run_summary(&summary);
            }
            summary.exit_status()
        }
        Err(CollectorError::Config(e)) => {
            tracing::error!("{}", e);
            ExitStatus::ConfigError
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            ExitStatus::ConfigError
        }
    }
}

/// Handles `collect --dry-run`: validates config and shows what would be collected
fn handle_dry_run(config: &Config, selector: Option<&str>) -> ExitStatus {
    let sources = config.select_sources(selector);
    if let Some(sel) = selector {
        if sources.is_empty() {
            tracing::error!("No source matches '{}'", sel);
            return ExitStatus::ConfigError;
        }
    }

    println!("=== Civic-Collector Dry Run ===\n");

    let collector = &config.collector;
    println!("Collector Configuration:");
    println!("  Request timeout: {}s", collector.request_timeout_secs);
    println!("  Connect timeout: {}s", collector.connect_timeout_secs);
    println!(
        "  Retries: {} (backoff {}ms doubling, max {}ms)",
        collector.max_retries, collector.initial_backoff_ms, collector.max_backoff_ms
    );
    println!("  Concurrent sources: {}", collector.max_concurrent_sources);
    match collector.skip_recent_hours {
        Some(hours) => println!("  Skip pages processed within: {}h", hours),
        None => println!("  Skip pages processed within: never"),
    }
    println!("  Respect robots.txt: {}", collector.respect_robots);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Stores: {}", config.output.raw_dir().display());
    println!("  Manifest: {}", config.output.manifest_path().display());
    println!("  Logs: {}", config.output.logs_dir().display());

    println!("\nSources ({}):", sources.len());
    for source in &sources {
        println!(
            "  - {} [{}] {} (delay {}ms{})",
            source.id,
            source.kind.label(),
            source.name,
            source.politeness_delay(collector).as_millis(),
            if source.enabled { "" } else { ", disabled" }
        );
        for url in &source.urls {
            println!("    * {}", url);
        }
        match &source.kind {
            SourceKind::ArcgisLayers { layers } => {
                for layer in layers {
                    println!("    * layer {}", layer);
                }
            }
            SourceKind::DetailPages { detail_host, .. } => {
                println!("    follows detail pages on {}", detail_host);
            }
            _ => {}
        }
        if !source.classify.is_empty() {
            println!("    {} custom classification rule(s)", source.classify.len());
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would collect {} source(s) from {} url(s)",
        sources.len(),
        sources.iter().map(|s| s.entry_urls().len()).sum::<usize>()
    );

    ExitStatus::Success
}

fn output_config(config_path: Option<&Path>, output_root: &Path) -> anyhow::Result<OutputConfig> {
    match config_path {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            Ok(config.output)
        }
        None => Ok(OutputConfig {
            root: output_root.to_string_lossy().into_owned(),
            ..OutputConfig::default()
        }),
    }
}

/// Handles `verify`: checks the store files and prints per-file counts
fn handle_verify(
    config_path: Option<&Path>,
    output_root: &Path,
    source: Option<&str>,
    year: Option<i32>,
) -> anyhow::Result<ExitStatus> {
    let output = output_config(config_path, output_root)?;
    let storage = open_storage(&output);

    let report = verify_outputs(&storage, source, year)
        .with_context(|| format!("Failed to scan {}", storage.raw_dir().display()))?;
    print_verify_report(&report);

    Ok(if report.is_ok() {
        ExitStatus::Success
    } else {
        ExitStatus::PartialFailure
    })
}

/// Handles `stats`: shows manifest statistics
fn handle_stats(config_path: Option<&Path>, output_root: &Path) -> anyhow::Result<ExitStatus> {
    let output = output_config(config_path, output_root)?;
    let storage = open_storage(&output);

    println!("Manifest: {}\n", storage.manifest_path().display());
    let manifest = storage.load_manifest().context("Failed to load manifest")?;
    print_manifest_stats(&manifest.stats());

    Ok(ExitStatus::Success)
}

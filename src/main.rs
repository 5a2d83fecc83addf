use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use issue2epub::{Config, HttpFetcher, IssueAssembler, IssueId, OfflineFetcher, RunOptions};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "issue2epub")]
#[command(about = "CLI utility to turn an issue of Jungle World into an EPUB for offline reading")]
#[command(version)]
struct Args {
    /// Configuration file (default: ./issue2epub.toml if present)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an issue and package it as an EPUB
    Run(RunArgs),
    /// Print the identifier of the current issue
    Current {
        /// Base URL of the site
        #[arg(long = "base-url")]
        base_url: Option<String>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Issue to download, as YYYY/NN or YYYY.NN (default: current issue)
    issue: Option<IssueId>,

    /// Directory holding the page cache
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Output directory for the EPUB
    #[arg(short = 'o', long = "outDir")]
    out_dir: Option<PathBuf>,

    /// Base URL of the site
    #[arg(long = "base-url")]
    base_url: Option<String>,

    /// Request timeout in seconds, 0 for none
    #[arg(short = 't', long = "timeout", value_parser = parse_timeout)]
    timeout: Option<f64>,

    /// Only use cached pages, never touch the network
    #[arg(long = "offline")]
    offline: bool,

    /// Fetch the issue index again even when it is cached
    #[arg(long = "refresh-index")]
    refresh_index: bool,
}

fn parse_timeout(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if !value.is_finite() || value < 0.0 {
        return Err("Must be zero or positive number.".to_string());
    }
    Ok(value)
}

fn load_config(path: Option<&PathBuf>, base_url: Option<String>) -> Result<Config> {
    let mut config = Config::load(path.map(PathBuf::as_path))
        .context("Failed to load configuration")?;
    if let Some(base_url) = base_url {
        config.site.base_url = base_url;
    }
    Ok(config)
}

async fn run_issue(config_path: Option<&PathBuf>, args: RunArgs) -> Result<()> {
    let mut config = load_config(config_path, args.base_url)?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }
    if let Some(out_dir) = args.out_dir {
        config.output_dir = out_dir;
    }
    if let Some(timeout) = args.timeout {
        config.site.timeout_secs = timeout;
    }
    config.validate()?;

    let options = RunOptions {
        refresh_index: args.refresh_index,
    };
    let summary = if args.offline {
        info!("Offline mode, serving from \"{}\" only", config.cache_dir.display());
        issue2epub::run(&config, OfflineFetcher, args.issue, options).await?
    } else {
        let fetcher = HttpFetcher::new(&config.site)?;
        issue2epub::run(&config, fetcher, args.issue, options).await?
    };

    info!(
        "Done: {} articles, {} skipped -> {}",
        summary.report.produced(),
        summary.report.skipped(),
        summary.output.display().to_string().green()
    );
    Ok(())
}

async fn print_current(config_path: Option<&PathBuf>, base_url: Option<String>) -> Result<()> {
    let config = load_config(config_path, base_url)?;
    config.validate()?;
    let fetcher = HttpFetcher::new(&config.site)?;
    let issue = IssueAssembler::new(&config, fetcher)?.current_issue().await?;
    println!("{}", issue);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "issue2epub=debug" } else { "issue2epub=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let result = match args.command {
        Commands::Run(run) => run_issue(args.config.as_ref(), run).await,
        Commands::Current { base_url } => print_current(args.config.as_ref(), base_url).await,
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}

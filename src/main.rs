//! Review Harvester: product reviews from several review sites in one place

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use review_harvester::{
    config::{Config, LogFormat, LoggingConfig},
    harvest::{CaptchaSignal, DriverOptions, HarvestRequest, HttpDriverFactory, Orchestrator},
    output::{write_records, write_statistics},
    types::{DateRange, SourceKind},
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "review-harvester")]
#[command(about = "Harvest product reviews from G2, Capterra and TrustRadius")]
#[command(version)]
struct Cli {
    /// Company or product name to look up on each source
    #[arg(short, long, required_unless_present = "url")]
    company: Option<String>,

    /// Review page URL to use instead of looking the product up
    #[arg(short, long)]
    url: Option<String>,

    /// Source to harvest: g2, capterra, trustradius or all
    #[arg(short, long, default_value = "all")]
    source: String,

    /// Earliest review date to keep (YYYY-MM-DD)
    #[arg(long, value_parser = parse_iso_date)]
    start_date: Option<NaiveDate>,

    /// Latest review date to keep (YYYY-MM-DD)
    #[arg(long, value_parser = parse_iso_date)]
    end_date: Option<NaiveDate>,

    /// Reviews to collect per source
    #[arg(short, long)]
    limit: Option<usize>,

    /// Base delay between page steps in milliseconds
    #[arg(long)]
    delay: Option<u64>,

    /// Page load timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run the browser without a window
    #[arg(long)]
    headless: Option<bool>,

    /// Skip images, fonts and media while loading pages
    #[arg(long)]
    block_resources: Option<bool>,

    /// Proxy URL for every page session
    #[arg(long)]
    proxy: Option<String>,

    /// Run all selected sources at the same time
    #[arg(long)]
    concurrent: bool,

    /// Output file
    #[arg(short, long, default_value = "reviews.json")]
    output: PathBuf,

    /// Configuration file path
    #[arg(long, default_value = "review-harvester.toml")]
    config: PathBuf,

    /// Verbosity level; also writes run statistics next to the output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_iso_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    init_logging(&config.logging, cli.verbose)?;

    let sources = SourceKind::parse_selection(&cli.source).map_err(anyhow::Error::msg)?;
    let request = HarvestRequest {
        company: cli.company.clone(),
        direct_url: cli.url.clone(),
        sources,
        range: DateRange::new(cli.start_date, cli.end_date),
        limit: config.harvest.limit,
    };
    if request.range.start.is_some() != request.range.end.is_some() {
        warn!("Date filtering needs both --start-date and --end-date; keeping all dates");
    }

    let options = DriverOptions::from_config(&config.browser, config.harvest.timeout());
    let factory = Arc::new(HttpDriverFactory::new(options));
    let orchestrator = Orchestrator::new(config.harvest.clone(), factory);

    spawn_captcha_bridge(orchestrator.captcha_signal());
    spawn_interrupt_handler(orchestrator.cancel_token());

    info!(
        "Harvesting up to {} reviews per source from {}",
        request.limit,
        request
            .sources
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let outcome = match orchestrator.run(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    write_records(&cli.output, &outcome.records)?;
    if cli.verbose > 0 {
        write_statistics(&cli.output, &outcome.stats)?;
    }

    let stats = &outcome.stats;
    println!(
        "Collected {} reviews from {} source(s) in {:.1}s -> {}",
        stats.total_records,
        stats.sources.len(),
        stats.elapsed_ms as f64 / 1000.0,
        cli.output.display()
    );
    for failure in &stats.errors {
        println!("  {} failed: {}", failure.source, failure.message);
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(limit) = cli.limit {
        config.harvest.limit = limit;
    }
    if let Some(delay) = cli.delay {
        config.harvest.delay_ms = delay;
    }
    if let Some(timeout) = cli.timeout {
        config.harvest.timeout_ms = timeout;
    }
    if cli.concurrent {
        config.harvest.concurrent_sources = true;
    }
    if let Some(headless) = cli.headless {
        config.browser.headless = headless;
    }
    if let Some(block) = cli.block_resources {
        config.browser.block_resources = block;
    }
    if let Some(proxy) = &cli.proxy {
        config.browser.proxy = Some(proxy.clone());
    }
}

fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = logging.level.raised_by(verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let installed = match logging.format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };
    installed.context("failed to install log subscriber")
}

/// Each line on stdin resumes one harvest waiting on a CAPTCHA
fn spawn_captcha_bridge(signal: CaptchaSignal) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
            signal.resolve();
        }
    });
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the reviews collected so far");
            cancel.cancel();
        }
    });
}

//! # Newswire Ingest
//!
//! A multi-source news ingestion engine: it scrapes a fixed set of news
//! sites on a schedule, normalizes and deduplicates their articles, and
//! publishes each run as a JSON feed.
//!
//! ## Usage
//!
//! ```sh
//! newswire_ingest -c config.yaml -o ./feed          # hourly daemon
//! newswire_ingest --once --source clarin -o ./feed   # single run
//! ```
//!
//! ## Architecture
//!
//! Each run follows a pipeline:
//! 1. **Listing**: every source adapter discovers candidate article URLs
//! 2. **Fetching**: pages are downloaded under global, per-source and
//!    per-host limits, with retry and backoff
//! 3. **Normalizing**: parsed fields are cleaned, validated and deduplicated
//! 4. **Output**: the sealed batch is written atomically as JSON

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod error;
mod fetch;
mod models;
mod normalize;
mod orchestrator;
mod outputs;
mod scrapers;
#[cfg(test)]
mod testing;
mod utils;

use cli::Cli;
use config::Config;
use dedup::{DedupIndex, SharedDedupIndex};
use fetch::{Fetch, HostLimit, HttpFetcher, Politeness, RetryFetch};
use orchestrator::{Orchestrator, RunOutcome, RunSettings};
use outputs::json::JsonFileSink;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    if args.list_sources {
        for adapter in scrapers::registry() {
            println!("{}", adapter.source_name());
        }
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    let adapters = scrapers::select(scrapers::registry(), &config.sources)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        sources = adapters.len(),
        "newswire_ingest starting up"
    );

    // Early check: ensure the feed dir is writable
    if let Err(e) = ensure_writable_dir(&config.output_dir).await {
        error!(
            path = %config.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Fetch stack ----
    let default_limit = HostLimit {
        max_concurrent: config.fetch.host_concurrency,
        min_interval: config.fetch.min_request_interval(),
    };
    let politeness = Arc::new(Politeness::new(default_limit));
    for adapter in &adapters {
        let limit = adapter.rate_limit(default_limit);
        for host in adapter.listing().hosts() {
            debug!(source = adapter.source_name(), %host, ?limit, "Registered host limit");
            politeness.set_limit(&host, limit);
        }
    }
    let http = HttpFetcher::new(&config.fetch.user_agent, politeness)?;
    let fetcher: Arc<dyn Fetch> = Arc::new(
        RetryFetch::new(http, config.fetch.max_attempts, config.fetch.base_delay())
            .with_max_delay(config.fetch.max_delay())
            .with_jitter(Duration::from_millis(config.fetch.jitter_ms)),
    );

    // ---- Dedup state ----
    let index = match &config.dedup_state {
        Some(path) => DedupIndex::load(path, config.dedup_retention(), Utc::now()).await?,
        None => DedupIndex::new(config.dedup_retention()),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        adapters,
        fetcher,
        Arc::new(JsonFileSink::new(&config.output_dir)),
        SharedDedupIndex::new(index),
        RunSettings::from_config(&config),
    ));

    if args.once {
        if let RunOutcome::Completed(report) = orchestrator.trigger().await? {
            info!(path = %report.path.display(), articles = report.articles, "Feed published");
        }
    } else {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        orchestrator.serve(config.interval(), shutdown).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

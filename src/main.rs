//! # Stock Brief
//!
//! Assembles a category-balanced set of full-text reference articles about a
//! stock ticker and drafts a report from them with an LLM.
//!
//! ## Features
//!
//! - Fetches a quote snapshot and daily history for the ticker (or loads a saved copy)
//! - Searches the web for stock, geopolitical, sector, and theme news
//! - Guarantees one article per required category whenever the pool allows it
//! - Retrieves full text through a reader gateway with bounded retries
//! - Blacklists domains that keep failing and repairs coverage gaps in rounds
//! - Writes JSON and text artifacts plus a plain-text and Markdown report
//!
//! ## Usage
//!
//! ```sh
//! stock_brief AAPL -n 5 --period 1y
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Stock data**: Yahoo chart API or `--stock-data`
//! 2. **Search**: One Serper query per category and theme, built into a candidate pool
//! 3. **Selection**: One guaranteed slot per required category, the oracle fills the rest
//! 4. **Retrieval**: Fetch full text, then reconcile failures in gap and fill rounds
//! 5. **Output**: Artifacts under the data dir, report under the output dir

use awful_aj::{config_dir, template};
use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod fetcher;
mod models;
mod oracle;
mod outputs;
mod pool;
mod reconcile;
mod selector;
mod sources;
#[cfg(test)]
mod testing;
mod utils;

use api::{AskFnWrapper, RetryAsk};
use cli::Cli;
use config::AppConfig;
use fetcher::{ContentFetcher, ReaderGateway};
use models::StockData;
use oracle::RelevanceOracle;
use outputs::full_text::FullTextJournal;
use outputs::{json, report};
use reconcile::{ReconcileSettings, Reconciler, SelectionState, StopReason};
use selector::CoverageSelector;
use sources::serper::SerperClient;
use sources::stock::{YahooChartClient, load_stock_data, save_stock_data};
use utils::ensure_writable_dir;

const ORACLE_TEMPLATE: &str = "article_selector";
const REPORT_TEMPLATE: &str = "stock_report";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const STOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[instrument(level = "info", skip_all, fields(ticker = %cfg.ticker))]
async fn obtain_stock_data(cfg: &AppConfig) -> Result<StockData, Box<dyn Error>> {
    let data = match &cfg.stock_data {
        Some(path) => load_stock_data(path).await?,
        None => {
            YahooChartClient::new(STOCK_TIMEOUT)?
                .fetch(&cfg.ticker, &cfg.period)
                .await?
        }
    };
    let target = cfg.stock_data_path();
    if cfg.stock_data.as_deref() != Some(target.as_path()) {
        save_stock_data(&data, &target).await?;
    }
    Ok(data)
}

fn llm_config_path(cfg: &AppConfig) -> Result<PathBuf, Box<dyn Error>> {
    match &cfg.llm_config {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join("config.yaml")),
    }
}

fn spawn_shutdown_watcher() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let watcher = Arc::clone(&flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current round");
            watcher.store(true, Ordering::SeqCst);
        }
    });
    flag
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();

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
    info!("stock_brief starting up");
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!(error = %e, "Failed to load .env"),
    }

    let args = Cli::parse();
    let cfg = match AppConfig::from_cli(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    debug!(ticker = %cfg.ticker, top_n = cfg.top_n, engine = ?cfg.engine, "Resolved configuration");

    for dir in [&cfg.data_dir, &cfg.output_dir] {
        if let Err(e) = ensure_writable_dir(&dir.to_string_lossy()).await {
            error!(path = %dir.display(), error = %e, "Directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }

    let shutdown = spawn_shutdown_watcher();

    // ---- Stock data ----
    let stock = match obtain_stock_data(&cfg).await {
        Ok(stock) => stock,
        Err(e) => {
            error!(error = %e, "Failed to obtain stock data");
            return Err(e);
        }
    };

    // ---- Search and candidate pool ----
    let serper = SerperClient::new(&cfg.serper_api_key, SEARCH_TIMEOUT)?;
    let sources = serper.collect(&cfg.ticker, &cfg.data_dir).await;
    let pool = pool::build_pool(sources);
    if pool.is_empty() {
        error!("No search source produced any candidates");
        return Err("candidate pool is empty".into());
    }
    if let Err(e) = json::write_combined(&stock, &pool, &cfg.data_dir).await {
        warn!(error = %e, "Failed to write combined data");
    }

    // ---- Load templates & LLM config ----
    let config_path = llm_config_path(&cfg)?;
    let config_path_str = config_path.to_string_lossy();
    let llm_config = Arc::new(awful_aj::config::load_config(&config_path_str)?);
    info!(config_path = %config_path_str, "Loaded configuration");
    let selector_template = Arc::new(template::load_template(ORACLE_TEMPLATE).await?);
    let report_template = Arc::new(template::load_template(REPORT_TEMPLATE).await?);
    info!(oracle = ORACLE_TEMPLATE, report = REPORT_TEMPLATE, "Loaded templates");

    let engine = &cfg.engine;
    let oracle_client = RetryAsk::new(
        AskFnWrapper::new(Arc::clone(&llm_config), selector_template, engine.oracle_timeout()),
        engine.oracle_max_retries,
        Duration::from_secs(1),
    );
    let report_client = RetryAsk::new(
        AskFnWrapper::new(llm_config, report_template, engine.oracle_timeout()),
        engine.oracle_max_retries,
        Duration::from_secs(1),
    );

    // ---- Selection, retrieval, reconciliation ----
    let gateway = ReaderGateway::new(&cfg.jina_api_key, &engine.reader_gateway, engine.fetch_timeout())?;
    let fetcher = ContentFetcher::new(gateway, engine.max_retries, engine.retry_delay())
        .with_concurrency(engine.fetch_concurrency)
        .with_journal(FullTextJournal::new(cfg.data_dir.join("full_articles.txt")));
    let mut reconciler = Reconciler::new(
        CoverageSelector::new(engine.selector_candidate_cap),
        RelevanceOracle::new(oracle_client, engine.oracle_candidate_cap),
        fetcher,
        ReconcileSettings {
            fill_rounds: engine.fill_rounds,
        },
    )
    .with_shutdown(shutdown);

    let mut state = SelectionState::new(cfg.top_n);
    let initial = reconciler
        .initial_selection(&pool, &state, &cfg.ticker, cfg.top_n)
        .await;
    if let Err(e) = json::write_articles(&initial, &cfg.data_dir.join("relevant_articles.json")).await {
        warn!(error = %e, "Failed to write relevant articles");
    }

    let outcome = reconciler.run_from(&pool, &cfg.ticker, &mut state, initial).await;
    if let Err(e) = json::write_articles(&outcome.articles, &cfg.data_dir.join("selected_articles.json")).await {
        warn!(error = %e, "Failed to write selected articles");
    }
    if !outcome.missing.is_empty() {
        warn!(
            missing = ?outcome.missing,
            "Some required categories could not be covered"
        );
    }
    let short_reason = match outcome.stop {
        StopReason::QuotaMet => None,
        StopReason::CandidatesExhausted => Some("Candidates exhausted before the quota was met"),
        StopReason::NoPicks => Some("Oracle picked none of the remaining candidates"),
        StopReason::FillRoundsSpent => Some("Fill rounds used up before the quota was met"),
        StopReason::Shutdown => Some("Stopped by interrupt before the quota was met"),
    };
    if let Some(reason) = short_reason {
        warn!(
            selected = outcome.articles.len(),
            top_n = cfg.top_n,
            stop = ?outcome.stop,
            "{reason}"
        );
    }

    // ---- Report ----
    if outcome.articles.is_empty() {
        warn!("No articles were fetched; the report will rest on stock data alone");
    }
    match report::generate_report(&report_client, &cfg.ticker, &stock, &outcome.articles, &cfg.output_dir).await {
        Ok(files) => info!(path = %files.markdown.display(), "Report ready"),
        Err(e) => error!(error = %e, "Report generation failed; artifacts remain in the data dir"),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        articles = outcome.articles.len(),
        rounds = outcome.rounds,
        blacklisted = outcome.blacklist.len(),
        "Execution complete"
    );

    Ok(())
}

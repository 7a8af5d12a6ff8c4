//! Runtime configuration.
//!
//! Three layers, later ones winning:
//!
//! 1. Built-in defaults ([`EngineSettings::default`])
//! 2. An optional YAML settings file (`--settings`)
//! 3. Command-line overrides (`--max-retries`, `--fill-rounds`, `--concurrency`)
//!
//! API keys come from the CLI or the environment (a `.env` file is loaded at
//! startup) and are checked once, here, before any network call is made.

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::fetcher::DEFAULT_READER_GATEWAY;
use crate::oracle::MAX_ORACLE_CANDIDATES;
use crate::selector::SELECTOR_CANDIDATE_CAP;
use crate::sources::stock::validate_period;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Tunables for selection, fetching, and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Fetch attempts per article.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub fetch_concurrency: usize,
    pub oracle_candidate_cap: usize,
    pub selector_candidate_cap: usize,
    /// Fill rounds after the gap rounds; 0 disables them.
    pub fill_rounds: usize,
    pub oracle_timeout_secs: u64,
    /// Oracle retries after the first failed attempt.
    pub oracle_max_retries: usize,
    pub reader_gateway: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            fetch_timeout_secs: 30,
            fetch_concurrency: 4,
            oracle_candidate_cap: MAX_ORACLE_CANDIDATES,
            selector_candidate_cap: SELECTOR_CANDIDATE_CAP,
            fill_rounds: 1,
            oracle_timeout_secs: 60,
            oracle_max_retries: 3,
            reader_gateway: DEFAULT_READER_GATEWAY.to_string(),
        }
    }
}

impl EngineSettings {
    /// Read settings from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Settings {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid("fetch_concurrency must be at least 1".into()));
        }
        if self.oracle_candidate_cap == 0 || self.selector_candidate_cap == 0 {
            return Err(ConfigError::Invalid("candidate caps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a run needs, resolved from the CLI, the environment, and the settings file.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Upper-cased ticker symbol.
    pub ticker: String,
    pub top_n: usize,
    pub period: String,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// `awful_aj` config file; `None` means the default config directory.
    pub llm_config: Option<PathBuf>,
    pub stock_data: Option<PathBuf>,
    pub serper_api_key: String,
    pub jina_api_key: String,
    pub engine: EngineSettings,
}

fn required_key(value: Option<&str>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingKey(name))
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let serper_api_key = required_key(cli.serper_api_key.as_deref(), "SERPER_API_KEY")?;
        let jina_api_key = required_key(cli.jina_api_key.as_deref(), "JINA_API_KEY")?;

        let ticker = cli.ticker.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            return Err(ConfigError::Invalid("ticker must not be empty".into()));
        }
        if cli.articles == 0 {
            return Err(ConfigError::Invalid("--articles must be at least 1".into()));
        }
        validate_period(&cli.period).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut engine = match &cli.settings {
            Some(path) => {
                let settings = EngineSettings::load(path)?;
                info!(path = %path.display(), "Loaded engine settings");
                settings
            }
            None => EngineSettings::default(),
        };
        if let Some(v) = cli.max_retries {
            engine.max_retries = v;
        }
        if let Some(v) = cli.fill_rounds {
            engine.fill_rounds = v;
        }
        if let Some(v) = cli.concurrency {
            engine.fetch_concurrency = v;
        }
        engine.validate()?;

        Ok(Self {
            ticker,
            top_n: cli.articles,
            period: cli.period.clone(),
            data_dir: cli.data_dir.clone(),
            output_dir: cli.output_dir.clone(),
            llm_config: cli.config.clone(),
            stock_data: cli.stock_data.clone(),
            serper_api_key,
            jina_api_key,
            engine,
        })
    }

    pub fn stock_data_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}_stock_data.json", self.ticker))
    }
}

//! Command-line interface definitions for Stock Brief.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! API keys can be provided via command-line flags or environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Stock Brief application.
///
/// # Examples
///
/// ```sh
/// # Five articles, one year of history
/// stock_brief AAPL
///
/// # Eight articles, reuse previously saved stock data
/// stock_brief MSFT -n 8 --stock-data data/MSFT_stock_data.json
///
/// # Gap repair only, no fill rounds
/// stock_brief NVDA --fill-rounds 0
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Cli {
    /// Stock ticker symbol
    pub ticker: String,

    /// Number of articles to select
    #[arg(short = 'n', long, default_value_t = 5)]
    pub articles: usize,

    /// Stock history period (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)
    #[arg(short, long, default_value = "1y")]
    pub period: String,

    /// Directory for search payloads, stock data, and article artifacts
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory for the final report
    #[arg(short, long, default_value = "outputs")]
    pub output_dir: PathBuf,

    /// Optional path to the LLM config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Optional engine settings YAML file
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Load stock data from this JSON file instead of fetching it
    #[arg(long)]
    pub stock_data: Option<PathBuf>,

    /// Override fetch attempts per article
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Override the number of fill rounds (0 disables them)
    #[arg(long)]
    pub fill_rounds: Option<usize>,

    /// Override how many articles are fetched at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Serper search API key
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub serper_api_key: Option<String>,

    /// Jina reader API key
    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    pub jina_api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "stock_brief",
            "AAPL",
            "--articles",
            "8",
            "--period",
            "6mo",
            "--data-dir",
            "./d",
            "--output-dir",
            "./o",
        ]);

        assert_eq!(cli.ticker, "AAPL");
        assert_eq!(cli.articles, 8);
        assert_eq!(cli.period, "6mo");
        assert_eq!(cli.data_dir, PathBuf::from("./d"));
        assert_eq!(cli.output_dir, PathBuf::from("./o"));
    }

    #[test]
    fn test_cli_defaults_and_short_flags() {
        let cli = Cli::parse_from(["stock_brief", "TSLA", "-n", "3", "-c", "/tmp/config.yaml"]);

        assert_eq!(cli.articles, 3);
        assert_eq!(cli.period, "1y");
        assert_eq!(cli.data_dir, PathBuf::from("data"));
        assert_eq!(cli.output_dir, PathBuf::from("outputs"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yaml")));
        assert_eq!(cli.fill_rounds, None);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "stock_brief",
            "TSLA",
            "--fill-rounds",
            "0",
            "--max-retries",
            "5",
            "--concurrency",
            "2",
            "--stock-data",
            "saved.json",
        ]);

        assert_eq!(cli.fill_rounds, Some(0));
        assert_eq!(cli.max_retries, Some(5));
        assert_eq!(cli.concurrency, Some(2));
        assert_eq!(cli.stock_data, Some(PathBuf::from("saved.json")));
    }

    #[test]
    fn test_cli_requires_ticker() {
        assert!(Cli::try_parse_from(["stock_brief"]).is_err());
    }
}

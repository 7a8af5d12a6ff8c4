//! Error taxonomy for the selection and retrieval pipeline.
//!
//! Only configuration and stock-data errors are fatal. Everything else is
//! absorbed at the granularity it occurs (one search source, one oracle call,
//! one article) and recorded instead of propagated.

use reqwest::StatusCode;
use thiserror::Error;

/// A search or stock payload is missing required structure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is missing key `{0}`")]
    MissingKey(&'static str),

    #[error("`{0}` is not an array")]
    NotAnArray(&'static str),

    /// One record lacks `title` or `snippet`; the whole source is rejected.
    #[error("record {index} is missing `title` or `snippet`")]
    MalformedRecord { index: usize },

    #[error("stock data has no history rows")]
    EmptyStockData,
}

/// The relevance oracle could not produce a pick list.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle call failed: {0}")]
    Transport(String),

    #[error("oracle reply has no `Selected articles:` label")]
    Unparseable,
}

/// A single full-text retrieval attempt failed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned {0}")]
    Status(StatusCode),

    #[error("gateway returned an empty body")]
    EmptyBody,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search API returned {0}")]
    Status(StatusCode),
}

#[derive(Error, Debug)]
pub enum StockDataError {
    #[error("stock request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("stock API returned {0}")]
    Status(StatusCode),

    #[error("unsupported period `{0}`")]
    InvalidPeriod(String),

    #[error("no chart result for `{0}`")]
    NoResult(String),

    #[error("invalid stock data: {0}")]
    Invalid(#[from] ValidationError),

    #[error("reading stock data: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoding stock data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Startup configuration problems; reported once, before any network call.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set (export it or add it to .env)")]
    MissingKey(&'static str),

    #[error("reading settings file {path}: {source}")]
    SettingsIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing settings file {path}: {source}")]
    Settings {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

//! Serper (Google Search) client and the per-ticker query plan.
//!
//! Each query is saved verbatim as `<data_dir>/<name>.json` before it is
//! validated, so a run can be inspected after the fact. A query that fails
//! leaves its source absent; the pool builder treats that as an empty
//! category.

use crate::error::SearchError;
use crate::models::Category;
use crate::utils::write_atomic;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const DEFAULT_SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Extra themes searched for every ticker. Their results land in [`Category::Other`].
pub const THEMES: [&str; 4] = [
    "financial performance",
    "market trends",
    "geopolitical risks",
    "sector developments",
];

/// One planned search: where its payload is saved and which category it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// File stem of the saved payload, e.g. `serper_stock_context`.
    pub name: String,
    pub query: String,
    pub category: Category,
}

/// The fixed query plan for `ticker`: one query per required category, then one per theme.
pub fn search_queries(ticker: &str) -> Vec<SearchQuery> {
    let mut queries = vec![
        SearchQuery {
            name: "serper_stock_context".to_string(),
            query: format!("{ticker} stock analysis"),
            category: Category::StockContext,
        },
        SearchQuery {
            name: "serper_geopolitics".to_string(),
            query: format!("Geopolitical events affecting {ticker}"),
            category: Category::GeopoliticsContext,
        },
        SearchQuery {
            name: "serper_sector_news".to_string(),
            query: format!("{ticker} sector news"),
            category: Category::SectorContext,
        },
    ];
    queries.extend(THEMES.iter().enumerate().map(|(i, theme)| SearchQuery {
        name: format!("serper_theme_query_{i}"),
        query: format!("{ticker} {theme}"),
        category: Category::Other,
    }));
    queries
}

#[derive(Debug, Clone)]
pub struct SerperClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerperClient {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: DEFAULT_SERPER_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Run one search and return the raw JSON payload.
    #[instrument(level = "info", skip_all, fields(%query))]
    pub async fn search(&self, query: &str) -> Result<Value, SearchError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query }))
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(SearchError::Status(status));
        }
        let payload: Value = resp.json().await?;
        info!(
            results = payload
                .get("organic")
                .and_then(serde_json::Value::as_array)
                .map_or(0, Vec::len),
            "Serper search complete"
        );
        Ok(payload)
    }

    /// Run every planned query in order, saving each payload under `data_dir`.
    ///
    /// Returns `(category, payload)` pairs ready for the pool builder; a
    /// failed query contributes `None`.
    #[instrument(level = "info", skip_all, fields(%ticker, data_dir = %data_dir.display()))]
    pub async fn collect(&self, ticker: &str, data_dir: &Path) -> Vec<(Category, Option<Value>)> {
        let mut sources = Vec::new();
        for q in search_queries(ticker) {
            let payload = match self.search(&q.query).await {
                Ok(payload) => {
                    let path = data_dir.join(format!("{}.json", q.name));
                    match serde_json::to_vec_pretty(&payload) {
                        Ok(bytes) => {
                            if let Err(e) = write_atomic(&path, &bytes).await {
                                warn!(path = %path.display(), error = %e, "Failed to save search payload");
                            }
                        }
                        Err(e) => warn!(name = %q.name, error = %e, "Failed to encode search payload"),
                    }
                    Some(payload)
                }
                Err(e) => {
                    warn!(name = %q.name, query = %q.query, error = %e, "Search failed; source will be absent");
                    None
                }
            };
            sources.push((q.category, payload));
        }
        sources
    }
}

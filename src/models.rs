//! Data models for candidate articles, categories, and market data.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Category`]: The closed set of topical buckets a search result belongs to
//! - [`Article`]: A candidate article, before and after its full text is fetched
//! - [`CandidatePool`]: Per-category ordered candidates with link-level dedup
//! - [`StockData`]: Quote snapshot and daily history consumed by the report
//!
//! Category names serialize in `SCREAMING_SNAKE_CASE` so the JSON artifacts
//! and the full-text artifact agree on spelling.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Topical bucket of a candidate article.
///
/// The first three variants are *required*: the selector tries to place at
/// least one article from each of them in the final list. [`Category::Other`]
/// is filled on a best-effort basis only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    StockContext,
    GeopoliticsContext,
    SectorContext,
    Other,
}

impl Category {
    /// Required categories in selection priority order.
    pub const REQUIRED: [Category; 3] = [
        Category::StockContext,
        Category::GeopoliticsContext,
        Category::SectorContext,
    ];

    pub const ALL: [Category; 4] = [
        Category::StockContext,
        Category::GeopoliticsContext,
        Category::SectorContext,
        Category::Other,
    ];

    pub fn is_required(self) -> bool {
        !matches!(self, Category::Other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::StockContext => "STOCK_CONTEXT",
            Category::GeopoliticsContext => "GEOPOLITICS_CONTEXT",
            Category::SectorContext => "SECTOR_CONTEXT",
            Category::Other => "OTHER",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts both `STOCK_CONTEXT` and the older `STOCK CONTEXT` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_uppercase().replace(' ', "_");
        match norm.as_str() {
            "STOCK_CONTEXT" => Ok(Category::StockContext),
            "GEOPOLITICS_CONTEXT" => Ok(Category::GeopoliticsContext),
            "SECTOR_CONTEXT" => Ok(Category::SectorContext),
            "OTHER" => Ok(Category::Other),
            _ => Err(format!("unknown category: {s}")),
        }
    }
}

/// Where an article is in its retrieval lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

/// A candidate article about the ticker.
///
/// The `link` is the identity key. Once an article has been fetched
/// successfully it is not modified again; a failed article can be retried by
/// taking a fresh pending copy with [`Article::pending`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    /// Headline as reported by the search source.
    pub title: String,
    /// Short search-result excerpt.
    pub snippet: String,
    /// Absolute URL of the article.
    pub link: String,
    /// Which query bucket produced this article.
    pub category: Category,
    /// Plain-text body; only present after a successful fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(default)]
    pub fetch_status: FetchStatus,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        link: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
            category,
            full_content: None,
            fetch_status: FetchStatus::Pending,
        }
    }

    /// Consume this article and return the fetched copy.
    pub fn succeeded(self, content: String) -> Self {
        Self {
            full_content: Some(content),
            fetch_status: FetchStatus::Succeeded,
            ..self
        }
    }

    pub fn failed(self) -> Self {
        Self {
            full_content: None,
            fetch_status: FetchStatus::Failed,
            ..self
        }
    }

    /// A fresh pending copy, used when a failed article is offered again.
    pub fn pending(&self) -> Self {
        Self {
            full_content: None,
            fetch_status: FetchStatus::Pending,
            ..self.clone()
        }
    }

    /// Lowercased host of the article link, e.g. `"www.reuters.com"`.
    pub fn domain(&self) -> Option<String> {
        crate::utils::domain_of(&self.link)
    }
}

/// Candidate articles grouped by category, in external search rank order.
///
/// No two entries in the whole pool share a link: the first occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    by_category: BTreeMap<Category, Vec<Article>>,
    links: HashSet<String>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an article to the end of its category list.
    ///
    /// Returns `false` (and drops the article) when the link is empty or
    /// already present anywhere in the pool.
    pub fn add(&mut self, article: Article) -> bool {
        if article.link.trim().is_empty() || !self.links.insert(article.link.clone()) {
            return false;
        }
        self.by_category
            .entry(article.category)
            .or_default()
            .push(article);
        true
    }

    pub fn candidates(&self, category: Category) -> &[Article] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every article, categories in enum order and articles in pool order.
    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.by_category.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains_link(&self, link: &str) -> bool {
        self.links.contains(link)
    }
}

/// Snapshot of a ticker's quote fields.
///
/// Every numeric field is optional because upstream sources omit them
/// inconsistently.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockInfo {
    pub symbol: String,
    pub long_name: Option<String>,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
}

/// One daily OHLCV row.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DailyBar {
    /// Trading date in `YYYY-MM-DD` format.
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Open")]
    pub open: Option<f64>,
    #[serde(rename = "High")]
    pub high: Option<f64>,
    #[serde(rename = "Low")]
    pub low: Option<f64>,
    #[serde(rename = "Close")]
    pub close: Option<f64>,
    #[serde(rename = "Volume")]
    pub volume: Option<u64>,
}

/// Quote info plus daily history, as persisted in `<TICKER>_stock_data.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StockData {
    pub info: StockInfo,
    pub history: Vec<DailyBar>,
}

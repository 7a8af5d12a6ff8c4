//! JSON artifacts.
//!
//! `combined_data.json` keeps the stock snapshot next to every candidate the
//! search sources produced, grouped by category. The article lists
//! (`relevant_articles.json`, `selected_articles.json`) are plain arrays of
//! [`Article`].

use crate::models::{Article, CandidatePool, Category, DailyBar, StockData, StockInfo};
use crate::utils::write_atomic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument};

/// One search record as it appears under `serper_data`.
#[derive(Debug, Serialize)]
pub struct SearchRecord<'a> {
    pub title: &'a str,
    pub snippet: &'a str,
    pub link: &'a str,
}

/// Shape of `combined_data.json`.
#[derive(Debug, Serialize)]
pub struct CombinedData<'a> {
    pub stock_info: &'a StockInfo,
    pub stock_history: &'a [DailyBar],
    pub serper_data: BTreeMap<Category, Vec<SearchRecord<'a>>>,
}

impl<'a> CombinedData<'a> {
    pub fn new(stock: &'a StockData, pool: &'a CandidatePool) -> Self {
        let mut serper_data: BTreeMap<Category, Vec<SearchRecord<'a>>> = BTreeMap::new();
        for article in pool.iter() {
            serper_data
                .entry(article.category)
                .or_default()
                .push(SearchRecord {
                    title: &article.title,
                    snippet: &article.snippet,
                    link: &article.link,
                });
        }
        Self {
            stock_info: &stock.info,
            stock_history: &stock.history,
            serper_data,
        }
    }
}

/// Serialize `value` as pretty JSON to `path`, replacing any earlier file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await?;
    info!(bytes = json.len(), "Wrote JSON artifact");
    Ok(())
}

pub async fn write_combined(
    stock: &StockData,
    pool: &CandidatePool,
    data_dir: &Path,
) -> Result<(), Box<dyn Error>> {
    write_json(&CombinedData::new(stock, pool), &data_dir.join("combined_data.json")).await
}

pub async fn write_articles(articles: &[Article], path: &Path) -> Result<(), Box<dyn Error>> {
    write_json(articles, path).await
}

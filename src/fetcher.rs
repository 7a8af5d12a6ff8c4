//! Full-text retrieval with bounded retries and per-domain failure tracking.
//!
//! Articles are fetched through a [`ContentSource`], in production the
//! [`ReaderGateway`] (a bearer-authenticated content-extraction endpoint that
//! returns plain text for `GET {gateway}/{article_url}`).
//!
//! # Retry Strategy
//!
//! - At most `max_retries` attempts per article
//! - Fixed delay between attempts, none after the last one
//! - An empty body counts as a failed attempt
//!
//! A batch never fails as a whole: each article ends up in either
//! `succeeded` or `failed`, and every failed article adds one to its domain's
//! counter in the returned [`FetchReport`].

use crate::error::FetchError;
use crate::models::Article;
use crate::outputs::full_text::FullTextJournal;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Default reader gateway.
pub const DEFAULT_READER_GATEWAY: &str = "https://r.jina.ai";

/// Something that can turn an article link into plain text.
pub trait ContentSource {
    async fn retrieve(&self, link: &str) -> Result<String, FetchError>;
}

/// HTTP client for the content-extraction gateway.
#[derive(Debug, Clone)]
pub struct ReaderGateway {
    http: reqwest::Client,
    api_key: String,
    gateway: String,
}

impl ReaderGateway {
    pub fn new(api_key: &str, gateway: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("stock_brief/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            gateway: gateway.trim_end_matches('/').to_string(),
        })
    }
}

impl ContentSource for ReaderGateway {
    #[instrument(level = "debug", skip_all, fields(%link))]
    async fn retrieve(&self, link: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.gateway, link))
            .bearer_auth(&self.api_key)
            .header("X-Return-Format", "text")
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(body)
    }
}

/// Outcome of one fetch batch.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Fetched articles with `full_content` set, in input order.
    pub succeeded: Vec<Article>,
    /// Articles that exhausted their attempts, in input order.
    pub failed: Vec<Article>,
    /// Failures in this batch per domain; the caller folds these into its tally.
    pub domain_failures: HashMap<String, u32>,
}

/// Fetches full text for batches of articles.
#[derive(Debug)]
pub struct ContentFetcher<S> {
    source: S,
    max_retries: usize,
    retry_delay: Duration,
    concurrency: usize,
    journal: Option<FullTextJournal>,
}

impl<S: ContentSource> ContentFetcher<S> {
    pub fn new(source: S, max_retries: usize, retry_delay: Duration) -> Self {
        Self {
            source,
            max_retries: max_retries.max(1),
            retry_delay,
            concurrency: 1,
            journal: None,
        }
    }

    /// Fetch up to `concurrency` articles of a batch at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Mirror every successful fetch into a full-text artifact.
    pub fn with_journal(mut self, journal: FullTextJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn journal_mut(&mut self) -> Option<&mut FullTextJournal> {
        self.journal.as_mut()
    }

    /// Fetch a batch of articles.
    ///
    /// Results keep input order. Domain counters are tallied once, after the
    /// whole batch has completed.
    #[instrument(level = "info", skip_all, fields(batch = articles.len()))]
    pub async fn fetch(&mut self, articles: Vec<Article>) -> FetchReport {
        let t0 = Instant::now();
        let this = &*self;
        let outcomes: Vec<Result<Article, Article>> = stream::iter(articles)
            .map(|article| this.fetch_one(article))
            .buffered(this.concurrency)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(article) => report.succeeded.push(article),
                Err(article) => {
                    if let Some(domain) = article.domain() {
                        *report.domain_failures.entry(domain).or_insert(0) += 1;
                    }
                    report.failed.push(article);
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Fetch batch complete"
        );

        if let Some(journal) = self.journal.as_mut() {
            journal.record(&report.succeeded).await;
        }
        report
    }

    async fn fetch_one(&self, article: Article) -> Result<Article, Article> {
        for attempt in 1..=self.max_retries {
            match self.source.retrieve(&article.link).await {
                Ok(body) if !body.trim().is_empty() => {
                    debug!(link = %article.link, attempt, bytes = body.len(), "Fetched article");
                    return Ok(article.succeeded(body));
                }
                Ok(_) => {
                    warn!(link = %article.link, attempt, max = self.max_retries, "Empty body; retrying");
                }
                Err(e) => {
                    warn!(link = %article.link, attempt, max = self.max_retries, error = %e, "Fetch attempt failed");
                }
            }
            if attempt < self.max_retries {
                sleep(self.retry_delay).await;
            }
        }
        warn!(link = %article.link, "Giving up on article");
        Err(article.failed())
    }
}

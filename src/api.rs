//! LLM API interaction with exponential backoff retry logic.
//!
//! This module provides the transport used by the relevance oracle and the
//! report writer to talk to an OpenAI-compatible LLM API. It includes
//! automatic retry logic with exponential backoff and jitter, and a hard
//! per-attempt timeout, so no call can block indefinitely.
//!
//! # Architecture
//!
//! The module uses a trait-based design for flexibility:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//!
//! # Retry Strategy
//!
//! - Bounded retry attempts (configured per call site)
//! - Exponential backoff starting at the base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{error, info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like retry logic).
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum number of retry attempts before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Maximum delay cap to prevent excessive waiting.
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = AskFnWrapper::new(config, template, Duration::from_secs(60));
    /// let retry_client = RetryAsk::new(client, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let shift = (attempt - 1).min(16) as u32;
                    let mut delay = self.base_delay.saturating_mul(1 << shift);
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// Each wrapper is bound to one chat template: the relevance oracle uses the
/// `article_selector` template and the report writer uses `stock_report`.
/// Every attempt is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct AskFnWrapper {
    /// LLM configuration (API keys, endpoints, model settings).
    pub config: Arc<AwfulJadeConfig>,
    /// The chat template defining the conversation structure.
    pub template: Arc<ChatTemplate>,
    pub timeout: StdDuration,
}

impl AskFnWrapper {
    pub fn new(
        config: Arc<AwfulJadeConfig>,
        template: Arc<ChatTemplate>,
        timeout: StdDuration,
    ) -> Self {
        Self {
            config,
            template,
            timeout,
        }
    }
}

impl AskAsync for AskFnWrapper {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let call = ask(&self.config, text.to_string(), &self.template, None, None);
        let res = match timeout(self.timeout, call).await {
            Ok(inner) => inner,
            Err(elapsed) => Err(Box::new(elapsed) as Box<dyn Error>),
        };
        let dt = t0.elapsed();

        if let Err(e) = &res {
            warn!(elapsed_ms = dt.as_millis(), error = %e, "API call failed");
        }
        res
    }
}

/// Send one prompt through any [`AskAsync`] client and log the outcome.
///
/// This is the entry point used for one-shot generations such as the final
/// report; the retry policy is whatever the client was built with.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff<A>(client: &A, prompt: &str) -> Result<A::Response, Box<dyn Error>>
where
    A: AskAsync,
{
    let t0 = Instant::now();
    let res = client.ask(prompt).await;
    let dt = t0.elapsed();

    match &res {
        Ok(_) => info!(
            elapsed_ms_total = dt.as_millis(),
            "ask_with_backoff succeeded"
        ),
        Err(e) => {
            error!(elapsed_ms_total = dt.as_millis(), error = %e, "ask_with_backoff failed")
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAsker;

    #[tokio::test]
    async fn test_retry_recovers_after_transient_errors() {
        let inner = ScriptedAsker::new(vec![
            Err("503".to_string()),
            Err("timeout".to_string()),
            Ok("Selected articles: 1".to_string()),
        ]);
        let retry = RetryAsk::new(inner.clone(), 3, StdDuration::ZERO);
        let reply = retry.ask("prompt").await.unwrap();
        assert_eq!(reply, "Selected articles: 1");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let inner = ScriptedAsker::new(vec![
            Err("a".to_string()),
            Err("b".to_string()),
            Err("c".to_string()),
        ]);
        let retry = RetryAsk::new(inner.clone(), 1, StdDuration::ZERO);
        let err = retry.ask("prompt").await.unwrap_err();
        assert_eq!(err.to_string(), "b");
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_ask_with_backoff_passes_through() {
        let client = ScriptedAsker::always("report body");
        let out = ask_with_backoff(&client, "write").await.unwrap();
        assert_eq!(out, "report body");
    }
}

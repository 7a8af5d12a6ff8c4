//! Scripted stand-ins for the LLM and the reader gateway, shared by unit tests.

use crate::api::AskAsync;
use crate::error::FetchError;
use crate::fetcher::ContentSource;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays canned replies in order, then falls back to a fixed outcome.
#[derive(Debug, Clone)]
pub struct ScriptedAsker {
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
    fallback: Result<String, String>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAsker {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback: Err("script exhausted".to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Ok(reply.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl AskAsync for ScriptedAsker {
    type Response = String;

    async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(text.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
            .map_err(|e| e.into())
    }
}

/// Reader gateway double keyed by domain.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    failing: HashSet<String>,
    empty: HashSet<String>,
    /// link -> number of failed attempts before the first success
    flaky: HashMap<String, usize>,
    attempts: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_domain(mut self, domain: &str) -> Self {
        self.failing.insert(domain.to_string());
        self
    }

    pub fn empty_domain(mut self, domain: &str) -> Self {
        self.empty.insert(domain.to_string());
        self
    }

    pub fn flaky_link(mut self, link: &str, failures: usize) -> Self {
        self.flaky.insert(link.to_string(), failures);
        self
    }

    pub fn attempts(&self, link: &str) -> usize {
        self.attempts.lock().unwrap().get(link).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

impl ContentSource for ScriptedSource {
    async fn retrieve(&self, link: &str) -> Result<String, FetchError> {
        let attempt = {
            let mut map = self.attempts.lock().unwrap();
            let n = map.entry(link.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let domain = crate::utils::domain_of(link).unwrap_or_default();
        if self.failing.contains(&domain) {
            return Err(FetchError::Status(StatusCode::INTERNAL_SERVER_ERROR));
        }
        if self.empty.contains(&domain) {
            return Ok(String::new());
        }
        if let Some(&failures) = self.flaky.get(link) {
            if attempt <= failures {
                return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
            }
        }
        Ok(format!("full text of {link}"))
    }
}

//! Relevance oracle client.
//!
//! The oracle is an LLM asked to pick the most relevant articles from a
//! numbered list. Every call site (the initial selection and each
//! reconciliation round) goes through [`RelevanceOracle::select`], which owns
//! prompt formatting, the candidate cap, and reply parsing.
//!
//! The reply is free text. [`parse_reply`] turns it into data: either a clean
//! set of 0-based indices or [`OracleReply::Unparseable`]. Callers never see an
//! error; a failed or unparseable call is an empty pick.

use crate::api::AskAsync;
use crate::error::OracleError;
use crate::models::{Article, Category};
use crate::utils::truncate_for_log;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write;
use tracing::{debug, error, info, instrument, warn};

/// Most candidates placed in one prompt, to stay under the model's payload limit.
pub const MAX_ORACLE_CANDIDATES: usize = 40;

/// Reply label the prompt asks the model to emit.
pub const REPLY_LABEL: &str = "Selected articles:";

static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)selected articles:\s*([^\r\n]*)").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// What one oracle call is asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub ticker: String,
    /// Exact number of picks wanted.
    pub count: usize,
    /// Categories the picks should cover; empty for an unconstrained pick.
    pub focus: Vec<Category>,
}

impl SelectionRequest {
    pub fn new(ticker: impl Into<String>, count: usize) -> Self {
        Self {
            ticker: ticker.into(),
            count,
            focus: Vec::new(),
        }
    }

    pub fn with_focus(mut self, focus: Vec<Category>) -> Self {
        self.focus = focus;
        self
    }
}

/// Parse outcome of an oracle reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleReply {
    /// Valid, unique, 0-based indices into the offered candidates.
    Picks(BTreeSet<usize>),
    /// The reply never contained the `Selected articles:` label.
    Unparseable,
}

impl OracleReply {
    pub fn into_picks(self) -> BTreeSet<usize> {
        match self {
            OracleReply::Picks(p) => p,
            OracleReply::Unparseable => BTreeSet::new(),
        }
    }
}

/// Extract the picked indices from a free-text reply.
///
/// The list starts at the first non-blank text after the label, even when
/// that is on a later line, and runs to the end of that line. Numbers in the reply are 1-based. Zero, values above `offered`, and tokens
/// too large to parse are dropped; duplicates collapse.
pub fn parse_reply(reply: &str, offered: usize) -> OracleReply {
    let Some(caps) = LABEL_RE.captures(reply) else {
        return OracleReply::Unparseable;
    };
    let list = caps.get(1).map_or("", |m| m.as_str());
    let picks = NUMBER_RE
        .find_iter(list)
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter_map(|n| n.checked_sub(1))
        .filter(|&idx| idx < offered)
        .collect();
    OracleReply::Picks(picks)
}

/// Render the selection prompt for the offered candidates.
pub fn build_prompt(candidates: &[Article], request: &SelectionRequest) -> String {
    let mut articles_text = String::new();
    for (idx, article) in candidates.iter().enumerate() {
        let _ = write!(
            articles_text,
            "Article {}:\nTitle: {}\nSnippet: {}\n\n",
            idx + 1,
            article.title,
            article.snippet
        );
    }

    let coverage = if request.focus.is_empty() {
        String::new()
    } else {
        format!(
            ", ensuring coverage of the missing contexts: {}",
            request.focus.iter().join(", ")
        )
    };

    format!(
        "Based on the following articles, select the top {count} most relevant to {ticker}'s stock performance{coverage}.\n\n\
         Articles:\n{articles_text}\
         Please provide a list of the article numbers that are most relevant, formatted as a comma-separated list (e.g., \"{REPLY_LABEL} 1, 2, 3\").",
        count = request.count,
        ticker = request.ticker,
    )
}

/// Picks articles through an LLM.
///
/// Generic over the transport so the retrying `awful_aj` client is used in
/// production and a scripted one in tests.
#[derive(Debug)]
pub struct RelevanceOracle<A> {
    asker: A,
    max_candidates: usize,
}

impl<A> RelevanceOracle<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(asker: A, max_candidates: usize) -> Self {
        Self {
            asker,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Ask the oracle for `request.count` picks among `candidates`.
    ///
    /// Only the first `max_candidates` candidates (in the order given) are
    /// offered, and the returned indices always refer to that offered prefix.
    /// Transport errors and unparseable replies yield an empty set.
    #[instrument(level = "info", skip_all, fields(ticker = %request.ticker, count = request.count, offered = tracing::field::Empty))]
    pub async fn select(&self, candidates: &[Article], request: &SelectionRequest) -> BTreeSet<usize> {
        if request.count == 0 || candidates.is_empty() {
            return BTreeSet::new();
        }

        let offered = &candidates[..candidates.len().min(self.max_candidates)];
        tracing::Span::current().record("offered", offered.len());
        if offered.len() < candidates.len() {
            debug!(
                total = candidates.len(),
                offered = offered.len(),
                "Capping candidates offered to the oracle"
            );
        }

        let prompt = build_prompt(offered, request);
        let reply = match self.asker.ask(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                let e = OracleError::Transport(e.to_string());
                error!(error = %e, "Oracle call failed; treating as zero picks");
                return BTreeSet::new();
            }
        };

        match parse_reply(&reply, offered.len()) {
            OracleReply::Picks(picks) => {
                info!(picks = ?picks, "Oracle selection parsed");
                picks
            }
            OracleReply::Unparseable => {
                warn!(
                    error = %OracleError::Unparseable,
                    reply = %truncate_for_log(&reply, 300),
                    "Could not parse oracle reply; treating as zero picks"
                );
                BTreeSet::new()
            }
        }
    }
}

//! Coverage-guaranteed article selection.
//!
//! The selector reserves one slot for each required category (taking that
//! category's top-ranked eligible candidate) and lets the relevance oracle
//! fill whatever quota is left from the remaining candidates of every
//! category.

use crate::api::AskAsync;
use crate::models::{Article, CandidatePool, Category};
use crate::oracle::{RelevanceOracle, SelectionRequest};
use crate::reconcile::SelectionState;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Default number of leftover candidates handed to the oracle in step 2.
pub const SELECTOR_CANDIDATE_CAP: usize = 30;

#[derive(Debug, Clone)]
pub struct CoverageSelector {
    candidate_cap: usize,
}

impl Default for CoverageSelector {
    fn default() -> Self {
        Self::new(SELECTOR_CANDIDATE_CAP)
    }
}

impl CoverageSelector {
    pub fn new(candidate_cap: usize) -> Self {
        Self { candidate_cap }
    }

    /// Pick up to `top_n` articles from `pool`.
    ///
    /// Only candidates that `state` still considers eligible are used. The
    /// state is read, never written: the caller folds the returned picks in.
    #[instrument(level = "info", skip_all, fields(%ticker, top_n = top_n))]
    pub async fn select<A>(
        &self,
        pool: &CandidatePool,
        state: &SelectionState,
        oracle: &RelevanceOracle<A>,
        ticker: &str,
        top_n: usize,
    ) -> Vec<Article>
    where
        A: AskAsync<Response = String>,
    {
        let mut remaining = top_n;
        let mut chosen: Vec<Article> = Vec::with_capacity(top_n);
        let mut chosen_links: HashSet<String> = HashSet::new();

        // Step 1: one guaranteed slot per required category, in priority order.
        for category in Category::REQUIRED {
            if remaining == 0 {
                warn!(%category, "Quota exhausted before reserving a slot for category");
                continue;
            }
            match pool
                .candidates(category)
                .iter()
                .find(|a| state.is_eligible(a))
            {
                Some(first) => {
                    chosen_links.insert(first.link.clone());
                    chosen.push(first.pending());
                    remaining -= 1;
                }
                None => warn!(%category, "Coverage gap: no eligible candidate for category"),
            }
        }

        let guaranteed = chosen.len();

        // Step 2: the oracle fills what is left from everything else.
        if remaining > 0 {
            let leftovers: Vec<Article> = pool
                .iter()
                .filter(|a| !chosen_links.contains(&a.link) && state.is_eligible(a))
                .take(self.candidate_cap)
                .cloned()
                .collect();

            let request = SelectionRequest::new(ticker, remaining);
            let picks = oracle.select(&leftovers, &request).await;

            // Step 3: append picks, never more than the remaining quota.
            chosen.extend(
                picks
                    .into_iter()
                    .filter_map(|idx| leftovers.get(idx))
                    .take(remaining)
                    .map(Article::pending),
            );
        }

        info!(
            selected = chosen.len(),
            guaranteed,
            "Initial selection complete"
        );
        chosen
    }
}

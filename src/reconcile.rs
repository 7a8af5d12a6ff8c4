//! Reconciliation: repair coverage gaps left by failed fetches.
//!
//! After the initial selection has been fetched, some required categories
//! may still be uncovered and the quota may be unmet. The [`Reconciler`]
//! runs rounds of "ask the oracle for replacements, fetch them, fold the
//! results into [`SelectionState`]" until the quota is met or nothing
//! eligible is left.
//!
//! # Phases
//!
//! 1. **Gap rounds**: candidates come only from the still-missing required
//!    categories, and the prompt names those categories.
//! 2. **Fill rounds**: once the gaps cannot be closed, candidates come from
//!    every category. The number of fill rounds is configurable; zero
//!    disables them and keeps the result strictly gap-driven.
//!
//! Every fetched round marks at least one new link as considered and an
//! empty pick ends its phase, so the loop is bounded by the pool size.

use crate::api::AskAsync;
use crate::fetcher::{ContentFetcher, ContentSource, FetchReport};
use crate::models::{Article, CandidatePool, Category};
use crate::oracle::{RelevanceOracle, SelectionRequest};
use crate::selector::CoverageSelector;
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

/// Failures after which a domain is excluded for the rest of the run.
///
/// Counts are cumulative over the run: a success from the same domain does
/// not reset them.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Mutable state threaded through every round of one run.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    top_n: usize,
    selected: Vec<Article>,
    covered: BTreeSet<Category>,
    considered: HashSet<String>,
    domain_failures: HashMap<String, u32>,
    blacklist: BTreeSet<String>,
}

impl SelectionState {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            ..Self::default()
        }
    }

    pub fn selected(&self) -> &[Article] {
        &self.selected
    }

    pub fn covered(&self) -> &BTreeSet<Category> {
        &self.covered
    }

    pub fn blacklist(&self) -> &BTreeSet<String> {
        &self.blacklist
    }

    pub fn domain_failures(&self) -> &HashMap<String, u32> {
        &self.domain_failures
    }

    /// Slots still open under the quota.
    pub fn needed(&self) -> usize {
        self.top_n.saturating_sub(self.selected.len())
    }

    /// Required categories without a successfully fetched article, in priority order.
    pub fn missing(&self) -> Vec<Category> {
        Category::REQUIRED
            .into_iter()
            .filter(|c| !self.covered.contains(c))
            .collect()
    }

    pub fn is_blacklisted(&self, article: &Article) -> bool {
        article
            .domain()
            .is_some_and(|d| self.blacklist.contains(&d))
    }

    /// Not yet handed to the fetcher and not from a blacklisted domain.
    pub fn is_eligible(&self, article: &Article) -> bool {
        !self.considered.contains(&article.link) && !self.is_blacklisted(article)
    }

    pub fn mark_considered(&mut self, articles: &[Article]) {
        self.considered
            .extend(articles.iter().map(|a| a.link.clone()));
    }

    /// Fold one fetch batch into the state.
    ///
    /// Successes are accepted only while the quota has room. Domain failure
    /// counts accumulate across the run; a domain is blacklisted the moment
    /// its count reaches [`FAILURE_THRESHOLD`] and stays blacklisted.
    pub fn absorb(&mut self, report: FetchReport) {
        for article in report.succeeded {
            if self.selected.len() >= self.top_n {
                warn!(link = %article.link, "Quota already met; dropping extra article");
                continue;
            }
            self.considered.insert(article.link.clone());
            self.covered.insert(article.category);
            self.selected.push(article);
        }
        for article in &report.failed {
            self.considered.insert(article.link.clone());
        }
        for (domain, count) in report.domain_failures {
            let total = self.domain_failures.entry(domain.clone()).or_insert(0);
            *total += count;
            if *total >= FAILURE_THRESHOLD && self.blacklist.insert(domain.clone()) {
                info!(%domain, failures = *total, "Blacklisted domain after repeated failures");
            }
        }
    }

    /// Eligible candidates from `categories`, in pool order.
    pub fn eligible_in<'a>(
        &self,
        pool: &'a CandidatePool,
        categories: &[Category],
    ) -> Vec<&'a Article> {
        categories
            .iter()
            .flat_map(|c| pool.candidates(*c))
            .filter(|a| self.is_eligible(a))
            .collect()
    }
}

/// Knobs for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Rounds drawing from every category once gap rounds are done. Zero disables them.
    pub fill_rounds: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self { fill_rounds: 1 }
    }
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// At most `top_n` fetched articles, no repeated links.
    pub articles: Vec<Article>,
    pub covered: BTreeSet<Category>,
    pub missing: Vec<Category>,
    pub blacklist: BTreeSet<String>,
    /// Reconciliation rounds that fetched something (the initial pass is not counted).
    pub rounds: usize,
    pub stop: StopReason,
}

impl RunOutcome {
    /// Stopped short of the quota because nothing eligible was left.
    pub fn exhausted(&self) -> bool {
        self.stop == StopReason::CandidatesExhausted
    }
}

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuotaMet,
    /// No eligible candidate remained in any category.
    CandidatesExhausted,
    /// Candidates remained but the oracle picked none of them.
    NoPicks,
    /// Fill rounds ran out while eligible candidates remained.
    FillRoundsSpent,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Gaps,
    Fill,
}

/// Drives selection, fetching, and repair rounds for one ticker.
pub struct Reconciler<A, S> {
    selector: CoverageSelector,
    oracle: RelevanceOracle<A>,
    fetcher: ContentFetcher<S>,
    settings: ReconcileSettings,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<A, S> Reconciler<A, S>
where
    A: AskAsync<Response = String>,
    S: ContentSource,
{
    pub fn new(
        selector: CoverageSelector,
        oracle: RelevanceOracle<A>,
        fetcher: ContentFetcher<S>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            selector,
            oracle,
            fetcher,
            settings,
            shutdown: None,
        }
    }

    /// Stop between rounds once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Initial selection: the articles the first fetch pass will attempt.
    pub async fn initial_selection(
        &self,
        pool: &CandidatePool,
        state: &SelectionState,
        ticker: &str,
        top_n: usize,
    ) -> Vec<Article> {
        self.selector
            .select(pool, state, &self.oracle, ticker, top_n)
            .await
    }

    /// Run selection, the first fetch pass, and all repair rounds.
    #[instrument(level = "info", skip_all, fields(%ticker, top_n = top_n, pool = pool.len()))]
    pub async fn run(&mut self, pool: &CandidatePool, ticker: &str, top_n: usize) -> RunOutcome {
        let mut state = SelectionState::new(top_n);
        let initial = self.initial_selection(pool, &state, ticker, top_n).await;
        self.run_from(pool, ticker, &mut state, initial).await
    }

    /// Continue a run from an already computed initial selection.
    pub async fn run_from(
        &mut self,
        pool: &CandidatePool,
        ticker: &str,
        state: &mut SelectionState,
        initial: Vec<Article>,
    ) -> RunOutcome {
        let top_n = state.top_n;
        state.mark_considered(&initial);
        let report = self.fetcher.fetch(initial).await;
        state.absorb(report);
        info!(
            fetched = state.selected.len(),
            missing = %state.missing().iter().join(", "),
            "Initial fetch pass complete"
        );

        let mut phase = Phase::Gaps;
        let mut fill_rounds_left = self.settings.fill_rounds;
        let mut rounds = 0usize;

        let stop = loop {
            if state.needed() == 0 {
                break StopReason::QuotaMet;
            }
            if self.shutdown_requested() {
                warn!("Shutdown requested; no further rounds");
                break StopReason::Shutdown;
            }

            let missing = state.missing();
            if phase == Phase::Gaps && missing.is_empty() {
                phase = Phase::Fill;
            }
            if phase == Phase::Fill && fill_rounds_left == 0 {
                if state.eligible_in(pool, &Category::ALL).is_empty() {
                    break StopReason::CandidatesExhausted;
                }
                break StopReason::FillRoundsSpent;
            }

            let (candidates, focus): (Vec<Article>, Vec<Category>) = match phase {
                Phase::Gaps => (
                    state.eligible_in(pool, &missing).into_iter().cloned().collect(),
                    missing.clone(),
                ),
                Phase::Fill => (
                    state
                        .eligible_in(pool, &Category::ALL)
                        .into_iter()
                        .cloned()
                        .collect(),
                    Vec::new(),
                ),
            };

            if candidates.is_empty() {
                match phase {
                    Phase::Gaps => {
                        warn!(missing = %missing.iter().join(", "), "No replacements left for missing categories");
                        phase = Phase::Fill;
                        continue;
                    }
                    Phase::Fill => {
                        warn!("No eligible candidates left in any category");
                        break StopReason::CandidatesExhausted;
                    }
                }
            }

            let needed = state.needed();
            let request = SelectionRequest::new(ticker, needed).with_focus(focus);
            let picks: Vec<Article> = self
                .oracle
                .select(&candidates, &request)
                .await
                .into_iter()
                .filter_map(|idx| candidates.get(idx))
                .take(needed)
                .map(Article::pending)
                .collect();

            if picks.is_empty() {
                warn!(phase = ?phase, "Oracle picked no replacements");
                match phase {
                    Phase::Gaps => {
                        phase = Phase::Fill;
                        continue;
                    }
                    Phase::Fill => break StopReason::NoPicks,
                }
            }

            if phase == Phase::Fill {
                fill_rounds_left -= 1;
            }
            rounds += 1;
            info!(round = rounds, phase = ?phase, picks = picks.len(), needed, "Fetching replacements");
            state.mark_considered(&picks);
            let report = self.fetcher.fetch(picks).await;
            state.absorb(report);
        };

        state.selected.truncate(top_n);
        let articles = state.selected.clone();
        if let Some(journal) = self.fetcher.journal_mut() {
            journal.rewrite(&articles).await;
        }

        let outcome = RunOutcome {
            articles,
            covered: state.covered.clone(),
            missing: state.missing(),
            blacklist: state.blacklist.clone(),
            rounds,
            stop,
        };
        info!(
            selected = outcome.articles.len(),
            top_n,
            rounds = outcome.rounds,
            stop = ?outcome.stop,
            covered = %outcome.covered.iter().join(", "),
            blacklisted = outcome.blacklist.len(),
            "Reconciliation finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MAX_ORACLE_CANDIDATES;
    use crate::outputs::full_text::{FullTextJournal, parse_full_text};
    use crate::testing::{ScriptedAsker, ScriptedSource};
    use std::time::Duration;

    fn pool_with(layout: &[(Category, Vec<&str>)]) -> CandidatePool {
        let mut pool = CandidatePool::new();
        for (category, links) in layout {
            for link in links {
                pool.add(Article::new(format!("T {link}"), "s", *link, *category));
            }
        }
        pool
    }

    fn reconciler(
        asker: ScriptedAsker,
        source: ScriptedSource,
        fill_rounds: usize,
    ) -> Reconciler<ScriptedAsker, ScriptedSource> {
        Reconciler::new(
            CoverageSelector::default(),
            RelevanceOracle::new(asker, MAX_ORACLE_CANDIDATES),
            ContentFetcher::new(source, 3, Duration::ZERO),
            ReconcileSettings { fill_rounds },
        )
    }

    fn assert_unique_links(articles: &[Article]) {
        let unique: HashSet<_> = articles.iter().map(|a| &a.link).collect();
        assert_eq!(unique.len(), articles.len(), "duplicate link in selection");
    }

    #[test]
    fn test_blacklist_entered_once_at_threshold() {
        let mut state = SelectionState::new(3);
        for _ in 0..2 {
            state.absorb(FetchReport {
                domain_failures: HashMap::from([("bad.com".to_string(), 1)]),
                ..FetchReport::default()
            });
        }
        assert!(state.blacklist().is_empty());
        state.absorb(FetchReport {
            domain_failures: HashMap::from([("bad.com".to_string(), 2)]),
            ..FetchReport::default()
        });
        assert!(state.blacklist().contains("bad.com"));
        assert_eq!(state.domain_failures()["bad.com"], 4);
        let a = Article::new("t", "s", "https://bad.com/x", Category::Other);
        assert!(!state.is_eligible(&a));
    }

    #[test]
    fn test_success_does_not_reset_failure_count() {
        let mut state = SelectionState::new(5);
        let failure = || FetchReport {
            domain_failures: HashMap::from([("mixed.com".to_string(), 1)]),
            ..FetchReport::default()
        };
        state.absorb(failure());
        state.absorb(failure());
        state.absorb(FetchReport {
            succeeded: vec![Article::new("t", "s", "https://mixed.com/ok", Category::Other).succeeded("x".into())],
            ..FetchReport::default()
        });
        assert_eq!(state.domain_failures()["mixed.com"], 2);
        assert!(state.blacklist().is_empty());
        state.absorb(failure());
        assert!(state.blacklist().contains("mixed.com"));
        assert_eq!(state.selected().len(), 1);
    }

    #[test]
    fn test_absorb_respects_quota() {
        let mut state = SelectionState::new(1);
        let ok = |l: &str| Article::new("t", "s", l, Category::Other).succeeded("x".into());
        state.absorb(FetchReport {
            succeeded: vec![ok("https://a.com/1"), ok("https://a.com/2")],
            ..FetchReport::default()
        });
        assert_eq!(state.selected().len(), 1);
        assert_eq!(state.needed(), 0);
        assert_eq!(state.covered(), &BTreeSet::from([Category::Other]));
    }

    #[tokio::test]
    async fn test_silent_oracle_yields_one_per_required_category() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1", "https://s.com/2"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1", "https://g.com/2"]),
            (Category::SectorContext, vec!["https://x.com/1", "https://x.com/2"]),
        ]);
        let mut r = reconciler(ScriptedAsker::always("Selected articles:"), ScriptedSource::new(), 1);
        let outcome = r.run(&pool, "AAPL", 4).await;

        assert_eq!(outcome.articles.len(), 3);
        let categories: BTreeSet<_> = outcome.articles.iter().map(|a| a.category).collect();
        assert_eq!(categories, BTreeSet::from(Category::REQUIRED));
        assert!(outcome.articles.iter().all(|a| a.category != Category::Other));
        assert!(outcome.missing.is_empty());
    }

    #[tokio::test]
    async fn test_all_domains_failing_completes_empty() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://a.com/1", "https://a.com/2"]),
            (Category::GeopoliticsContext, vec!["https://b.com/1", "https://b.com/2"]),
            (Category::SectorContext, vec!["https://c.com/1"]),
            (Category::Other, vec!["https://a.com/3", "https://b.com/3"]),
        ]);
        let source = ScriptedSource::new()
            .failing_domain("a.com")
            .failing_domain("b.com")
            .failing_domain("c.com");
        let asker = ScriptedAsker::always("Selected articles: 1, 2, 3, 4, 5");
        let mut r = reconciler(asker, source, 3);
        let outcome = r.run(&pool, "AAPL", 3).await;

        assert!(outcome.articles.is_empty());
        assert!(outcome.exhausted());
        assert_eq!(outcome.missing, Category::REQUIRED.to_vec());
    }

    #[tokio::test]
    async fn test_failed_category_is_replaced_from_same_category() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1"]),
            (Category::GeopoliticsContext, vec!["https://down.com/1", "https://g.com/2"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
            (Category::Other, vec!["https://o.com/1"]),
        ]);
        let source = ScriptedSource::new().failing_domain("down.com");
        // Initial fill asks for 0 extra (top_n = 3); the gap round offers only g2.
        let asker = ScriptedAsker::always("Selected articles: 1");
        let mut r = reconciler(asker.clone(), source, 0);
        let outcome = r.run(&pool, "AAPL", 3).await;

        let links: Vec<_> = outcome.articles.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["https://s.com/1", "https://x.com/1", "https://g.com/2"]);
        assert!(outcome.missing.is_empty());
        assert_eq!(outcome.rounds, 1);
        assert!(asker.prompts()[0].contains("missing contexts: GEOPOLITICS_CONTEXT"));
    }

    #[tokio::test]
    async fn test_blacklisted_domain_never_offered_again() {
        // Three failing links on flaky.com blacklist it during the initial pass.
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://flaky.com/1", "https://flaky.com/4", "https://s.com/2"]),
            (Category::GeopoliticsContext, vec!["https://flaky.com/2"]),
            (Category::SectorContext, vec!["https://flaky.com/3", "https://x.com/2"]),
            (Category::Other, vec!["https://flaky.com/5"]),
        ]);
        let source = ScriptedSource::new().failing_domain("flaky.com");
        let asker = ScriptedAsker::always("Selected articles: 1, 2, 3, 4");
        let mut r = reconciler(asker.clone(), source, 2);
        let outcome = r.run(&pool, "AAPL", 3).await;

        assert!(outcome.blacklist.contains("flaky.com"));
        // First prompt is the gap round; the initial pass needed no oracle call.
        for prompt in asker.prompts() {
            assert!(!prompt.contains("flaky.com"), "blacklisted domain offered: {prompt}");
        }
        assert!(outcome.articles.iter().all(|a| !a.link.contains("flaky.com")));
        assert_unique_links(&outcome.articles);
    }

    #[tokio::test]
    async fn test_terminates_when_oracle_never_answers() {
        let links: Vec<String> = (0..20).map(|i| format!("https://d{i}.com/a")).collect();
        let mut pool = CandidatePool::new();
        for l in &links {
            pool.add(Article::new("t", "s", l.as_str(), Category::Other));
        }
        let asker = ScriptedAsker::failing();
        let mut r = reconciler(asker.clone(), ScriptedSource::new(), usize::MAX);
        let outcome = r.run(&pool, "AAPL", 5).await;

        assert!(outcome.articles.is_empty());
        assert_eq!(outcome.stop, StopReason::NoPicks);
        assert!(!outcome.exhausted());
        assert!(asker.calls() <= pool.len() + 1);
    }

    #[tokio::test]
    async fn test_fill_rounds_zero_keeps_gap_only() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
            (Category::Other, vec!["https://o.com/1", "https://o.com/2"]),
        ]);
        // The initial pass asks for 2 extras and gets none.
        let asker = ScriptedAsker::new(vec![Ok("Selected articles:".into())]);
        let mut r = reconciler(asker.clone(), ScriptedSource::new(), 0);
        let outcome = r.run(&pool, "AAPL", 5).await;
        assert_eq!(outcome.articles.len(), 3);
        assert_eq!(asker.calls(), 1);
        assert_eq!(outcome.stop, StopReason::FillRoundsSpent);
    }

    #[tokio::test]
    async fn test_fill_round_tops_up_from_any_category() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
            (Category::Other, vec!["https://o.com/1", "https://o.com/2"]),
        ]);
        let asker = ScriptedAsker::new(vec![
            Ok("Selected articles:".into()),
            Ok("Selected articles: 2".into()),
        ]);
        let mut r = reconciler(asker.clone(), ScriptedSource::new(), 1);
        let outcome = r.run(&pool, "AAPL", 5).await;

        assert_eq!(outcome.articles.len(), 4);
        assert_eq!(outcome.articles[3].link, "https://o.com/2");
        assert_eq!(outcome.rounds, 1);
        // o.com/1 is still eligible, so the quota was missed for lack of rounds
        assert_eq!(outcome.stop, StopReason::FillRoundsSpent);
        assert!(!outcome.exhausted());
    }

    #[tokio::test]
    async fn test_spent_fill_rounds_with_empty_pool_is_exhaustion() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
        ]);
        let mut r = reconciler(ScriptedAsker::always("Selected articles:"), ScriptedSource::new(), 0);
        let outcome = r.run(&pool, "AAPL", 5).await;
        assert_eq!(outcome.articles.len(), 3);
        assert!(outcome.exhausted());
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_rounds() {
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://down.com/1", "https://s.com/2"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
        ]);
        let flag = Arc::new(AtomicBool::new(true));
        let asker = ScriptedAsker::always("Selected articles: 1");
        let mut r = reconciler(asker.clone(), ScriptedSource::new().failing_domain("down.com"), 1)
            .with_shutdown(flag);
        let outcome = r.run(&pool, "AAPL", 3).await;
        assert_eq!(outcome.articles.len(), 2);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.stop, StopReason::Shutdown);
        assert_eq!(asker.calls(), 0);
    }

    #[tokio::test]
    async fn test_final_artifact_matches_final_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full_articles.txt");
        let pool = pool_with(&[
            (Category::StockContext, vec!["https://s.com/1"]),
            (Category::GeopoliticsContext, vec!["https://g.com/1"]),
            (Category::SectorContext, vec!["https://x.com/1"]),
        ]);
        let fetcher = ContentFetcher::new(ScriptedSource::new(), 1, Duration::ZERO)
            .with_journal(FullTextJournal::new(&path));
        let mut r = Reconciler::new(
            CoverageSelector::default(),
            RelevanceOracle::new(ScriptedAsker::always("Selected articles:"), 10),
            fetcher,
            ReconcileSettings::default(),
        );
        let outcome = r.run(&pool, "AAPL", 2).await;

        let parsed = parse_full_text(&std::fs::read_to_string(&path).unwrap());
        let on_disk: Vec<_> = parsed.iter().map(|a| a.link.clone()).collect();
        let selected: Vec<_> = outcome.articles.iter().map(|a| a.link.clone()).collect();
        assert_eq!(on_disk, selected);
        assert_eq!(selected.len(), 2);
        assert_eq!(outcome.stop, StopReason::QuotaMet);
    }
}

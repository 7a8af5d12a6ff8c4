//! Candidate pool construction from raw search payloads.
//!
//! Search results arrive as one JSON payload per query, each carrying an
//! `organic` list of `{title, snippet, link}` records. Every query maps to a
//! [`Category`]; this module validates each payload as a unit and flattens the
//! valid ones into a deduplicated [`CandidatePool`].
//!
//! A source that is missing or invalid only degrades coverage for its
//! category. It never aborts the pipeline.

use crate::error::ValidationError;
use crate::models::{Article, CandidatePool, Category};
use serde_json::Value;
use tracing::{debug, info, warn};

/// One validated search record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSearchResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// Validate a search payload as a whole.
///
/// Every record in `organic` must carry a string `title` and `snippet`; a
/// single malformed record rejects the entire source rather than being
/// dropped silently. A missing `link` is tolerated here and filtered out when
/// the pool is built.
pub fn validate_search_payload(payload: &Value) -> Result<Vec<RawSearchResult>, ValidationError> {
    let organic = payload
        .get("organic")
        .ok_or(ValidationError::MissingKey("organic"))?
        .as_array()
        .ok_or(ValidationError::NotAnArray("organic"))?;

    organic
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let field = |key: &str| record.get(key).and_then(Value::as_str).map(str::to_string);
            match (field("title"), field("snippet")) {
                (Some(title), Some(snippet)) => Ok(RawSearchResult {
                    title,
                    snippet,
                    link: field("link").unwrap_or_default(),
                }),
                _ => Err(ValidationError::MalformedRecord { index }),
            }
        })
        .collect()
}

/// Build the candidate pool from `(category, payload)` pairs.
///
/// Pairs are consumed in order, so several theme queries mapped to
/// [`Category::Other`] append to the same list. `None` marks a source whose
/// fetch failed upstream.
pub fn build_pool<I>(sources: I) -> CandidatePool
where
    I: IntoIterator<Item = (Category, Option<Value>)>,
{
    let mut pool = CandidatePool::new();

    for (category, payload) in sources {
        let Some(payload) = payload else {
            warn!(%category, "No search data for category; it contributes no candidates");
            continue;
        };

        let records = match validate_search_payload(&payload) {
            Ok(records) => records,
            Err(e) => {
                warn!(%category, error = %e, "Search data failed validation; skipping source");
                continue;
            }
        };

        let offered = records.len();
        let mut added = 0usize;
        for r in records {
            if pool.add(Article::new(r.title, r.snippet, r.link, category)) {
                added += 1;
            }
        }
        debug!(%category, offered, added, "Merged search source into pool");
    }

    for category in Category::REQUIRED {
        if pool.candidates(category).is_empty() {
            warn!(%category, "Required category has no candidates");
        }
    }
    info!(total = pool.len(), "Candidate pool built");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(links: &[&str]) -> Value {
        let organic: Vec<Value> = links
            .iter()
            .map(|l| json!({"title": format!("T {l}"), "snippet": "s", "link": l}))
            .collect();
        json!({ "organic": organic })
    }

    #[test]
    fn test_validate_rejects_whole_source_on_one_bad_record() {
        let p = json!({"organic": [
            {"title": "ok", "snippet": "ok", "link": "https://a.com/1"},
            {"title": "missing snippet", "link": "https://a.com/2"}
        ]});
        assert_eq!(
            validate_search_payload(&p),
            Err(ValidationError::MalformedRecord { index: 1 })
        );
    }

    #[test]
    fn test_validate_missing_or_wrong_organic() {
        assert_eq!(
            validate_search_payload(&json!({"knowledgeGraph": {}})),
            Err(ValidationError::MissingKey("organic"))
        );
        assert_eq!(
            validate_search_payload(&json!({"organic": "nope"})),
            Err(ValidationError::NotAnArray("organic"))
        );
    }

    #[test]
    fn test_validate_tolerates_missing_link() {
        let p = json!({"organic": [{"title": "t", "snippet": "s"}]});
        let out = validate_search_payload(&p).unwrap();
        assert_eq!(out[0].link, "");
    }

    #[test]
    fn test_build_pool_degrades_instead_of_failing() {
        let pool = build_pool(vec![
            (Category::StockContext, Some(payload(&["https://a.com/1", "https://b.com/2"]))),
            (Category::GeopoliticsContext, None),
            (Category::SectorContext, Some(json!({"organic": [{"title": "x"}]}))),
        ]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.candidates(Category::StockContext).len(), 2);
        assert!(pool.candidates(Category::GeopoliticsContext).is_empty());
        assert!(pool.candidates(Category::SectorContext).is_empty());
    }

    #[test]
    fn test_build_pool_dedups_across_categories_and_merges_themes() {
        let pool = build_pool(vec![
            (Category::StockContext, Some(payload(&["https://a.com/1"]))),
            (Category::Other, Some(payload(&["https://a.com/1", "https://c.com/3"]))),
            (Category::Other, Some(payload(&["https://d.com/4", ""]))),
        ]);
        assert_eq!(pool.len(), 3);
        let other: Vec<_> = pool
            .candidates(Category::Other)
            .iter()
            .map(|a| a.link.as_str())
            .collect();
        assert_eq!(other, vec!["https://c.com/3", "https://d.com/4"]);
        assert_eq!(pool.candidates(Category::StockContext)[0].category, Category::StockContext);
    }
}

//! The combined full-text artifact.
//!
//! Each fetched article is rendered as one block:
//!
//! ```text
//! Title: <title>
//! Link: <link>
//! Category: <CATEGORY>
//! Text:
//! <full content, may span many lines and blank lines>
//! ```
//!
//! Blocks are separated by a blank line. A block starts at a `Title:` line
//! that is immediately followed by `Link:`, `Category:` and `Text:` lines, so
//! [`parse_full_text`] can read the file back even when article bodies
//! contain blank lines of their own.

use crate::models::{Article, Category};
use crate::utils::write_atomic;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Render articles into the block format. Articles without content render an empty text section.
pub fn render_full_text(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| {
            format!(
                "Title: {}\nLink: {}\nCategory: {}\nText:\n{}",
                a.title,
                a.link,
                a.category,
                a.full_content.as_deref().unwrap_or_default().trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse the block format back into fetched articles.
///
/// Snippets are not part of the format and come back empty.
pub fn parse_full_text(text: &str) -> Vec<Article> {
    let lines: Vec<&str> = text.lines().collect();
    let header_at = |i: usize| -> Option<(String, String, Category)> {
        let title = lines.get(i)?.strip_prefix("Title: ")?;
        let link = lines.get(i + 1)?.strip_prefix("Link: ")?;
        let category = lines.get(i + 2)?.strip_prefix("Category: ")?.parse().ok()?;
        (lines.get(i + 3)?.trim_end() == "Text:").then_some(())?;
        Some((title.to_string(), link.to_string(), category))
    };

    let mut articles = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some((title, link, category)) = header_at(i) else {
            i += 1;
            continue;
        };
        let body_start = i + 4;
        let mut end = body_start;
        while end < lines.len() && header_at(end).is_none() {
            end += 1;
        }
        let body = lines[body_start..end].join("\n").trim_end().to_string();
        articles.push(Article::new(title, "", link, category).succeeded(body));
        i = end;
    }
    articles
}

/// Running full-text artifact, rewritten whole on every update.
#[derive(Debug, Clone)]
pub struct FullTextJournal {
    path: PathBuf,
    entries: Vec<Article>,
}

impl FullTextJournal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[Article] {
        &self.entries
    }

    /// Append newly fetched articles and rewrite the file.
    pub async fn record(&mut self, fetched: &[Article]) {
        if fetched.is_empty() {
            return;
        }
        self.entries.extend_from_slice(fetched);
        self.flush().await;
    }

    /// Replace the contents with exactly `articles` and rewrite the file.
    pub async fn rewrite(&mut self, articles: &[Article]) {
        self.entries = articles.to_vec();
        if self.entries.is_empty() {
            warn!(path = %self.path.display(), "No articles were fetched; full-text artifact is empty");
        }
        self.flush().await;
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), articles = self.entries.len()))]
    async fn flush(&self) {
        let text = render_full_text(&self.entries);
        match write_atomic(&self.path, text.as_bytes()).await {
            Ok(()) => info!("Full-text artifact written"),
            Err(e) => warn!(error = %e, "Failed to write full-text artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(title: &str, link: &str, category: Category, body: &str) -> Article {
        Article::new(title, "snippet", link, category).succeeded(body.to_string())
    }

    #[test]
    fn test_render_block_grammar() {
        let text = render_full_text(&[
            fetched("A", "https://a.com", Category::StockContext, "alpha\n"),
            fetched("B", "https://b.com", Category::Other, "beta"),
        ]);
        assert_eq!(
            text,
            "Title: A\nLink: https://a.com\nCategory: STOCK_CONTEXT\nText:\nalpha\n\n\
             Title: B\nLink: https://b.com\nCategory: OTHER\nText:\nbeta"
        );
    }

    #[test]
    fn test_parse_reads_back_multi_paragraph_bodies() {
        let articles = vec![
            fetched("A", "https://a.com", Category::SectorContext, "para one\n\npara two"),
            fetched("B", "https://b.com", Category::GeopoliticsContext, "Title: not a header\nbody"),
        ];
        let parsed = parse_full_text(&render_full_text(&articles));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].full_content.as_deref(), Some("para one\n\npara two"));
        assert_eq!(parsed[1].category, Category::GeopoliticsContext);
        assert_eq!(
            parsed[1].full_content.as_deref(),
            Some("Title: not a header\nbody")
        );
        assert_eq!(parsed[1].link, "https://b.com");
    }

    #[test]
    fn test_parse_accepts_legacy_category_spelling() {
        let text = "Title: X\nLink: https://x.com\nCategory: STOCK CONTEXT\nText:\nbody";
        let parsed = parse_full_text(text);
        assert_eq!(parsed[0].category, Category::StockContext);
    }

    #[tokio::test]
    async fn test_rewrite_drops_earlier_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full_articles.txt");
        let mut journal = FullTextJournal::new(&path);
        let a = fetched("A", "https://a.com", Category::StockContext, "a");
        let b = fetched("B", "https://b.com", Category::Other, "b");
        journal.record(&[a.clone(), b]).await;
        journal.rewrite(&[a]).await;

        assert_eq!(journal.path(), path.as_path());
        let parsed = parse_full_text(&std::fs::read_to_string(journal.path()).unwrap());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].link, "https://a.com");
        assert_eq!(journal.entries().len(), 1);
    }
}

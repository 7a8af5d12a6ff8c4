//! The final report: prompt assembly, generation, and rendering.

use crate::api::{AskAsync, ask_with_backoff};
use crate::models::{Article, StockData};
use crate::utils::write_atomic;
use chrono::Local;
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Characters of each article body included in the prompt.
pub const ARTICLE_EXCERPT_CHARS: usize = 1000;

/// One-line summary of the quote snapshot.
pub fn stock_summary(ticker: &str, stock: &StockData) -> String {
    let info = &stock.info;
    let price = info
        .current_price
        .map_or_else(|| "N/A".to_string(), |p| format!("{p:.2}"));
    let mut summary = format!(
        "{ticker} ({}) is currently trading at {price}.",
        info.long_name.as_deref().unwrap_or_default()
    );
    if let (Some(prev), Some(cur)) = (info.previous_close, info.current_price) {
        if prev != 0.0 {
            let _ = write!(summary, " Change vs previous close: {:+.2}%.", (cur - prev) / prev * 100.0);
        }
    }
    if let (Some(lo), Some(hi)) = (info.fifty_two_week_low, info.fifty_two_week_high) {
        let _ = write!(summary, " 52-week range: {lo:.2} to {hi:.2}.");
    }
    if let [first, .., last] = stock.history.as_slice() {
        if let (Some(start), Some(end)) = (first.close, last.close) {
            let _ = write!(
                summary,
                " Closed at {end:.2} on {} versus {start:.2} on {}.",
                last.date, first.date
            );
        }
    }
    summary
}

/// Build the report prompt from the stock snapshot and the fetched articles.
pub fn build_report_prompt(ticker: &str, stock: &StockData, articles: &[Article]) -> String {
    let mut articles_text = String::new();
    for (idx, article) in articles.iter().enumerate() {
        let excerpt: String = article
            .full_content
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(ARTICLE_EXCERPT_CHARS)
            .collect();
        let _ = write!(
            articles_text,
            "Article {} Title: {}\nContent:\n{}\n\n",
            idx + 1,
            article.title,
            excerpt
        );
    }

    format!(
        "Generate a detailed and insightful report on {ticker} using the following information:\n\n\
         Stock Summary:\n{summary}\n\n\
         News Articles:\n{articles_text}\
         The report should include:\n\
         - An analysis of the stock's recent performance.\n\
         - The impact of the news articles on the stock's outlook.\n\
         - Relevant geopolitical or sector-specific factors.\n\
         - A conclusion with potential future implications.\n\n\
         Structure the report with clear headings and bullet points where appropriate.",
        summary = stock_summary(ticker, stock),
    )
}

/// Markdown rendering: title, date line, the report body, then the sources.
pub fn render_markdown(ticker: &str, report: &str, articles: &[Article]) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {ticker} Stock Report\n");
    let _ = writeln!(md, "_Generated {}_\n", Local::now().format("%Y-%m-%d"));
    let _ = writeln!(md, "{}\n", report.trim());
    if !articles.is_empty() {
        let _ = writeln!(md, "## Sources\n");
        for article in articles {
            let _ = writeln!(md, "- [{}]({}) ({})", article.title, article.link, article.category);
        }
    }
    md
}

/// Paths the report was written to.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub text: PathBuf,
    pub markdown: PathBuf,
}

/// Generate the report and write `<TICKER>_final_report.txt` and `.md` under `output_dir`.
#[instrument(level = "info", skip_all, fields(%ticker, articles = articles.len()))]
pub async fn generate_report<A>(
    client: &A,
    ticker: &str,
    stock: &StockData,
    articles: &[Article],
    output_dir: &Path,
) -> Result<ReportFiles, Box<dyn Error>>
where
    A: AskAsync<Response = String>,
{
    let prompt = build_report_prompt(ticker, stock, articles);
    let report = ask_with_backoff(client, &prompt).await?;
    let report = report.trim();
    if report.is_empty() {
        return Err("report generation returned an empty response".into());
    }

    let files = ReportFiles {
        text: output_dir.join(format!("{ticker}_final_report.txt")),
        markdown: output_dir.join(format!("{ticker}_final_report.md")),
    };
    write_atomic(&files.text, report.as_bytes()).await?;
    write_atomic(&files.markdown, render_markdown(ticker, report, articles).as_bytes()).await?;
    info!(text = %files.text.display(), markdown = %files.markdown.display(), "Report written");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, DailyBar, StockInfo};
    use crate::testing::ScriptedAsker;

    fn stock() -> StockData {
        StockData {
            info: StockInfo {
                symbol: "AAPL".into(),
                long_name: Some("Apple Inc.".into()),
                current_price: Some(200.0),
                previous_close: Some(160.0),
                ..StockInfo::default()
            },
            history: vec![DailyBar {
                date: "2025-01-02".into(),
                open: None,
                high: None,
                low: None,
                close: Some(190.0),
                volume: None,
            }],
        }
    }

    #[test]
    fn test_summary_reports_price_and_change() {
        let s = stock_summary("AAPL", &stock());
        assert!(s.starts_with("AAPL (Apple Inc.) is currently trading at 200.00."));
        assert!(s.contains("+25.00%"));
    }

    #[test]
    fn test_summary_without_price() {
        let s = stock_summary("X", &StockData::default());
        assert_eq!(s, "X () is currently trading at N/A.");
    }

    #[test]
    fn test_prompt_truncates_article_bodies() {
        let long = "é".repeat(ARTICLE_EXCERPT_CHARS + 50);
        let a = Article::new("Big", "s", "https://a.com", Category::StockContext).succeeded(long);
        let prompt = build_report_prompt("AAPL", &stock(), &[a]);
        assert!(prompt.contains("Article 1 Title: Big\nContent:\n"));
        assert_eq!(prompt.matches('é').count(), ARTICLE_EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_generate_writes_text_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let a = Article::new("Chip demand", "s", "https://a.com/x", Category::SectorContext)
            .succeeded("body".into());
        let client = ScriptedAsker::always("  ## Outlook\nPositive.\n");
        let files = generate_report(&client, "AAPL", &stock(), &[a], dir.path())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&files.text).unwrap(), "## Outlook\nPositive.");
        let md = std::fs::read_to_string(&files.markdown).unwrap();
        assert!(md.starts_with("# AAPL Stock Report"));
        assert!(md.contains("- [Chip demand](https://a.com/x) (SECTOR_CONTEXT)"));
        assert!(files.text.ends_with("AAPL_final_report.txt"));
    }

    #[tokio::test]
    async fn test_generate_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let res = generate_report(&ScriptedAsker::failing(), "AAPL", &stock(), &[], dir.path()).await;
        assert!(res.is_err());
        assert!(!dir.path().join("AAPL_final_report.txt").exists());
    }
}

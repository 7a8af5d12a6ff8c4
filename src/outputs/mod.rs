//! Artifacts written by a run.
//!
//! # Submodules
//!
//! - [`json`]: Combined search/stock data and the article lists as JSON
//! - [`full_text`]: The human-readable full-text artifact and its reader
//! - [`report`]: The generated report, as plain text and Markdown
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── AAPL_stock_data.json
//! ├── serper_*.json           # raw search payloads
//! ├── combined_data.json
//! ├── relevant_articles.json  # initial selection
//! ├── full_articles.txt       # final selection, full text
//! └── selected_articles.json  # final selection, JSON
//!
//! output_dir/
//! ├── AAPL_final_report.txt
//! └── AAPL_final_report.md
//! ```

pub mod full_text;
pub mod json;
pub mod report;

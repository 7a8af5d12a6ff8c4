//! External data sources feeding the pipeline.
//!
//! - [`serper`]: Web search results, one payload per query, mapped to categories
//! - [`stock`]: Quote snapshot and daily history for the ticker

pub mod serper;
pub mod stock;

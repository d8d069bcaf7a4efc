//! Storage layer: content-hash result cache, document loading, JSON reports.

mod cache;
mod document;
mod error;
mod report;

pub use cache::{FileCache, content_key};
pub use document::{load_blocks, parse_text};
pub use error::StoreError;
pub use report::{ERRORS_KEY, FileOutcome, Report};

//! Service layer for the catalog builder.
//!
//! - Row extraction from listing pages (`CssSelectors`)
//! - Row normalization and region classification (`EntryNormalizer`)
//! - Per-source scraping (`SourceScraper`)
//! - File downloads (`Downloader`)

pub mod download;
pub mod normalize;
pub mod scrape;
pub mod selectors;

pub use download::{DownloadProgress, DownloadSummary, Downloader};
pub use normalize::{EntryNormalizer, MalformedReason, RowOutcome, classify_region, reclassify};
pub use scrape::{ScrapeOutcome, ScrapeStats, SourceScraper};
pub use selectors::{CssSelectors, RowExtractor};

//! Pipeline entry points for catalog operations.
//!
//! - `CatalogStore`: plan, scrape and persist refresh cycles
//! - `BrowseIndex`: query the refreshed catalog
//! - `SnapshotDiff`: what a refresh changed per source

pub mod diff;
pub mod index;
pub mod refresh;

pub use diff::SnapshotDiff;
pub use index::{BrowseIndex, SortKey, SourceStatus};
pub use refresh::{
    CatalogStore, ReclassifiedSource, RefreshOptions, RefreshReport, ScrapeReason, ScrapedSource,
    SourcePlan, plan,
};

// src/models/mod.rs

//! Domain models for the catalog builder.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod catalog;
mod config;
mod entry;
mod source;

// Re-export all public types
pub use catalog::{CATALOG_VERSION, Catalog, SourceSnapshot};
pub use config::{Config, CrawlerConfig, PathsConfig};
pub use entry::{CatalogEntry, RawRow, UNCLASSIFIED, content_key};
pub use source::{FieldSelectors, IgnoreRule, RegionRule, SourceConfig};

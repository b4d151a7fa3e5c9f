// src/lib.rs

//! romscout: catalog builder and browser for HTML file listings.
//!
//! Sources are scraped with configured CSS selectors, normalized into
//! region-classified entries, cached as a single JSON catalog, and browsed
//! or downloaded from the command line.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

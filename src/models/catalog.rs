// src/models/catalog.rs

//! The persisted catalog: one snapshot per source.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeFailure;
use crate::models::{CatalogEntry, SourceConfig};

/// Cache format version written to disk.
pub const CATALOG_VERSION: u32 = 1;

/// Complete entry set of one source at one point in time.
///
/// Snapshots are replaced wholesale; entries are never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub source_id: String,

    /// [`SourceConfig::scrape_fingerprint`] at scrape time
    pub fingerprint: String,

    /// [`SourceConfig::region_fingerprint`] used to classify `entries`
    pub region_fingerprint: String,

    /// When the listing was fetched
    pub scraped_at: DateTime<Utc>,

    /// Declared region order used for classification
    #[serde(default)]
    pub regions: Vec<String>,

    /// Entries in listing order
    pub entries: Vec<CatalogEntry>,
}

impl SourceSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether raw extraction for `source` would still produce these entries.
    pub fn matches_scrape(&self, source: &SourceConfig) -> bool {
        self.fingerprint == source.scrape_fingerprint()
    }

    /// Whether the entries were classified with `source`'s region table.
    pub fn matches_regions(&self, source: &SourceConfig) -> bool {
        self.region_fingerprint == source.region_fingerprint()
    }

    /// Total of all known sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size_bytes).sum()
    }
}

/// All sources' snapshots plus the last refresh failure per source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,

    #[serde(default)]
    pub snapshots: BTreeMap<String, SourceSnapshot>,

    /// Sources whose last refresh failed; their snapshot (if any) is stale
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, ScrapeFailure>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            snapshots: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceSnapshot> {
        self.snapshots.get(source_id)
    }

    /// Replace a source's snapshot, returning the previous one.
    pub fn replace(&mut self, snapshot: SourceSnapshot) -> Option<SourceSnapshot> {
        self.snapshots.insert(snapshot.source_id.clone(), snapshot)
    }

    pub fn failure(&self, source_id: &str) -> Option<&ScrapeFailure> {
        self.failures.get(source_id)
    }

    pub fn record_failure(&mut self, failure: ScrapeFailure) {
        self.failures.insert(failure.source_id.clone(), failure);
    }

    /// Returns `true` if a failure was recorded.
    pub fn clear_failure(&mut self, source_id: &str) -> bool {
        self.failures.remove(source_id).is_some()
    }

    /// Drop snapshots and failures for sources not in `ids`.
    /// Returns the removed source ids.
    pub fn retain_sources<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let keep: std::collections::HashSet<&str> = ids.into_iter().collect();
        let removed: Vec<String> = self
            .snapshots
            .keys()
            .filter(|id| !keep.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &removed {
            self.snapshots.remove(id);
        }
        self.failures.retain(|id, _| keep.contains(id.as_str()));
        removed
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.snapshots.keys().map(String::as_str)
    }

    pub fn total_entries(&self) -> usize {
        self.snapshots.values().map(SourceSnapshot::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

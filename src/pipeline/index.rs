//! Browse index: read-only queries over the catalog.
//!
//! Nothing here touches the network or the cache file; every query is
//! answered from the in-memory [`Catalog`].

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::{AppError, ScrapeFailure};
use crate::models::{Catalog, CatalogEntry, SourceSnapshot, UNCLASSIFIED};

/// Display order for [`BrowseIndex::sorted`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Listing order
    #[default]
    Scrape,
    /// Name, ignoring case
    Name,
    /// Known sizes ascending, unknown sizes last
    Size,
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scrape" => Ok(SortKey::Scrape),
            "name" => Ok(SortKey::Name),
            "size" => Ok(SortKey::Size),
            other => Err(AppError::validation(format!("unknown sort key '{other}'"))),
        }
    }
}

/// Freshness of one source in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus<'a> {
    Fresh,
    /// Snapshot present but the last refresh failed
    Stale(&'a ScrapeFailure),
    /// No snapshot; carries the last failure if there was one
    Missing(Option<&'a ScrapeFailure>),
}

impl SourceStatus<'_> {
    /// Warning shown next to cached entries whose last refresh failed.
    pub fn staleness_note(&self) -> Option<String> {
        let SourceStatus::Stale(failure) = self else {
            return None;
        };
        Some(format!(
            "showing cached entries; last refresh failed at {} ({}): {}",
            failure.at.format("%Y-%m-%d %H:%M UTC"),
            failure.kind,
            failure.message
        ))
    }
}

/// Read-only view over a catalog.
#[derive(Debug, Clone, Copy)]
pub struct BrowseIndex<'a> {
    catalog: &'a Catalog,
}

impl<'a> BrowseIndex<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn source_ids(&self) -> Vec<&'a str> {
        self.catalog.source_ids().collect()
    }

    pub fn snapshot(&self, source_id: &str) -> Option<&'a SourceSnapshot> {
        self.catalog.get(source_id)
    }

    /// Entries of a source in listing order. `region` must match exactly;
    /// `search` is a case-insensitive substring of the name. Both filters
    /// apply together; `None` or an empty search disables a filter.
    pub fn list(
        &self,
        source_id: &str,
        region: Option<&str>,
        search: Option<&str>,
    ) -> Vec<&'a CatalogEntry> {
        let Some(snapshot) = self.catalog.get(source_id) else {
            return Vec::new();
        };
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        snapshot
            .entries
            .iter()
            .filter(|entry| region.is_none_or(|r| entry.region == r))
            .filter(|entry| {
                needle
                    .as_deref()
                    .is_none_or(|n| entry.name.to_lowercase().contains(n))
            })
            .collect()
    }

    /// Regions that have at least one entry, in declared order, with
    /// [`UNCLASSIFIED`] last.
    pub fn regions(&self, source_id: &str) -> Vec<&'a str> {
        let Some(snapshot) = self.catalog.get(source_id) else {
            return Vec::new();
        };
        let present = |name: &str| snapshot.entries.iter().any(|e| e.region == name);

        let mut regions: Vec<&'a str> = snapshot
            .regions
            .iter()
            .map(String::as_str)
            .filter(|name| present(*name))
            .collect();
        // Entries classified under a region the snapshot no longer declares.
        for entry in snapshot.entries.iter().filter(|e| !e.is_unclassified()) {
            let name = entry.region.as_str();
            if !regions.contains(&name) {
                regions.push(name);
            }
        }
        if present(UNCLASSIFIED) {
            regions.push(UNCLASSIFIED);
        }
        regions
    }

    /// Entries grouped per region, in [`regions`](Self::regions) order.
    pub fn grouped(&self, source_id: &str) -> Vec<(&'a str, Vec<&'a CatalogEntry>)> {
        self.regions(source_id)
            .into_iter()
            .map(|region| (region, self.list(source_id, Some(region), None)))
            .collect()
    }

    /// Look up an entry by content key.
    pub fn find(&self, source_id: &str, key: &str) -> Option<&'a CatalogEntry> {
        self.catalog
            .get(source_id)?
            .entries
            .iter()
            .find(|entry| entry.key == key)
    }

    pub fn status(&self, source_id: &str) -> SourceStatus<'a> {
        let failure = self.catalog.failure(source_id);
        match (self.catalog.get(source_id), failure) {
            (None, failure) => SourceStatus::Missing(failure),
            (Some(_), Some(failure)) => SourceStatus::Stale(failure),
            (Some(_), None) => SourceStatus::Fresh,
        }
    }

    /// Stable re-sort of `entries` for display.
    pub fn sorted(mut entries: Vec<&'a CatalogEntry>, key: SortKey) -> Vec<&'a CatalogEntry> {
        match key {
            SortKey::Scrape => {}
            SortKey::Name => entries.sort_by_cached_key(|e| e.name.to_lowercase()),
            SortKey::Size => entries.sort_by(|a, b| compare_sizes(a.size_bytes, b.size_bytes)),
        }
        entries
    }
}

fn compare_sizes(a: Option<u64>, b: Option<u64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

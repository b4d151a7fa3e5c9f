// src/models/entry.rs

//! Raw extracted rows and the catalog entries built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Region assigned when no configured keyword matches.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Unparsed field values pulled out of one listing row.
///
/// The `url` field already holds the resolved absolute link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Builder-style insert, handy when assembling rows by hand.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    /// Value of `field`, or an empty string when it was not extracted.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map_or("", String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A downloadable item in the catalog.
///
/// Entries are created once by the normalizer and never edited afterwards;
/// re-classification produces new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Owning source id
    pub source_id: String,

    /// Display name (whitespace-normalized)
    pub name: String,

    /// Absolute download URL
    pub url: String,

    /// Size as shown on the listing
    pub size: String,

    /// Parsed size; `None` when the listing size could not be read
    pub size_bytes: Option<u64>,

    /// Configured region name or [`UNCLASSIFIED`]
    pub region: String,

    /// Identity within the source, see [`content_key`]
    pub key: String,

    /// Values of configured extra fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CatalogEntry {
    /// Listing size, or `?` when the listing had none.
    pub fn display_size(&self) -> &str {
        if self.size.is_empty() { "?" } else { &self.size }
    }

    pub fn is_unclassified(&self) -> bool {
        self.region == UNCLASSIFIED
    }

    /// Copy of this entry carrying a different region.
    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..self.clone()
        }
    }
}

/// Stable identity for an entry: a short hash of its normalized name
/// (lowercase, collapsed whitespace) and parsed size.
pub fn content_key(name: &str, size_bytes: Option<u64>) -> String {
    let normalized = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let size = size_bytes.map_or_else(|| "?".to_string(), |b| b.to_string());

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(size.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

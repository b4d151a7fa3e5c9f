// src/services/normalize.rs

//! Entry normalizer: raw rows to catalog entries.

use std::collections::BTreeMap;

use crate::models::{
    CatalogEntry, FieldSelectors, RawRow, RegionRule, SourceConfig, UNCLASSIFIED, content_key,
};
use crate::utils::size::parse_size;

/// Why a row was dropped as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    MissingName,
    MissingUrl,
}

/// Result of normalizing one raw row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row became an entry. `size_unparsable` is set when the source
    /// has a size selector but its value could not be read.
    Kept {
        entry: CatalogEntry,
        size_unparsable: bool,
    },
    /// Dropped by the ignore rule at this index.
    Ignored { rule: usize },
    Malformed(MalformedReason),
}

/// Applies one source's ignore rules, size parsing and region table.
#[derive(Debug, Clone, Copy)]
pub struct EntryNormalizer<'a> {
    source: &'a SourceConfig,
}

impl<'a> EntryNormalizer<'a> {
    pub fn new(source: &'a SourceConfig) -> Self {
        Self { source }
    }

    pub fn normalize(&self, row: &RawRow) -> RowOutcome {
        let values: BTreeMap<&str, String> = row
            .iter()
            .map(|(field, value)| (field, collapse_whitespace(value)))
            .collect();

        if let Some(rule) = self
            .source
            .ignore
            .iter()
            .position(|rule| rule.matches(field_value(&values, &rule.field)))
        {
            return RowOutcome::Ignored { rule };
        }

        let name = field_value(&values, FieldSelectors::NAME);
        if name.is_empty() {
            return RowOutcome::Malformed(MalformedReason::MissingName);
        }
        let url = field_value(&values, FieldSelectors::URL);
        if url.is_empty() {
            return RowOutcome::Malformed(MalformedReason::MissingUrl);
        }

        let size = field_value(&values, FieldSelectors::SIZE);
        let size_bytes = parse_size(size);
        let size_unparsable = self.source.fields.size.is_some() && size_bytes.is_none();
        if size_unparsable {
            log::debug!("[{}] unreadable size {:?} for {}", self.source.id, size, name);
        }

        let extra = self
            .source
            .fields
            .extra
            .keys()
            .map(|field| (field.clone(), field_value(&values, field).to_string()))
            .collect();

        let entry = CatalogEntry {
            source_id: self.source.id.clone(),
            name: name.to_string(),
            url: url.to_string(),
            size: size.to_string(),
            size_bytes,
            region: classify_region(name, &self.source.regions).to_string(),
            key: content_key(name, size_bytes),
            extra,
        };
        RowOutcome::Kept {
            entry,
            size_unparsable,
        }
    }
}

/// First region (in declared order) with a token contained in `name`,
/// ignoring case; [`UNCLASSIFIED`] otherwise.
pub fn classify_region<'r>(name: &str, regions: &'r [RegionRule]) -> &'r str {
    let lower = name.to_lowercase();
    regions
        .iter()
        .find(|region| region.matches(&lower))
        .map_or(UNCLASSIFIED, |region| region.name.as_str())
}

/// Re-run classification over existing entries with a new region table.
pub fn reclassify(entries: &[CatalogEntry], regions: &[RegionRule]) -> Vec<CatalogEntry> {
    entries
        .iter()
        .map(|entry| entry.with_region(classify_region(&entry.name, regions)))
        .collect()
}

fn field_value<'v>(values: &'v BTreeMap<&str, String>, field: &str) -> &'v str {
    values.get(field).map_or("", String::as_str)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

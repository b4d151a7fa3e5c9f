// src/models/source.rs

//! Per-source scraping rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// One configured listing (e.g. one console's ROM directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique identifier, used as the catalog key
    pub id: String,

    /// Display name (falls back to `id`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Listing page URL; relative links resolve against it
    pub base_url: String,

    /// Selector for each entry row in the listing
    #[serde(default = "default_entries")]
    pub entries: String,

    /// Attribute read from the element matched by the `url` field selector
    #[serde(default = "default_link_attr")]
    pub link_attr: String,

    /// Preferred download folders for this source
    #[serde(
        default,
        alias = "download_folder",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub download_folders: Vec<String>,

    /// Field selectors, evaluated inside each row
    #[serde(default)]
    pub fields: FieldSelectors,

    /// Rows matching any of these rules are dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<IgnoreRule>,

    /// Region keyword table; declaration order breaks ties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionRule>,
}

fn default_entries() -> String {
    "a".to_string()
}

fn default_link_attr() -> String {
    "href".to_string()
}

/// Accept either a single string or a list of strings.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl SourceConfig {
    /// Name shown to the user.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Hash over everything that changes what raw rows a scrape yields:
    /// base URL, row and field selectors, link attribute, and ignore rules.
    ///
    /// Download folders and the region table are deliberately excluded.
    pub fn scrape_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_pair(&mut hasher, "base_url", &self.base_url);
        hash_pair(&mut hasher, "entries", &self.entries);
        hash_pair(&mut hasher, "link_attr", &self.link_attr);
        hash_pair(&mut hasher, "fields.name", &self.fields.name);
        hash_pair(&mut hasher, "fields.url", &self.fields.url);
        match &self.fields.size {
            Some(size) => hash_pair(&mut hasher, "fields.size", size),
            None => hash_pair(&mut hasher, "fields.size?", ""),
        }
        for (field, selector) in &self.fields.extra {
            hash_pair(&mut hasher, &format!("fields.extra.{field}"), selector);
        }
        for (i, rule) in self.ignore.iter().enumerate() {
            hash_pair(&mut hasher, &format!("ignore.{i}.field"), &rule.field);
            if let Some(token) = &rule.contains {
                hash_pair(&mut hasher, &format!("ignore.{i}.contains"), token);
            }
            if let Some(value) = &rule.equals {
                hash_pair(&mut hasher, &format!("ignore.{i}.equals"), value);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Hash over the ordered region table.
    pub fn region_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (i, region) in self.regions.iter().enumerate() {
            hash_pair(&mut hasher, &format!("region.{i}"), &region.name);
            for token in &region.tokens {
                hash_pair(&mut hasher, &format!("region.{i}.token"), token);
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Declared region names, in order.
    pub fn region_names(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.name.clone()).collect()
    }
}

/// Length-prefixed so that ("ab", "c") and ("a", "bc") hash differently.
fn hash_pair(hasher: &mut Sha256, key: &str, value: &str) {
    hasher.update((key.len() as u64).to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Selectors for the fields of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelectors {
    /// Element whose text is the entry name
    #[serde(default = "default_field")]
    pub name: String,

    /// Element carrying the download link
    #[serde(default = "default_field")]
    pub url: String,

    /// Element whose text is the human-readable size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Any further named fields, kept verbatim on the entry
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

fn default_field() -> String {
    "a".to_string()
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self {
            name: default_field(),
            url: default_field(),
            size: None,
            extra: BTreeMap::new(),
        }
    }
}

impl FieldSelectors {
    pub const NAME: &'static str = "name";
    pub const URL: &'static str = "url";
    pub const SIZE: &'static str = "size";

    /// All `(field, selector)` pairs, built-in fields first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            Some((Self::NAME, self.name.as_str())),
            Some((Self::URL, self.url.as_str())),
            self.size.as_deref().map(|s| (Self::SIZE, s)),
        ]
        .into_iter()
        .flatten()
        .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Whether `field` names a selector configured here.
    pub fn has(&self, field: &str) -> bool {
        self.iter().any(|(name, _)| name == field)
    }
}

/// Drops a row when its `field` matches.
///
/// Exactly one of `contains` (case-insensitive substring) or `equals`
/// (case-sensitive, compared against the trimmed value) must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
}

impl IgnoreRule {
    pub fn contains(field: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            contains: Some(token.into()),
            equals: None,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            contains: None,
            equals: Some(value.into()),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        if let Some(token) = &self.contains {
            if value.to_lowercase().contains(&token.to_lowercase()) {
                return true;
            }
        }
        if let Some(expected) = &self.equals {
            if value.trim() == expected {
                return true;
            }
        }
        false
    }
}

/// One row of the region decision table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRule {
    pub name: String,
    pub tokens: Vec<String>,
}

impl RegionRule {
    pub fn new(name: impl Into<String>, tokens: &[&str]) -> Self {
        Self {
            name: name.into(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// `name_lower` must already be lowercased.
    pub fn matches(&self, name_lower: &str) -> bool {
        self.tokens
            .iter()
            .any(|token| !token.is_empty() && name_lower.contains(&token.to_lowercase()))
    }
}

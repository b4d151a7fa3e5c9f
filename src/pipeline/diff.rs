//! Diff between two snapshots of the same source.

use std::collections::{HashMap, HashSet};

use crate::models::CatalogEntry;

/// Entries added, removed, or moved to another region, by content key.
///
/// All lists follow the order of the snapshot they come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// `(key, old region, new region)`
    pub moved: Vec<(String, String, String)>,
}

impl SnapshotDiff {
    /// Compare `previous` against `current`.
    pub fn between(previous: &[CatalogEntry], current: &[CatalogEntry]) -> Self {
        let prev_map: HashMap<&str, &CatalogEntry> =
            previous.iter().map(|e| (e.key.as_str(), e)).collect();
        let curr_keys: HashSet<&str> = current.iter().map(|e| e.key.as_str()).collect();

        let mut diff = Self::default();
        for entry in current {
            match prev_map.get(entry.key.as_str()) {
                None => diff.added.push(entry.key.clone()),
                Some(old) if old.region != entry.region => diff.moved.push((
                    entry.key.clone(),
                    old.region.clone(),
                    entry.region.clone(),
                )),
                Some(_) => {}
            }
        }
        diff.removed = previous
            .iter()
            .filter(|e| !curr_keys.contains(e.key.as_str()))
            .map(|e| e.key.clone())
            .collect();
        diff
    }

    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.moved.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.moved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, region: &str) -> CatalogEntry {
        CatalogEntry {
            source_id: "gb".into(),
            name: key.into(),
            url: format!("https://example.com/{key}"),
            size: String::new(),
            size_bytes: None,
            region: region.into(),
            key: key.into(),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_no_changes() {
        let entries = vec![entry("a", "USA"), entry("b", "Japan")];
        let diff = SnapshotDiff::between(&entries, &entries);
        assert!(!diff.has_changes());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_added_removed_moved() {
        let previous = vec![entry("a", "USA"), entry("b", "Japan"), entry("c", "USA")];
        let current = vec![entry("d", "USA"), entry("b", "Asia"), entry("a", "USA")];
        let diff = SnapshotDiff::between(&previous, &current);

        assert_eq!(diff.added, vec!["d"]);
        assert_eq!(diff.removed, vec!["c"]);
        assert_eq!(
            diff.moved,
            vec![("b".to_string(), "Japan".to_string(), "Asia".to_string())]
        );
        assert_eq!(diff.change_count(), 3);
    }

    #[test]
    fn test_from_empty() {
        let current = vec![entry("a", "USA")];
        let diff = SnapshotDiff::between(&[], &current);
        assert_eq!(diff.added, vec!["a"]);
        assert!(diff.removed.is_empty());
    }
}

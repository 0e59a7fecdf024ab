// src/checksum/diff.rs

//! Partition of two checksum maps into new, modified, deleted and pristine paths

use super::ChecksumMap;
use serde::Serialize;

/// The four-way partition of `keys(baseline) ∪ keys(live)`
///
/// Every path lands in exactly one set. `deleted` carries the baseline
/// hash; the other three carry the live hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksumDiff {
    /// In live, not in baseline
    pub new: ChecksumMap,
    /// In both, hashes differ
    pub modified: ChecksumMap,
    /// In baseline, not in live
    pub deleted: ChecksumMap,
    /// In both, hashes equal
    pub pristine: ChecksumMap,
}

impl ChecksumDiff {
    /// True when live matches the baseline exactly
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of paths that differ from the baseline
    pub fn change_count(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len()
    }
}

/// Compare a baseline against a live snapshot
pub fn diff(baseline: &ChecksumMap, live: &ChecksumMap) -> ChecksumDiff {
    let mut result = ChecksumDiff::default();

    for (path, live_hash) in live {
        match baseline.get(path) {
            None => {
                result.new.insert(path.clone(), live_hash.clone());
            }
            Some(base_hash) if base_hash == live_hash => {
                result.pristine.insert(path.clone(), live_hash.clone());
            }
            Some(_) => {
                result.modified.insert(path.clone(), live_hash.clone());
            }
        }
    }

    for (path, base_hash) in baseline {
        if !live.contains_key(path) {
            result.deleted.insert(path.clone(), base_hash.clone());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> ChecksumMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_partitions() {
        let baseline = map(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let live = map(&[("a", "1"), ("b", "9"), ("d", "4")]);

        let result = diff(&baseline, &live);

        assert_eq!(result.pristine, map(&[("a", "1")]));
        assert_eq!(result.modified, map(&[("b", "9")]));
        assert_eq!(result.deleted, map(&[("c", "3")]));
        assert_eq!(result.new, map(&[("d", "4")]));
        assert_eq!(result.change_count(), 3);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_diff_identical_is_clean() {
        let a = map(&[("index.php", "ff"), ("lib/x.php", "ee")]);
        let result = diff(&a, &a);

        assert!(result.is_clean());
        assert_eq!(result.pristine, a);
    }

    #[test]
    fn test_diff_empty_maps() {
        let result = diff(&ChecksumMap::new(), &ChecksumMap::new());
        assert_eq!(result, ChecksumDiff::default());
    }

    #[test]
    fn test_pristine_requires_exact_hash_match() {
        // Same path, hash differing only in case, is a modification
        let baseline = map(&[("a", "abcd")]);
        let live = map(&[("a", "ABCD")]);

        let result = diff(&baseline, &live);
        assert!(result.pristine.is_empty());
        assert_eq!(result.modified.len(), 1);
    }
}

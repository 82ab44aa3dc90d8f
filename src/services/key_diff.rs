//! Diff primitives shared by the convergence algorithms.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::DeployKey;

/// Entries of `left` whose value in `right` differs or is absent.
///
/// Absence in `right` counts as a distinct value, so every key of `left`
/// missing from `right` is returned. Keys present only in `right` are never
/// returned.
pub fn compare_keys<K, V>(left: &BTreeMap<K, V>, right: &BTreeMap<K, V>) -> BTreeMap<K, V>
where
    K: Ord + Clone,
    V: PartialEq + Clone,
{
    left.iter()
        .filter(|(key, value)| right.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Names in `names` that do not occur in `exclude`, in first-seen order and
/// without duplicates.
pub fn name_difference<'a>(names: &'a [String], exclude: &[String]) -> Vec<&'a str> {
    let exclude: BTreeSet<&str> = exclude.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    names
        .iter()
        .map(String::as_str)
        .filter(|name| !exclude.contains(name) && seen.insert(*name))
        .collect()
}

/// Deploy-key changes needed to turn the remote set into the local one.
///
/// `add` holds keys that are missing remotely or differ; a differing remote
/// copy is deleted before re-adding since providers offer no in-place edit.
/// `remove` holds keys the remote has but the local set does not name at
/// all. The two sets never share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployKeyDelta {
    pub add: BTreeMap<String, DeployKey>,
    pub remove: BTreeMap<String, DeployKey>,
}

impl DeployKeyDelta {
    pub fn between(
        local: &BTreeMap<String, DeployKey>,
        remote: &BTreeMap<String, DeployKey>,
    ) -> Self {
        let add = compare_keys(local, remote);
        let remove = compare_keys(remote, local)
            .into_iter()
            .filter(|(name, _)| !local.contains_key(name))
            .collect();
        Self { add, remove }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(material: &str) -> DeployKey {
        DeployKey::new("ssh-ed25519", material, false)
    }

    fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, DeployKey> {
        pairs
            .iter()
            .map(|(name, material)| ((*name).to_string(), key(material)))
            .collect()
    }

    #[test]
    fn test_compare_keys_missing_and_changed() {
        let local = keys(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let remote = keys(&[("a", "1"), ("b", "x"), ("d", "4")]);

        let diff = compare_keys(&local, &remote);
        assert_eq!(diff.keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(diff["b"], key("2"));
    }

    #[test]
    fn test_compare_keys_identical_is_empty() {
        let local = keys(&[("a", "1")]);
        assert!(compare_keys(&local, &local.clone()).is_empty());
    }

    #[test]
    fn test_write_access_change_is_a_difference() {
        let local: BTreeMap<_, _> =
            [("a".to_string(), DeployKey::new("ssh-ed25519", "1", true))].into();
        let remote = keys(&[("a", "1")]);
        assert_eq!(compare_keys(&local, &remote).len(), 1);
    }

    #[test]
    fn test_delta_is_disjoint() {
        let local = keys(&[("a", "1"), ("b", "2")]);
        let remote = keys(&[("b", "changed"), ("c", "3")]);

        let delta = DeployKeyDelta::between(&local, &remote);
        assert_eq!(delta.add.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(delta.remove.keys().collect::<Vec<_>>(), vec!["c"]);
        assert!(delta.add.keys().all(|k| !delta.remove.contains_key(k)));
    }

    #[test]
    fn test_delta_empty_when_in_sync() {
        let local = keys(&[("a", "1")]);
        assert!(DeployKeyDelta::between(&local, &local.clone()).is_empty());
    }

    #[test]
    fn test_name_difference_preserves_order_and_dedupes() {
        let names = vec!["Z".to_string(), "X".to_string(), "Y".to_string(), "Z".to_string()];
        let exclude = vec!["X".to_string()];
        assert_eq!(name_difference(&names, &exclude), vec!["Z", "Y"]);
    }
}

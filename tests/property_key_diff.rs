use std::collections::BTreeMap;

use proptest::prelude::*;
use repokeeper::domain::models::DeployKey;
use repokeeper::services::{compare_keys, name_difference, DeployKeyDelta};

fn key_strategy() -> impl Strategy<Value = DeployKey> {
    ("[a-c]{1,2}", any::<bool>()).prop_map(|(material, write)| {
        DeployKey::new("ssh-ed25519", material, write)
    })
}

fn key_set() -> impl Strategy<Value = BTreeMap<String, DeployKey>> {
    prop::collection::btree_map("[a-e]", key_strategy(), 0..6)
}

proptest! {
    /// Property: every entry returned differs from (or is absent in) `right`
    #[test]
    fn prop_compare_keys_returns_only_differences(
        left in key_set(),
        right in key_set(),
    ) {
        let diff = compare_keys(&left, &right);
        for (name, value) in &diff {
            prop_assert_eq!(left.get(name), Some(value));
            prop_assert_ne!(right.get(name), Some(value));
        }
        for (name, value) in &left {
            if right.get(name) != Some(value) {
                prop_assert!(diff.contains_key(name));
            }
        }
    }

    /// Property: applying the delta to the remote set yields the local set
    #[test]
    fn prop_delta_converges_remote_onto_local(
        local in key_set(),
        remote in key_set(),
    ) {
        let delta = DeployKeyDelta::between(&local, &remote);

        let mut converged = remote.clone();
        for name in delta.remove.keys() {
            converged.remove(name);
        }
        for (name, key) in &delta.add {
            converged.insert(name.clone(), key.clone());
        }
        prop_assert_eq!(&converged, &local);

        for name in delta.add.keys() {
            prop_assert!(!delta.remove.contains_key(name));
        }
    }

    /// Property: a set compared with itself needs no changes
    #[test]
    fn prop_delta_of_equal_sets_is_empty(keys in key_set()) {
        prop_assert!(DeployKeyDelta::between(&keys, &keys).is_empty());
    }

    /// Property: the difference is duplicate-free and never names an excluded entry
    #[test]
    fn prop_name_difference(
        names in prop::collection::vec("[a-f]", 0..12),
        exclude in prop::collection::vec("[a-f]", 0..6),
    ) {
        let diff = name_difference(&names, &exclude);
        let mut seen = std::collections::BTreeSet::new();
        for name in &diff {
            prop_assert!(!exclude.iter().any(|e| e == name));
            prop_assert!(seen.insert(*name));
        }
        for name in &names {
            if !exclude.contains(name) {
                prop_assert!(diff.contains(&name.as_str()));
            }
        }
    }
}

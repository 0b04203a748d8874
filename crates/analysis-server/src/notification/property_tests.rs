//
// notification/property_tests.rs
//
// Property-based tests for subscription deltas
//

#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;

use super::source_set::{SourceInventory, SourceSet, SourceSetProvider};
use crate::source::Source;

/// Sources 0..8; even indices live in the SDK.
fn source(i: usize) -> Source {
    if i % 2 == 0 {
        Source::sdk(&format!("lib{}", i)).unwrap()
    } else {
        Source::parse(&format!("file:///work/s{}", i)).unwrap()
    }
}

fn source_indices() -> impl Strategy<Value = HashSet<usize>> {
    prop::collection::hash_set(0usize..8, 0..8)
}

fn source_set() -> impl Strategy<Value = SourceSet> {
    prop_oneof![
        Just(SourceSet::All),
        Just(SourceSet::ExplicitlyAdded),
        Just(SourceSet::NonSdk),
        source_indices().prop_map(|ids| SourceSet::list(ids.into_iter().map(source))),
    ]
}

fn inventory() -> impl Strategy<Value = SourceInventory> {
    (source_indices(), source_indices()).prop_map(|(known, added)| {
        let added: HashSet<Source> = added.into_iter().map(source).collect();
        // Explicitly added sources are always known as well.
        let mut known: HashSet<Source> = known.into_iter().map(source).collect();
        known.extend(added.iter().cloned());
        SourceInventory { known, added }
    })
}

proptest! {
    #[test]
    fn prop_delta_is_pure(old in source_set(), new in source_set(), inv in inventory()) {
        let old = SourceSetProvider::new(old);
        let new = SourceSetProvider::new(new);
        let first = new.compute_new_sources(Some(&old), &inv);
        let second = new.compute_new_sources(Some(&old), &inv);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_delta_is_covered_by_new_and_not_by_old(
        old in source_set(),
        new in source_set(),
        inv in inventory(),
    ) {
        let old = SourceSetProvider::new(old);
        let new = SourceSetProvider::new(new);
        for source in new.compute_new_sources(Some(&old), &inv) {
            prop_assert!(new.apply(&source, &inv));
            prop_assert!(!old.apply(&source, &inv));
        }
    }

    #[test]
    fn prop_no_known_source_is_missed(old in source_set(), new in source_set(), inv in inventory()) {
        let old = SourceSetProvider::new(old);
        let new = SourceSetProvider::new(new);
        let delta = new.compute_new_sources(Some(&old), &inv);
        for source in &inv.known {
            if new.apply(source, &inv) && !old.apply(source, &inv) {
                prop_assert!(delta.contains(source));
            }
        }
    }

    #[test]
    fn prop_same_subscription_has_empty_delta(set in source_set(), inv in inventory()) {
        let provider = SourceSetProvider::new(set);
        prop_assert!(provider.compute_new_sources(Some(&provider.clone()), &inv).is_empty());
    }
}

//
// notification/source_set.rs
//
// Declarative source subscriptions and their incremental deltas
//

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSetKind {
    All,
    ExplicitlyAdded,
    NonSdk,
    List,
}

/// Which sources a subscription covers.
///
/// Only `List` carries sources. The other kinds are resolved against a
/// context's [`SourceInventory`] at the time they are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sources", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSet {
    All,
    ExplicitlyAdded,
    NonSdk,
    List(HashSet<Source>),
}

impl SourceSet {
    pub fn list(sources: impl IntoIterator<Item = Source>) -> Self {
        SourceSet::List(sources.into_iter().collect())
    }

    pub fn kind(&self) -> SourceSetKind {
        match self {
            SourceSet::All => SourceSetKind::All,
            SourceSet::ExplicitlyAdded => SourceSetKind::ExplicitlyAdded,
            SourceSet::NonSdk => SourceSetKind::NonSdk,
            SourceSet::List(_) => SourceSetKind::List,
        }
    }

    /// Explicit sources of a `List`; always empty for the other kinds.
    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        match self {
            SourceSet::List(sources) => Some(sources),
            _ => None,
        }
        .into_iter()
        .flatten()
    }
}

/// The sources a context knows about.
#[derive(Debug, Clone, Default)]
pub struct SourceInventory {
    /// Every source the engine has reported results for.
    pub known: HashSet<Source>,
    /// Sources the client added explicitly.
    pub added: HashSet<Source>,
}

impl SourceInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forget(&mut self, source: &Source) {
        self.known.remove(source);
        self.added.remove(source);
    }
}

/// An active subscription for one notification kind of one context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSetProvider {
    set: SourceSet,
}

impl SourceSetProvider {
    pub fn new(set: SourceSet) -> Self {
        Self { set }
    }

    pub fn source_set(&self) -> &SourceSet {
        &self.set
    }

    /// Whether `source` is covered by this subscription.
    pub fn apply(&self, source: &Source, inventory: &SourceInventory) -> bool {
        match &self.set {
            SourceSet::All => true,
            SourceSet::ExplicitlyAdded => inventory.added.contains(source),
            SourceSet::NonSdk => !source.is_in_sdk(),
            SourceSet::List(sources) => sources.contains(source),
        }
    }

    /// Sources covered by this subscription that `old` did not cover.
    ///
    /// With no previous subscription every covered source is new. `All`
    /// covers everything, so nothing is ever new after it.
    pub fn compute_new_sources(
        &self,
        old: Option<&SourceSetProvider>,
        inventory: &SourceInventory,
    ) -> BTreeSet<Source> {
        self.candidates(inventory)
            .filter(|source| old.map_or(true, |old| !old.apply(source, inventory)))
            .cloned()
            .collect()
    }

    /// Every source this subscription can currently resolve to.
    fn candidates<'a>(
        &'a self,
        inventory: &'a SourceInventory,
    ) -> Box<dyn Iterator<Item = &'a Source> + 'a> {
        match &self.set {
            SourceSet::All => Box::new(inventory.known.iter()),
            SourceSet::ExplicitlyAdded => Box::new(inventory.added.iter()),
            SourceSet::NonSdk => Box::new(inventory.known.iter().filter(|s| !s.is_in_sdk())),
            SourceSet::List(sources) => Box::new(sources.iter()),
        }
    }
}

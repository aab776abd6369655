//! Immutable-snapshot service lookups.
//!
//! A [`Lookup`] maps [`ServiceKey`]s to values (service entries at build
//! time, compiled resolvers at request time). Two interchangeable backends
//! exist: a hash map for small registries and a persistent balanced tree for
//! large ones. Both give identical answers.
//!
//! Lookups are snapshots: [`Lookup::add`] returns an extended copy and
//! leaves the original untouched, so a published snapshot can be read
//! without locking while a newer one is being prepared.

mod tree;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::key::ServiceKey;
use crate::options::LookupEngine;
use tree::AvlTree;

enum Repr<V> {
    Dict(Arc<HashMap<ServiceKey, V>>),
    Tree(AvlTree<ServiceKey, V>),
}

impl<V> Clone for Repr<V> {
    fn clone(&self) -> Self {
        match self {
            Repr::Dict(map) => Repr::Dict(Arc::clone(map)),
            Repr::Tree(tree) => Repr::Tree(tree.clone()),
        }
    }
}

/// Snapshot map keyed by [`ServiceKey`].
///
/// # Examples
/// ```
/// use khazin_container::key::ServiceKey;
/// use khazin_container::lookup::Lookup;
/// use khazin_container::options::LookupEngine;
///
/// let mut lookup = Lookup::new(LookupEngine::Dict, 30);
/// assert!(lookup.try_add(ServiceKey::of::<u8>(), "byte"));
/// assert!(!lookup.try_add(ServiceKey::of::<u8>(), "again"));
///
/// let extended = lookup.add(ServiceKey::of::<u16>(), "word").unwrap();
/// assert!(lookup.try_get(&ServiceKey::of::<u16>()).is_none());
/// assert_eq!(extended.try_get(&ServiceKey::of::<u16>()), Some(&"word"));
/// ```
pub struct Lookup<V> {
    repr: Repr<V>,
    engine: LookupEngine,
    threshold: usize,
}

impl<V> Clone for Lookup<V> {
    fn clone(&self) -> Self {
        Self {
            repr: self.repr.clone(),
            engine: self.engine,
            threshold: self.threshold,
        }
    }
}

impl<V: Clone> Lookup<V> {
    /// Empty lookup. `threshold` only matters for [`LookupEngine::Auto`].
    pub fn new(engine: LookupEngine, threshold: usize) -> Self {
        let repr = if engine.prefers_tree(0, threshold) {
            Repr::Tree(AvlTree::new())
        } else {
            Repr::Dict(Arc::new(HashMap::new()))
        };
        Self {
            repr,
            engine,
            threshold,
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Dict(map) => map.len(),
            Repr::Tree(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the balanced-tree backend is in use.
    pub fn is_tree(&self) -> bool {
        matches!(self.repr, Repr::Tree(_))
    }

    pub fn try_get(&self, key: &ServiceKey) -> Option<&V> {
        match &self.repr {
            Repr::Dict(map) => map.get(key),
            Repr::Tree(tree) => tree.get(key),
        }
    }

    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.try_get(key).is_some()
    }

    /// Inserts when absent. Returns `false`, changing nothing, when `key`
    /// is already present.
    ///
    /// Clones that share storage with this lookup are not affected.
    pub fn try_add(&mut self, key: ServiceKey, value: V) -> bool {
        let added = match &mut self.repr {
            Repr::Dict(map) => {
                if map.contains_key(&key) {
                    false
                } else {
                    Arc::make_mut(map).insert(key, value);
                    true
                }
            }
            Repr::Tree(tree) => match tree.insert(key, value) {
                Some(next) => {
                    *tree = next;
                    true
                }
                None => false,
            },
        };

        if added && !self.is_tree() && self.engine.prefers_tree(self.len(), self.threshold) {
            self.promote();
        }
        added
    }

    /// Copy-on-write extension: a new snapshot with `key` added, or `None`
    /// when `key` is already present. `self` is left unchanged.
    pub fn add(&self, key: ServiceKey, value: V) -> Option<Self> {
        let mut next = self.clone();
        next.try_add(key, value).then_some(next)
    }

    /// Iterates entries. Tree lookups yield keys in order; dict lookups in
    /// unspecified order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&ServiceKey, &V)> + '_> {
        match &self.repr {
            Repr::Dict(map) => Box::new(map.iter()),
            Repr::Tree(tree) => Box::new(tree.iter()),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> + '_ {
        self.iter().map(|(key, _)| key)
    }

    fn promote(&mut self) {
        let Repr::Dict(map) = &self.repr else {
            return;
        };
        let mut tree = AvlTree::new();
        for (key, value) in map.iter() {
            if let Some(next) = tree.insert(key.clone(), value.clone()) {
                tree = next;
            }
        }
        trace!(entries = tree.len(), "Promoting lookup to tree backend");
        self.repr = Repr::Tree(tree);
    }
}

impl<V: Clone> fmt::Debug for Lookup<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("backend", &if self.is_tree() { "tree" } else { "dict" })
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{GenericDefinition, ServiceType};

    struct Repo;

    fn keys(n: usize) -> Vec<ServiceKey> {
        let repo = GenericDefinition::of::<Repo>();
        let names: [&'static str; 4] = ["a", "b", "c", "d"];
        let bases = [
            ServiceType::of::<u8>(),
            ServiceType::of::<u16>(),
            ServiceType::of::<u32>(),
            ServiceType::of::<u64>(),
            ServiceType::of::<String>(),
        ];
        let mut out = Vec::new();
        for base in &bases {
            out.push(ServiceKey::new(base.clone(), None));
            for name in names {
                out.push(ServiceKey::new(base.clone(), Some(name)));
            }
            out.push(ServiceKey::new(repo.construct([base.clone()]), None));
        }
        out.truncate(n);
        out
    }

    fn engines() -> [LookupEngine; 3] {
        [LookupEngine::Dict, LookupEngine::Tree, LookupEngine::Auto]
    }

    #[test]
    fn backends_agree() {
        let all = keys(30);
        for engine in engines() {
            let mut lookup = Lookup::new(engine, 8);
            for (i, key) in all.iter().enumerate() {
                assert!(lookup.try_add(key.clone(), i));
            }
            for (i, key) in all.iter().enumerate() {
                assert_eq!(lookup.try_get(key), Some(&i), "{engine:?}");
            }
            assert_eq!(lookup.len(), all.len());
            assert!(lookup.try_get(&ServiceKey::of::<bool>()).is_none());
        }
    }

    #[test]
    fn duplicate_add_is_rejected_without_overwrite() {
        for engine in engines() {
            let mut lookup = Lookup::new(engine, 30);
            assert!(lookup.try_add(ServiceKey::of::<u8>(), 1));
            assert!(!lookup.try_add(ServiceKey::of::<u8>(), 2));
            assert!(lookup.add(ServiceKey::of::<u8>(), 3).is_none());
            assert_eq!(lookup.try_get(&ServiceKey::of::<u8>()), Some(&1));
        }
    }

    #[test]
    fn published_snapshot_keeps_original_contents() {
        for engine in engines() {
            let mut base = Lookup::new(engine, 30);
            base.try_add(ServiceKey::of::<u8>(), "u8");
            let held_elsewhere = base.clone();

            let extended = base.add(ServiceKey::of::<u16>(), "u16").unwrap();
            base.try_add(ServiceKey::of::<u32>(), "u32");

            assert_eq!(held_elsewhere.len(), 1);
            assert!(held_elsewhere.try_get(&ServiceKey::of::<u16>()).is_none());
            assert!(held_elsewhere.try_get(&ServiceKey::of::<u32>()).is_none());
            assert_eq!(extended.try_get(&ServiceKey::of::<u16>()), Some(&"u16"));
            assert!(extended.try_get(&ServiceKey::of::<u32>()).is_none());
        }
    }

    #[test]
    fn auto_promotes_past_threshold() {
        let mut lookup = Lookup::new(LookupEngine::Auto, 4);
        for (i, key) in keys(4).into_iter().enumerate() {
            lookup.try_add(key, i);
        }
        assert!(!lookup.is_tree());
        lookup.try_add(ServiceKey::of::<bool>(), 99);
        assert!(lookup.is_tree());
        assert_eq!(lookup.len(), 5);
        assert_eq!(lookup.try_get(&ServiceKey::of::<bool>()), Some(&99));
    }

    #[test]
    fn tree_iterates_in_key_order() {
        let mut lookup = Lookup::new(LookupEngine::Tree, 0);
        for key in keys(12).into_iter().rev() {
            lookup.try_add(key, ());
        }
        let collected: Vec<&ServiceKey> = lookup.keys().collect();
        let mut sorted = collected.clone();
        sorted.sort();
        assert_eq!(collected, sorted);
    }
}

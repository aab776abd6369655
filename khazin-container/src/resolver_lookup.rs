//! Request-time index from keys to resolvers.
//!
//! Readers load the current snapshot without locking. Anything that
//! changes a snapshot (publishing a resolver, specializing an open generic)
//! runs under one re-entrant lock, builds a new snapshot and swaps it in
//! atomically. Published snapshots are never modified.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use khazin_support::rendering::suggest_similar;
use parking_lot::ReentrantMutex;
use tracing::{debug, trace};

use crate::compiler::Compiler;
use crate::entry::ServiceEntry;
use crate::error::{KhazinError, Result};
use crate::graph::{CancellationFlag, DependencyGraphBuilder, EntrySource};
use crate::key::ServiceKey;
use crate::lookup::Lookup;
use crate::options::ContainerOptions;
use crate::pool::PoolRegistry;
use crate::registry::SealedRegistry;
use crate::resolver::{Resolver, ResolverCompiler};

const SUGGESTION_LIMIT: usize = 3;

pub(crate) struct ResolverLookup {
    options: ContainerOptions,
    compiler: Arc<dyn Compiler>,
    entries: ArcSwap<Lookup<Arc<ServiceEntry>>>,
    generics: Lookup<Arc<ServiceEntry>>,
    resolvers: ArcSwap<Lookup<Arc<Resolver>>>,
    /// Registered closed entries, in registration order.
    order: Vec<Arc<ServiceEntry>>,
    mutation: ReentrantMutex<()>,
    next_slot: AtomicUsize,
    pools: PoolRegistry,
}

impl ResolverLookup {
    pub fn new(sealed: SealedRegistry, options: ContainerOptions, compiler: Arc<dyn Compiler>) -> Self {
        let SealedRegistry {
            entries,
            generics,
            order,
            slot_count,
        } = sealed;

        Self {
            resolvers: ArcSwap::from_pointee(Lookup::new(options.engine, options.tree_threshold)),
            entries: ArcSwap::from_pointee(entries),
            generics,
            order,
            mutation: ReentrantMutex::new(()),
            next_slot: AtomicUsize::new(slot_count),
            pools: PoolRegistry::new(options.pool_capacity),
            compiler,
            options,
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Slots handed out so far, specializations included.
    pub fn slot_count(&self) -> usize {
        self.next_slot.load(Ordering::Acquire)
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// The current entry snapshot.
    pub fn entries(&self) -> Arc<Lookup<Arc<ServiceEntry>>> {
        self.entries.load_full()
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers.load().len()
    }

    /// Resolver for `key`, building and publishing it on first request.
    ///
    /// `Ok(None)` when nothing is registered for `key`.
    ///
    /// # Errors
    /// [`KhazinError::OpenGenericRequested`] for open types, or any build
    /// error of the entry.
    pub fn get(&self, key: &ServiceKey) -> Result<Option<Arc<Resolver>>> {
        if key.ty().is_open() {
            return Err(KhazinError::OpenGenericRequested { key: key.clone() });
        }
        if let Some(resolver) = self.resolvers.load().try_get(key) {
            return Ok(Some(resolver.clone()));
        }

        match self.find_entry(key)? {
            Some(entry) => self.publish(&entry, None).map(Some),
            None => Ok(None),
        }
    }

    /// Builds and publishes every registered entry, in registration order.
    pub fn prepare_all(&self, cancel: Option<&CancellationFlag>) -> Result<()> {
        for entry in &self.order {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            self.publish(entry, cancel)?;
        }
        debug!(resolvers = self.resolver_count(), "Prepared all resolvers");
        Ok(())
    }

    /// Entry for `key`, specializing an open generic registration at most
    /// once per constructed key.
    pub fn find_entry(&self, key: &ServiceKey) -> Result<Option<Arc<ServiceEntry>>> {
        if let Some(entry) = self.entries.load().try_get(key) {
            return Ok(Some(entry.clone()));
        }
        let Some(open) = key
            .open_counterpart()
            .and_then(|open_key| self.generics.try_get(&open_key).cloned())
        else {
            return Ok(None);
        };

        let _lock = self.mutation.lock();
        let current = self.entries.load_full();
        if let Some(entry) = current.try_get(key) {
            return Ok(Some(entry.clone()));
        }

        // Slots are only allocated under the lock, so peeking is safe.
        let slot = open.lifetime().uses_slot().then(|| self.next_slot.load(Ordering::Acquire));
        let closed = Arc::new(open.specialize(key.ty(), slot)?);
        if slot.is_some() {
            self.next_slot.fetch_add(1, Ordering::AcqRel);
        }

        let mut next = Lookup::clone(&current);
        next.try_add(key.clone(), closed.clone());
        self.entries.store(Arc::new(next));

        debug!(key = %key, generic = %open.key(), slot = ?slot, "Specialized open generic");
        Ok(Some(closed))
    }

    fn publish(&self, entry: &Arc<ServiceEntry>, cancel: Option<&CancellationFlag>) -> Result<Arc<Resolver>> {
        let _lock = self.mutation.lock();
        let current = self.resolvers.load_full();
        if let Some(resolver) = current.try_get(entry.key()) {
            return Ok(resolver.clone());
        }

        DependencyGraphBuilder::new(
            self,
            self.compiler.as_ref(),
            self.options.resolution_mode,
            self.options.strict_di,
        )
        .with_cancellation(cancel)
        .build(entry)?;

        let resolver = Arc::new(ResolverCompiler::new(&self.pools).compile(entry)?);
        let mut next = Lookup::clone(&current);
        next.try_add(entry.key().clone(), resolver.clone());
        self.resolvers.store(Arc::new(next));

        trace!(key = %entry.key(), "Published resolver");
        Ok(resolver)
    }

    pub fn suggestions(&self, key: &ServiceKey) -> Vec<String> {
        let entries = self.entries.load();
        let names: Vec<String> = entries
            .keys()
            .chain(self.generics.keys())
            .filter(|candidate| *candidate != key)
            .map(ToString::to_string)
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        suggest_similar(&key.to_string(), &names, SUGGESTION_LIMIT)
    }
}

impl EntrySource for ResolverLookup {
    fn entry(&self, key: &ServiceKey) -> Result<Option<Arc<ServiceEntry>>> {
        if key.ty().is_open() {
            return Err(KhazinError::OpenGenericRequested { key: key.clone() });
        }
        self.find_entry(key)
    }

    fn suggestions(&self, key: &ServiceKey) -> Vec<String> {
        ResolverLookup::suggestions(self, key)
    }
}

impl fmt::Debug for ResolverLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverLookup")
            .field("entries", &self.entries.load().len())
            .field("generics", &self.generics.len())
            .field("resolvers", &self.resolver_count())
            .field("slots", &self.slot_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Interpreter;
    use crate::entry::{EntryState, Specialization};
    use crate::instance::Instance;
    use crate::key::{GenericDefinition, ServiceType};
    use crate::lifetime::Lifetime;
    use crate::options::ResolutionMode;
    use crate::registry::{Registry, ServiceDescriptor};

    struct Repository;
    struct Config;
    struct Configuration;

    fn lookup(options: ContainerOptions, descriptors: Vec<ServiceDescriptor>) -> ResolverLookup {
        let mut registry = Registry::new(options.engine, options.tree_threshold);
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        ResolverLookup::new(registry.seal(), options, Arc::new(Interpreter))
    }

    fn repository() -> ServiceDescriptor {
        ServiceDescriptor::generic(
            GenericDefinition::of::<Repository>(),
            Lifetime::Scoped,
            |arguments| {
                let label = arguments[0].to_string();
                Ok(Specialization::factory(move |_, _| Ok(Instance::from_value(label.clone()))))
            },
        )
    }

    #[test]
    fn publishes_resolver_once() {
        let lookup = lookup(
            ContainerOptions::default(),
            vec![ServiceDescriptor::transient::<u8>(|_| Ok(Arc::new(1)))],
        );
        let key = ServiceKey::of::<u8>();
        let first = lookup.get(&key).unwrap().unwrap();
        let second = lookup.get(&key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lookup.resolver_count(), 1);
        assert!(first.entry().state().contains(EntryState::BUILT));
    }

    #[test]
    fn missing_key_is_none() {
        let lookup = lookup(ContainerOptions::default(), vec![]);
        assert!(lookup.get(&ServiceKey::of::<u8>()).unwrap().is_none());
    }

    #[test]
    fn open_generic_request_is_an_error() {
        let lookup = lookup(ContainerOptions::default(), vec![repository()]);
        let open = ServiceKey::new(GenericDefinition::of::<Repository>().open(), None);
        assert!(matches!(
            lookup.get(&open),
            Err(KhazinError::OpenGenericRequested { .. })
        ));
    }

    #[test]
    fn specializes_each_constructed_key_once() {
        let lookup = lookup(ContainerOptions::default(), vec![repository()]);
        let before = lookup.entries();
        let slots = lookup.slot_count();

        let key = ServiceKey::new(
            GenericDefinition::of::<Repository>().construct([ServiceType::of::<u32>()]),
            None,
        );
        let first = lookup.find_entry(&key).unwrap().unwrap();
        let second = lookup.find_entry(&key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.slot(), Some(slots));
        assert_eq!(lookup.slot_count(), slots + 1);

        // The snapshot taken before specializing never sees the new entry.
        assert!(before.try_get(&key).is_none());
        assert!(lookup.entries().try_get(&key).is_some());
    }

    #[test]
    fn aot_prepares_everything() {
        let options = ContainerOptions::default().with_resolution_mode(ResolutionMode::Aot);
        let lookup = lookup(
            options,
            vec![
                ServiceDescriptor::transient::<u8>(|_| Ok(Arc::new(1))),
                ServiceDescriptor::instance(Arc::new(2u16)),
            ],
        );
        lookup.prepare_all(None).unwrap();
        assert_eq!(lookup.resolver_count(), 2);
    }

    #[test]
    fn suggests_similar_names() {
        let lookup = lookup(
            ContainerOptions::default(),
            vec![ServiceDescriptor::instance(Arc::new(Configuration))],
        );
        let suggestions = lookup.suggestions(&ServiceKey::of::<Config>());
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].ends_with("Configuration"));
    }
}

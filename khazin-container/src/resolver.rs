//! Per-lifetime resolution strategies.
//!
//! A [`Resolver`] is what a scope calls on a request. It is compiled once
//! per entry by [`ResolverCompiler`] and shared by every scope:
//!
//! | lifetime   | strategy                                                |
//! |------------|---------------------------------------------------------|
//! | Transient  | run the factory, captured by the requesting scope       |
//! | Scoped     | requesting scope's slot                                 |
//! | Singleton  | root scope's slot                                       |
//! | Pooled     | requesting scope's slot, filled from the object pool    |
//! | Instance   | the registered value                                    |
//! | Contextual | the context function, fed the requesting scope          |

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::entry::{ContextFn, EntryState, FactoryFn, ServiceEntry};
use crate::error::{KhazinError, Result};
use crate::instance::Instance;
use crate::lifetime::Lifetime;
use crate::path;
use crate::pool::{ObjectPool, PoolRegistry};
use crate::scope::Scope;

enum Strategy {
    Transient(FactoryFn),
    Scoped {
        slot: usize,
        factory: FactoryFn,
    },
    Singleton {
        slot: usize,
        factory: FactoryFn,
    },
    Pooled {
        slot: usize,
        factory: FactoryFn,
        pool: Arc<ObjectPool>,
    },
    Value(Instance),
    Context(ContextFn),
}

/// Compiled request handler for one entry.
pub struct Resolver {
    entry: Arc<ServiceEntry>,
    strategy: Strategy,
}

impl Resolver {
    #[inline]
    pub fn entry(&self) -> &Arc<ServiceEntry> {
        &self.entry
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.entry.lifetime()
    }

    /// Produces the instance for a request made through `scope`.
    ///
    /// Singletons and pool items are produced by the root, so they go on the
    /// root's dependency path; everything else on the requesting scope's.
    pub(crate) fn resolve(&self, scope: &Scope) -> Result<Instance> {
        let root = match &self.strategy {
            Strategy::Singleton { .. } | Strategy::Pooled { .. } => Some(scope.root()?),
            _ => None,
        };
        let producer = root.as_ref().unwrap_or(scope);
        let _guard = path::enter(producer.path_owner(), &self.entry, scope.is_strict())?;
        trace!(key = %self.entry.key(), lifetime = %self.lifetime(), scope = %producer, "Resolving");

        match &self.strategy {
            Strategy::Transient(factory) => scope.create_instance(&self.entry, factory),
            Strategy::Scoped { slot, factory } => {
                scope.get_or_create_instance(&self.entry, *slot, factory)
            }
            Strategy::Singleton { slot, factory } => {
                producer.get_or_create_instance(&self.entry, *slot, factory)
            }
            Strategy::Pooled {
                slot,
                factory,
                pool,
            } => scope.get_or_checkout(&self.entry, *slot, factory, pool),
            Strategy::Value(value) => {
                self.entry.mark(EntryState::INSTANTIATED);
                Ok(value.clone())
            }
            Strategy::Context(context) => {
                let instance = context(scope)?;
                self.entry.mark(EntryState::INSTANTIATED);
                Ok(instance)
            }
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Transient(_) => "transient",
            Strategy::Scoped { .. } => "scoped",
            Strategy::Singleton { .. } => "singleton",
            Strategy::Pooled { .. } => "pooled",
            Strategy::Value(_) => "value",
            Strategy::Context(_) => "context",
        };
        f.debug_struct("Resolver")
            .field("key", self.entry.key())
            .field("strategy", &strategy)
            .finish()
    }
}

/// Turns built entries into resolvers.
pub(crate) struct ResolverCompiler<'a> {
    pools: &'a PoolRegistry,
}

impl<'a> ResolverCompiler<'a> {
    pub fn new(pools: &'a PoolRegistry) -> Self {
        Self { pools }
    }

    /// # Errors
    /// [`KhazinError::InvalidRegistration`] when `entry` is not built yet
    /// or is an open generic.
    pub fn compile(&self, entry: &Arc<ServiceEntry>) -> Result<Resolver> {
        if !entry.state().contains(EntryState::BUILT) || entry.is_generic() {
            return Err(KhazinError::invalid(
                entry.key(),
                "only built, closed entries can be resolved",
            ));
        }

        let lifetime = entry.lifetime();
        let strategy = match lifetime {
            Lifetime::Instance => {
                let value = entry
                    .value()
                    .ok_or_else(|| KhazinError::invalid(entry.key(), "instance entry has no value"))?;
                Strategy::Value(value.clone())
            }
            Lifetime::Contextual => {
                let context = entry.context().ok_or_else(|| {
                    KhazinError::invalid(entry.key(), "contextual entry has no context function")
                })?;
                Strategy::Context(context.clone())
            }
            Lifetime::Transient => Strategy::Transient(self.factory(entry)?),
            Lifetime::Scoped | Lifetime::Singleton | Lifetime::Pooled => {
                let slot = entry
                    .slot()
                    .ok_or_else(|| KhazinError::invalid(entry.key(), "no slot assigned"))?;
                let factory = self.factory(entry)?;
                match lifetime {
                    Lifetime::Scoped => Strategy::Scoped { slot, factory },
                    Lifetime::Singleton => Strategy::Singleton { slot, factory },
                    _ => Strategy::Pooled {
                        slot,
                        factory,
                        pool: self.pools.pool_for(entry),
                    },
                }
            }
        };

        trace!(key = %entry.key(), lifetime = %lifetime, "Compiled resolver");
        Ok(Resolver {
            entry: entry.clone(),
            strategy,
        })
    }

    fn factory(&self, entry: &ServiceEntry) -> Result<FactoryFn> {
        entry
            .factory()
            .cloned()
            .ok_or_else(|| KhazinError::invalid(entry.key(), "factory was not compiled"))
    }
}

//! # The Container
//!
//! Registers services, validates them and hands out correctly scoped
//! instances.
//!
//! # Architecture
//! ```text
//! ContainerBuilder  ──build()──>  Container (root scope)
//!                                    │
//!                              create_scope()
//!                                    │
//!                                    ▼
//!                                  Scope
//! ```
//!
//! # Examples
//! ```rust
//! use khazin_container::prelude::*;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let container = Container::builder()
//!     .singleton_with::<dyn Logger>(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
//!     .transient_with::<UserService>(|injector| {
//!         let logger = injector.resolve::<dyn Logger>()?;
//!         Ok(Arc::new(UserService { logger }))
//!     })
//!     .build()
//!     .expect("Failed to build container");
//!
//! let service: Arc<UserService> = container.resolve().expect("Failed to resolve");
//! service.logger.log("ready");
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::compiler::{Compiler, Interpreter};
use crate::entry::{DecoratorFn, ServiceEntry, Specialization};
use crate::error::{KhazinError, Result};
use crate::graph::CancellationFlag;
use crate::injector::Injector;
use crate::instance::Instance;
use crate::key::{GenericDefinition, ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::lookup::Lookup;
use crate::options::{ContainerOptions, LookupEngine, ResolutionMode};
use crate::pool::ObjectPool;
use crate::provider::{Provider, ProviderRegistry};
use crate::registry::{Registry, ServiceDescriptor, typed_decorator};
use crate::resolver_lookup::ResolverLookup;
use crate::scope::Scope;

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] from registrations.
///
/// Registration never fails on the spot: duplicates and malformed
/// registrations are reported by [`build()`](ContainerBuilder::build),
/// which returns the first problem found.
///
/// # Examples
/// ```rust,ignore
/// let container = Container::builder()
///     .strict_di(true)
///     .singleton_value(Config::load())
///     .singleton_with::<Database>(|injector| { ... })
///     .transient_with::<UserService>(|injector| { ... })
///     .build()?;
/// ```
pub struct ContainerBuilder {
    options: ContainerOptions,
    compiler: Arc<dyn Compiler>,
    descriptors: Vec<ServiceDescriptor>,
    decorations: Vec<(ServiceKey, DecoratorFn)>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            options: ContainerOptions::default(),
            compiler: Arc::new(Interpreter),
            descriptors: Vec::new(),
            decorations: Vec::new(),
        }
    }

    // ── Options ──

    /// Replaces all options at once.
    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    /// Reject requests from longer-lived services for shorter-lived ones.
    pub fn strict_di(mut self, strict: bool) -> Self {
        self.options.strict_di = strict;
        self
    }

    pub fn resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.options.resolution_mode = mode;
        self
    }

    pub fn engine(mut self, engine: LookupEngine) -> Self {
        self.options.engine = engine;
        self
    }

    /// Swaps the factory compiler. Defaults to [`Interpreter`].
    pub fn compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    // ── Instances ──

    /// Registers a value built outside the container.
    pub fn singleton_value<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.instance(Arc::new(value))
    }

    /// Registers a shared value, possibly a trait object.
    pub fn instance<I: ?Sized + Send + Sync + 'static>(self, value: Arc<I>) -> Self {
        self.register(ServiceDescriptor::instance(value))
    }

    // ── Factories ──

    /// Called once per container, on first request.
    pub fn singleton_with<I: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::singleton(factory))
    }

    /// Called once per scope.
    pub fn scoped_with<I: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::scoped(factory))
    }

    /// Called on every request.
    pub fn transient_with<I: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::transient(factory))
    }

    /// One pool checkout per scope; items are reused across scopes.
    pub fn pooled_with<I: ?Sized + Send + Sync + 'static>(
        self,
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::pooled(factory))
    }

    /// Computed from the requesting scope on every request.
    pub fn contextual<I: ?Sized + Send + Sync + 'static>(
        self,
        context: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::contextual(context))
    }

    /// Open generic registration; see [`ServiceDescriptor::generic`].
    pub fn generic(
        self,
        definition: GenericDefinition,
        lifetime: Lifetime,
        specializer: impl Fn(&[ServiceType]) -> Result<Specialization> + Send + Sync + 'static,
    ) -> Self {
        self.register(ServiceDescriptor::generic(definition, lifetime, specializer))
    }

    /// Registers an explicit descriptor.
    pub fn register(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    // ── Decorators ──

    /// Wraps the service registered for `I`. Decorators apply in
    /// registration order, the last one outermost.
    pub fn decorate<I: ?Sized + Send + Sync + 'static>(
        self,
        decorator: impl Fn(&dyn Injector, Arc<I>) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.decorate_key(ServiceKey::of::<I>(), typed_decorator(decorator))
    }

    /// Untyped form of [`decorate`](Self::decorate); also accepts open
    /// generic keys, decorating every specialization.
    pub fn decorate_key(mut self, key: ServiceKey, decorator: DecoratorFn) -> Self {
        self.decorations.push((key, decorator));
        self
    }

    // ── Provider modules ──

    /// Add a [`Provider`] module.
    pub fn add_provider(mut self, provider: &dyn Provider) -> Self {
        debug!(provider = provider.name(), "Adding provider");
        provider.register(&mut self);
        self
    }

    // ── Build ──

    /// Builds the container.
    ///
    /// In [`ResolutionMode::Aot`] every registration is built and
    /// validated here: missing dependencies, cycles and strict-DI
    /// violations among declared dependencies fail the build. In
    /// [`ResolutionMode::Jit`] the same checks run on first request.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        self.build_inner(None)
    }

    /// Like [`build`](Self::build), aborting with
    /// [`KhazinError::Cancelled`] once `cancel` is raised.
    #[instrument(skip(self, cancel), name = "container_build")]
    pub fn build_with_cancellation(self, cancel: &CancellationFlag) -> Result<Container> {
        self.build_inner(Some(cancel))
    }

    fn build_inner(self, cancel: Option<&CancellationFlag>) -> Result<Container> {
        let Self {
            options,
            compiler,
            mut descriptors,
            decorations,
        } = self;
        info!(
            registered = descriptors.len(),
            mode = ?options.resolution_mode,
            strict = options.strict_di,
            "Building container"
        );
        if let Some(cancel) = cancel {
            cancel.check()?;
        }

        for (key, decorator) in decorations {
            let descriptor = descriptors
                .iter_mut()
                .find(|descriptor| descriptor.key() == &key)
                .ok_or_else(|| {
                    KhazinError::invalid(&key, "cannot decorate a service that is not registered")
                })?;
            descriptor.decorators.push(decorator);
        }

        let scope_key = ServiceKey::of::<Scope>();
        if !descriptors.iter().any(|descriptor| descriptor.key() == &scope_key) {
            descriptors.push(ServiceDescriptor::contextual::<Scope>(|injector| {
                injector.scope().map(Arc::new).ok_or_else(|| {
                    KhazinError::invalid(&ServiceKey::of::<Scope>(), "injector is not backed by a scope")
                })
            }));
        }

        let mut registry = Registry::new(options.engine, options.tree_threshold);
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }

        let mode = options.resolution_mode;
        let lookup = Arc::new(ResolverLookup::new(registry.seal(), options, compiler));
        if mode == ResolutionMode::Aot {
            lookup.prepare_all(cancel)?;
        }

        info!(lookup = ?lookup, "Container built successfully");
        Ok(Container {
            root: Scope::root_of(lookup),
        })
    }
}

impl ProviderRegistry for ContainerBuilder {
    fn register(&mut self, descriptor: ServiceDescriptor) {
        self.descriptors.push(descriptor);
    }

    fn decorate(&mut self, key: ServiceKey, decorator: DecoratorFn) {
        self.decorations.push((key, decorator));
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// The root of a scope tree.
///
/// Created by [`ContainerBuilder::build()`]. Resolves like any scope and
/// additionally caches singletons and owns the object pools. Dropping the
/// container disposes it; child scopes then fail to resolve singletons.
pub struct Container {
    root: Scope,
}

impl Container {
    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// The root scope. Clones of it keep the container alive.
    pub fn root(&self) -> &Scope {
        &self.root
    }

    pub fn options(&self) -> &ContainerOptions {
        self.root.lookup().options()
    }

    /// The entry registered for `key`, without building it. Constructed
    /// generic keys are specialized.
    pub fn entry(&self, key: &ServiceKey) -> Result<Option<Arc<ServiceEntry>>> {
        self.root.lookup().find_entry(key)
    }

    /// Snapshot of all closed entries known so far.
    pub fn entries(&self) -> Arc<Lookup<Arc<ServiceEntry>>> {
        self.root.lookup().entries()
    }

    pub fn pool(&self, name: &str) -> Option<Arc<ObjectPool>> {
        self.root.lookup().pools().get(name)
    }

    /// Disposes the root scope: singletons and root-owned objects are
    /// released and the pools closed.
    pub fn dispose(&self) {
        self.root.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_disposed()
    }
}

impl Injector for Container {
    fn get(&self, key: &ServiceKey) -> Result<Instance> {
        self.root.get(key)
    }

    fn try_get(&self, key: &ServiceKey) -> Result<Option<Instance>> {
        self.root.try_get(key)
    }

    fn create_scope(&self, tag: Option<&str>) -> Result<Scope> {
        self.root.create_scope(tag)
    }

    fn scope(&self) -> Option<Scope> {
        Some(self.root.downgrade())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.entries().len())
            .field("root", &self.root)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::entry::{Arguments, Specialization};
    pub use crate::error::{KhazinError, Result};
    pub use crate::graph::CancellationFlag;
    pub use crate::injector::{Injector, InjectorExt};
    pub use crate::instance::{Disposable, Instance};
    pub use crate::key::{GenericDefinition, ServiceKey, ServiceType};
    pub use crate::lifetime::Lifetime;
    pub use crate::options::{ContainerOptions, LookupEngine, ResolutionMode};
    pub use crate::provider::{Provider, ProviderRegistry};
    pub use crate::registry::ServiceDescriptor;
    pub use crate::scope::Scope;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

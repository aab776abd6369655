//! Service registry: collects registrations before the container is sealed.
//!
//! A [`ServiceDescriptor`] states explicitly how a service is produced,
//! what it depends on and how long it lives. The [`Registry`] turns
//! descriptors into [`ServiceEntry`]s, rejects duplicates and assigns slots.

use std::any::type_name;
use std::sync::Arc;

use tracing::debug;

use crate::entry::{
    Arguments, Construction, DecoratorFn, FactoryFn, ServiceEntry, Specialization,
};
use crate::error::{AlreadyRegisteredError, KhazinError, Result};
use crate::injector::Injector;
use crate::instance::{Disposable, DisposeHook, Instance, dispose_hook};
use crate::key::{GenericDefinition, ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::lookup::Lookup;
use crate::options::LookupEngine;

/// Explicit description of one service registration.
///
/// # Examples
/// ```
/// use khazin_container::registry::ServiceDescriptor;
/// use khazin_container::key::ServiceKey;
/// use std::sync::Arc;
///
/// struct Clock;
/// struct Scheduler { clock: Arc<Clock> }
///
/// let clock = ServiceDescriptor::singleton::<Clock>(|_| Ok(Arc::new(Clock)));
/// let scheduler = ServiceDescriptor::activated::<Scheduler>(
///     khazin_container::lifetime::Lifetime::Scoped,
///     [ServiceKey::of::<Clock>()],
///     |args| Ok(Arc::new(Scheduler { clock: args.get(0)? })),
/// );
/// assert_eq!(scheduler.key(), &ServiceKey::of::<Scheduler>());
/// # let _ = clock;
/// ```
pub struct ServiceDescriptor {
    pub(crate) key: ServiceKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) implementation: Option<ServiceType>,
    pub(crate) construction: Construction,
    pub(crate) dependencies: Vec<ServiceKey>,
    pub(crate) decorators: Vec<DecoratorFn>,
    pub(crate) dispose_hook: Option<DisposeHook>,
    pub(crate) pool_name: Option<String>,
}

fn typed_factory<I, F>(factory: F) -> FactoryFn
where
    I: ?Sized + Send + Sync + 'static,
    F: Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
{
    Arc::new(move |injector: &dyn Injector, _: &ServiceType| factory(injector).map(Instance::new))
}

pub(crate) fn typed_decorator<I, F>(decorator: F) -> DecoratorFn
where
    I: ?Sized + Send + Sync + 'static,
    F: Fn(&dyn Injector, Arc<I>) -> Result<Arc<I>> + Send + Sync + 'static,
{
    Arc::new(
        move |injector: &dyn Injector, requested: &ServiceType, instance: Instance| {
            let typed = instance.downcast::<I>().ok_or_else(|| KhazinError::TypeMismatch {
                key: ServiceKey::new(requested.clone(), None),
                expected: type_name::<I>(),
                found: instance.type_name(),
            })?;
            decorator(injector, typed).map(Instance::new)
        },
    )
}

impl ServiceDescriptor {
    /// Registration from raw parts.
    pub fn new(key: ServiceKey, lifetime: Lifetime, construction: Construction) -> Self {
        Self {
            key,
            lifetime,
            implementation: None,
            construction,
            dependencies: Vec::new(),
            decorators: Vec::new(),
            dispose_hook: None,
            pool_name: None,
        }
    }

    /// Opaque factory producing `I` with the given lifetime.
    pub fn factory<I>(
        lifetime: Lifetime,
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        Self::new(
            ServiceKey::of::<I>(),
            lifetime,
            Construction::Factory(typed_factory(factory)),
        )
    }

    pub fn transient<I: ?Sized + Send + Sync + 'static>(
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        Self::factory(Lifetime::Transient, factory)
    }

    pub fn scoped<I: ?Sized + Send + Sync + 'static>(
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        Self::factory(Lifetime::Scoped, factory)
    }

    pub fn singleton<I: ?Sized + Send + Sync + 'static>(
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        Self::factory(Lifetime::Singleton, factory)
    }

    pub fn pooled<I: ?Sized + Send + Sync + 'static>(
        factory: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        Self::factory(Lifetime::Pooled, factory)
    }

    /// Constructor-style registration: `activator` receives the declared
    /// dependencies, resolved in order.
    pub fn activated<I: ?Sized + Send + Sync + 'static>(
        lifetime: Lifetime,
        dependencies: impl IntoIterator<Item = ServiceKey>,
        activator: impl Fn(&Arguments) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        let mut descriptor = Self::new(
            ServiceKey::of::<I>(),
            lifetime,
            Construction::Constructor(Arc::new(move |args: &Arguments| {
                activator(args).map(Instance::new)
            })),
        );
        descriptor.dependencies = dependencies.into_iter().collect();
        descriptor
    }

    /// A value built outside the container.
    pub fn instance<I: ?Sized + Send + Sync + 'static>(value: Arc<I>) -> Self {
        Self::new(
            ServiceKey::of::<I>(),
            Lifetime::Instance,
            Construction::Value(Instance::new(value)),
        )
    }

    /// Computed from the requesting scope on every request.
    pub fn contextual<I: ?Sized + Send + Sync + 'static>(
        context: impl Fn(&dyn Injector) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            ServiceKey::of::<I>(),
            Lifetime::Contextual,
            Construction::Context(Arc::new(move |injector: &dyn Injector| {
                context(injector).map(Instance::new)
            })),
        )
    }

    /// Open generic registration, specialized on first request of each
    /// constructed type.
    pub fn generic(
        definition: GenericDefinition,
        lifetime: Lifetime,
        specializer: impl Fn(&[ServiceType]) -> Result<Specialization> + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            ServiceKey::new(definition.open(), None),
            lifetime,
            Construction::Generic(Arc::new(specializer)),
        )
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.key = self.key.with_name(Some(name));
        self
    }

    /// Declares a dependency, used for graph validation (and for activation
    /// of constructor-style registrations).
    pub fn depends_on(mut self, key: ServiceKey) -> Self {
        self.dependencies.push(key);
        self
    }

    pub fn implemented_by<T: ?Sized + 'static>(mut self) -> Self {
        self.implementation = Some(ServiceType::of::<T>());
        self
    }

    /// Wraps the produced instance. Decorators apply in registration order,
    /// the last one outermost.
    pub fn decorate<I: ?Sized + Send + Sync + 'static>(
        self,
        decorator: impl Fn(&dyn Injector, Arc<I>) -> Result<Arc<I>> + Send + Sync + 'static,
    ) -> Self {
        self.decorate_with(typed_decorator(decorator))
    }

    /// Untyped form of [`decorate`](Self::decorate).
    pub fn decorate_with(mut self, decorator: DecoratorFn) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Captured instances are released through [`Disposable::dispose`].
    pub fn disposable<T: Disposable + 'static>(mut self) -> Self {
        self.dispose_hook = Some(dispose_hook::<T>());
        self
    }

    /// Captured instances are released by `release`.
    pub fn on_dispose<I: ?Sized + Send + Sync + 'static>(
        mut self,
        release: impl Fn(&I) + Send + Sync + 'static,
    ) -> Self {
        self.dispose_hook = Some(Arc::new(move |instance: &Instance| {
            if let Some(service) = instance.downcast::<I>() {
                release(&service);
            }
        }));
        self
    }

    /// Name of the object pool a pooled service draws from.
    pub fn pool(mut self, name: impl Into<String>) -> Self {
        self.pool_name = Some(name.into());
        self
    }

    #[inline]
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Everything the registry hands over when the container is sealed.
pub(crate) struct SealedRegistry {
    pub entries: Lookup<Arc<ServiceEntry>>,
    pub generics: Lookup<Arc<ServiceEntry>>,
    /// Closed entries in registration order.
    pub order: Vec<Arc<ServiceEntry>>,
    pub slot_count: usize,
}

/// Stores all registrations of a container under construction.
#[derive(Debug)]
pub(crate) struct Registry {
    entries: Lookup<Arc<ServiceEntry>>,
    generics: Lookup<Arc<ServiceEntry>>,
    order: Vec<Arc<ServiceEntry>>,
    next_slot: usize,
}

impl Registry {
    pub fn new(engine: LookupEngine, threshold: usize) -> Self {
        Self {
            entries: Lookup::new(engine, threshold),
            generics: Lookup::new(engine, threshold),
            order: Vec::new(),
            next_slot: 0,
        }
    }

    /// Registers one descriptor.
    ///
    /// # Errors
    /// [`KhazinError::AlreadyRegistered`] for a duplicate key,
    /// [`KhazinError::InvalidRegistration`] for a malformed descriptor.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        let key = descriptor.key.clone();
        let generic = matches!(descriptor.construction, Construction::Generic(_));

        let target = if generic { &self.generics } else { &self.entries };
        if target.contains_key(&key) {
            return Err(KhazinError::AlreadyRegistered(AlreadyRegisteredError { key }));
        }

        let slot = (descriptor.lifetime.uses_slot() && !generic).then_some(self.next_slot);
        let entry = Arc::new(ServiceEntry::new(descriptor, slot)?);
        if slot.is_some() {
            self.next_slot += 1;
        }

        debug!(key = %key, lifetime = %entry.lifetime(), slot = ?slot, "Registered service");

        if generic {
            self.generics.try_add(key, entry);
        } else {
            self.entries.try_add(key, entry.clone());
            self.order.push(entry);
        }
        Ok(())
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.entries.contains_key(key) || self.generics.contains_key(key)
    }

    /// Number of registrations, open generics included.
    pub fn len(&self) -> usize {
        self.entries.len() + self.generics.len()
    }

    pub fn seal(self) -> SealedRegistry {
        SealedRegistry {
            entries: self.entries,
            generics: self.generics,
            order: self.order,
            slot_count: self.next_slot,
        }
    }
}

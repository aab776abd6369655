//! Service entries: the registration records the engine works on.
//!
//! A [`ServiceEntry`] is created once per registration (or per
//! specialization of an open generic registration) and shared by every
//! scope of the container. Apart from its monotonic [`EntryState`] and its
//! lazily compiled factory it never changes after creation.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::compiler::{Compiler, FactoryPlan};
use crate::error::{KhazinError, Result};
use crate::injector::Injector;
use crate::instance::{DisposeHook, Instance};
use crate::key::{ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::registry::ServiceDescriptor;

bitflags! {
    /// What an entry is able to do. Fixed at creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u8 {
        /// At most one instance per owning scope.
        const CREATE_SINGLE_INSTANCE = 1 << 0;
        /// Resolution is served by the root scope (or needs no scope at all).
        const SHARED = 1 << 1;
        /// Has a factory that must be compiled before first use.
        const SUPPORTS_BUILD = 1 << 2;
        /// Factory may be wrapped by decorators.
        const SUPPORTS_ASPECTS = 1 << 3;
        /// Instances come from an object pool.
        const SUPPORTS_POOLING = 1 << 4;
    }
}

bitflags! {
    /// Progress of an entry. Flags are only ever added.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntryState: u8 {
        const BUILT = 1 << 0;
        const VALIDATED = 1 << 1;
        const INSTANTIATED = 1 << 2;
    }
}

/// Produces an instance for the requested type, resolving dependencies
/// through the requesting scope.
pub type FactoryFn = Arc<dyn Fn(&dyn Injector, &ServiceType) -> Result<Instance> + Send + Sync>;

/// Builds an instance from already-resolved dependencies.
pub type ActivatorFn = Arc<dyn Fn(&Arguments) -> Result<Instance> + Send + Sync>;

/// Computes an instance from the requesting scope itself.
pub type ContextFn = Arc<dyn Fn(&dyn Injector) -> Result<Instance> + Send + Sync>;

/// Wraps an instance produced by the inner factory.
pub type DecoratorFn =
    Arc<dyn Fn(&dyn Injector, &ServiceType, Instance) -> Result<Instance> + Send + Sync>;

/// Turns type arguments into a closed construction strategy.
pub type SpecializerFn = Arc<dyn Fn(&[ServiceType]) -> Result<Specialization> + Send + Sync>;

/// How an entry obtains its instance. Exactly one strategy per entry.
#[derive(Clone)]
pub enum Construction {
    /// An opaque factory; dependencies are discovered while it runs.
    Factory(FactoryFn),
    /// An activator fed with the entry's declared dependencies, in order.
    Constructor(ActivatorFn),
    /// A value built outside the container.
    Value(Instance),
    /// Computed from the requesting scope.
    Context(ContextFn),
    /// An open generic registration.
    Generic(SpecializerFn),
}

impl Construction {
    fn describe(&self) -> &'static str {
        match self {
            Construction::Factory(_) => "factory",
            Construction::Constructor(_) => "constructor",
            Construction::Value(_) => "value",
            Construction::Context(_) => "context",
            Construction::Generic(_) => "generic",
        }
    }
}

/// What a specializer returns for one set of type arguments.
pub struct Specialization {
    pub(crate) construction: Construction,
    pub(crate) dependencies: Vec<ServiceKey>,
    pub(crate) implementation: Option<ServiceType>,
}

impl Specialization {
    /// The closed service is produced by `factory`.
    pub fn factory(
        factory: impl Fn(&dyn Injector, &ServiceType) -> Result<Instance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            construction: Construction::Factory(Arc::new(factory)),
            dependencies: Vec::new(),
            implementation: None,
        }
    }

    /// The closed service is activated from `dependencies`.
    pub fn activated(
        dependencies: impl IntoIterator<Item = ServiceKey>,
        activator: impl Fn(&Arguments) -> Result<Instance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            construction: Construction::Constructor(Arc::new(activator)),
            dependencies: dependencies.into_iter().collect(),
            implementation: None,
        }
    }

    /// Declares a dependency of a factory-based specialization.
    pub fn depends_on(mut self, key: ServiceKey) -> Self {
        self.dependencies.push(key);
        self
    }

    pub fn implemented_by(mut self, implementation: ServiceType) -> Self {
        self.implementation = Some(implementation);
        self
    }
}

/// Resolved dependencies handed to an activator.
pub struct Arguments {
    requestor: ServiceKey,
    requested: ServiceType,
    dependencies: Vec<ServiceKey>,
    values: Vec<Instance>,
}

impl Arguments {
    pub(crate) fn new(
        requestor: ServiceKey,
        requested: ServiceType,
        dependencies: Vec<ServiceKey>,
        values: Vec<Instance>,
    ) -> Self {
        Self {
            requestor,
            requested,
            dependencies,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The type being activated (a constructed type for generic entries).
    pub fn requested(&self) -> &ServiceType {
        &self.requested
    }

    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.values.get(index)
    }

    /// The dependency at `index`, downcast to `I`.
    pub fn get<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<I>> {
        let instance = self.values.get(index).ok_or_else(|| {
            KhazinError::invalid(
                &self.requestor,
                format!(
                    "activator read argument {index} but only {} dependencies are declared",
                    self.values.len()
                ),
            )
        })?;

        instance.downcast::<I>().ok_or_else(|| KhazinError::TypeMismatch {
            key: self.dependencies[index].clone(),
            expected: type_name::<I>(),
            found: instance.type_name(),
        })
    }
}

/// A registration record shared by all scopes of a container.
pub struct ServiceEntry {
    key: ServiceKey,
    lifetime: Lifetime,
    implementation: Option<ServiceType>,
    construction: Construction,
    dependencies: Vec<ServiceKey>,
    decorators: Vec<DecoratorFn>,
    dispose_hook: Option<DisposeHook>,
    pool_name: Option<String>,
    features: Features,
    state: AtomicU8,
    slot: Option<usize>,
    factory: OnceCell<FactoryFn>,
}

impl ServiceEntry {
    /// Validates a descriptor and turns it into an entry.
    ///
    /// `slot` must be assigned for slot-using lifetimes of closed entries.
    pub(crate) fn new(descriptor: ServiceDescriptor, slot: Option<usize>) -> Result<Self> {
        let ServiceDescriptor {
            key,
            lifetime,
            implementation,
            construction,
            dependencies,
            decorators,
            dispose_hook,
            pool_name,
        } = descriptor;

        let generic = matches!(construction, Construction::Generic(_));
        let fits = match &construction {
            Construction::Factory(_) | Construction::Constructor(_) | Construction::Generic(_) => {
                lifetime.is_built()
            }
            Construction::Value(_) => lifetime == Lifetime::Instance,
            Construction::Context(_) => lifetime == Lifetime::Contextual,
        };
        if !fits {
            return Err(KhazinError::invalid(
                &key,
                format!(
                    "a {} registration cannot have the {lifetime} lifetime",
                    construction.describe()
                ),
            ));
        }
        if generic != key.ty().is_open() {
            return Err(KhazinError::invalid(
                &key,
                if generic {
                    "open generic registrations must be keyed by an open type"
                } else {
                    "an open type can only be registered with a specializer"
                },
            ));
        }
        if let Some(implementation) = &implementation {
            if implementation.is_open() && !generic {
                return Err(KhazinError::invalid(
                    &key,
                    format!("implementation {implementation} is an open type"),
                ));
            }
        }
        if !dependencies.is_empty()
            && matches!(construction, Construction::Value(_) | Construction::Context(_))
        {
            return Err(KhazinError::invalid(
                &key,
                "pre-built and contextual services cannot declare dependencies",
            ));
        }

        let features = lifetime.features();
        if !decorators.is_empty() && !features.contains(Features::SUPPORTS_ASPECTS) {
            return Err(KhazinError::invalid(
                &key,
                format!("{lifetime} services cannot be decorated"),
            ));
        }
        if pool_name.is_some() && lifetime != Lifetime::Pooled {
            return Err(KhazinError::invalid(&key, "only pooled services have a pool name"));
        }

        debug_assert_eq!(
            slot.is_some(),
            lifetime.uses_slot() && !generic,
            "slot assignment out of sync with lifetime"
        );

        let state = if lifetime.is_built() {
            EntryState::empty()
        } else {
            EntryState::BUILT | EntryState::VALIDATED
        };

        Ok(Self {
            key,
            lifetime,
            implementation,
            construction,
            dependencies,
            decorators,
            dispose_hook,
            pool_name,
            features,
            state: AtomicU8::new(state.bits()),
            slot,
            factory: OnceCell::new(),
        })
    }

    #[inline]
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    #[inline]
    pub fn implementation(&self) -> Option<&ServiceType> {
        self.implementation.as_ref()
    }

    #[inline]
    pub fn dependencies(&self) -> &[ServiceKey] {
        &self.dependencies
    }

    #[inline]
    pub fn features(&self) -> Features {
        self.features
    }

    #[inline]
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    #[inline]
    pub fn is_generic(&self) -> bool {
        matches!(self.construction, Construction::Generic(_))
    }

    pub fn state(&self) -> EntryState {
        EntryState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    /// Adds `flags` to the state. Idempotent and safe under races.
    pub(crate) fn mark(&self, flags: EntryState) {
        self.state.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn pool_name(&self) -> String {
        self.pool_name.clone().unwrap_or_else(|| self.key.to_string())
    }

    pub(crate) fn dispose_hook(&self) -> Option<&DisposeHook> {
        self.dispose_hook.as_ref()
    }

    pub(crate) fn value(&self) -> Option<&Instance> {
        match &self.construction {
            Construction::Value(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn context(&self) -> Option<&ContextFn> {
        match &self.construction {
            Construction::Context(context) => Some(context),
            _ => None,
        }
    }

    /// The compiled factory, once [`compile`](Self::compile) has run.
    pub(crate) fn factory(&self) -> Option<&FactoryFn> {
        self.factory.get()
    }

    /// Compiles the factory plan at most once, even under concurrent calls.
    pub(crate) fn compile(&self, compiler: &dyn Compiler) -> Result<&FactoryFn> {
        self.factory.get_or_try_init(|| {
            let plan = self.plan().ok_or_else(|| {
                KhazinError::invalid(&self.key, "entry has nothing to compile")
            })?;
            Ok(compiler.compile(plan))
        })
    }

    fn plan(&self) -> Option<FactoryPlan> {
        let base = match &self.construction {
            Construction::Factory(factory) => FactoryPlan::Invoke(factory.clone()),
            Construction::Constructor(activator) => FactoryPlan::Activate {
                requestor: self.key.clone(),
                dependencies: self.dependencies.clone(),
                activator: activator.clone(),
            },
            _ => return None,
        };
        Some(self.decorators.iter().fold(base, |inner, decorator| FactoryPlan::Decorate {
            inner: Box::new(inner),
            decorator: decorator.clone(),
        }))
    }

    /// Produces the closed entry for `ty`, a constructed type of this open
    /// entry's definition.
    pub(crate) fn specialize(&self, ty: &ServiceType, slot: Option<usize>) -> Result<ServiceEntry> {
        let Construction::Generic(specializer) = &self.construction else {
            unreachable!("specialize called on closed entry {}", self.key)
        };
        debug_assert_eq!(ty.definition(), self.key.ty().definition());

        let specialization = specializer(ty.arguments())?;
        if matches!(specialization.construction, Construction::Generic(_)) {
            return Err(KhazinError::invalid(
                &self.key,
                format!("specializer returned another generic for {ty}"),
            ));
        }

        let descriptor = ServiceDescriptor {
            key: ServiceKey::new(ty.clone(), self.key.name()),
            lifetime: self.lifetime,
            implementation: specialization.implementation,
            construction: specialization.construction,
            dependencies: specialization.dependencies,
            decorators: self.decorators.clone(),
            dispose_hook: self.dispose_hook.clone(),
            pool_name: self.pool_name.as_ref().map(|name| format!("{name}/{ty}")),
        };
        ServiceEntry::new(descriptor, slot)
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("construction", &self.construction.describe())
            .field("dependencies", &self.dependencies)
            .field("state", &self.state())
            .field("slot", &self.slot)
            .finish()
    }
}

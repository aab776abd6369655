//! Service identification.
//!
//! [`ServiceType`] models a type identity that may also be a generic
//! definition (open) or a generic definition applied to type arguments
//! (constructed). [`ServiceKey`] pairs a [`ServiceType`] with an optional
//! name; two registrations are the same service iff both parts match.

use std::any::{TypeId, type_name};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifies a generic service definition such as `Repository<_>`.
///
/// Rust has no runtime generic definitions, so a definition is named by a
/// marker type chosen by the registrant.
///
/// ```
/// use khazin_container::key::{GenericDefinition, ServiceType};
///
/// struct Repository;
/// let repo = GenericDefinition::of::<Repository>();
/// let of_u32 = repo.construct([ServiceType::of::<u32>()]);
/// assert!(of_u32.is_constructed());
/// assert_eq!(of_u32.definition(), Some(repo));
/// ```
#[derive(Clone, Copy)]
pub struct GenericDefinition {
    marker: TypeId,
    name: &'static str,
}

impl GenericDefinition {
    #[inline]
    pub fn of<M: ?Sized + 'static>() -> Self {
        Self {
            marker: TypeId::of::<M>(),
            name: type_name::<M>(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The open (uninstantiable) type for this definition.
    #[inline]
    pub fn open(self) -> ServiceType {
        ServiceType::Open(self)
    }

    /// Applies the definition to concrete type arguments.
    pub fn construct(self, arguments: impl IntoIterator<Item = ServiceType>) -> ServiceType {
        ServiceType::Constructed {
            definition: self,
            arguments: arguments.into_iter().collect(),
        }
    }
}

impl PartialEq for GenericDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.marker == other.marker
    }
}

impl Eq for GenericDefinition {}

impl Hash for GenericDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.marker.hash(state);
    }
}

impl PartialOrd for GenericDefinition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GenericDefinition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.marker.cmp(&other.marker)
    }
}

impl fmt::Debug for GenericDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericDefinition({})", self.name)
    }
}

/// The type half of a [`ServiceKey`].
#[derive(Clone)]
pub enum ServiceType {
    /// An ordinary Rust type (including `dyn Trait`).
    Concrete { id: TypeId, name: &'static str },
    /// A generic definition without arguments. Never instantiable.
    Open(GenericDefinition),
    /// A generic definition applied to type arguments.
    Constructed {
        definition: GenericDefinition,
        arguments: Arc<[ServiceType]>,
    },
}

impl ServiceType {
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceType::Concrete {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, ServiceType::Open(_))
    }

    #[inline]
    pub fn is_constructed(&self) -> bool {
        matches!(self, ServiceType::Constructed { .. })
    }

    /// The generic definition behind an open or constructed type.
    pub fn definition(&self) -> Option<GenericDefinition> {
        match self {
            ServiceType::Concrete { .. } => None,
            ServiceType::Open(definition) | ServiceType::Constructed { definition, .. } => {
                Some(*definition)
            }
        }
    }

    /// Type arguments of a constructed type; empty otherwise.
    pub fn arguments(&self) -> &[ServiceType] {
        match self {
            ServiceType::Constructed { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// Returns `true` when this type is `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        matches!(self, ServiceType::Concrete { id, .. } if *id == TypeId::of::<T>())
    }

    fn rank(&self) -> u8 {
        match self {
            ServiceType::Concrete { .. } => 0,
            ServiceType::Open(_) => 1,
            ServiceType::Constructed { .. } => 2,
        }
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServiceType::Concrete { id: a, .. }, ServiceType::Concrete { id: b, .. }) => a == b,
            (ServiceType::Open(a), ServiceType::Open(b)) => a == b,
            (
                ServiceType::Constructed { definition: da, arguments: aa },
                ServiceType::Constructed { definition: db, arguments: ab },
            ) => da == db && aa == ab,
            _ => false,
        }
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            ServiceType::Concrete { id, .. } => id.hash(state),
            ServiceType::Open(definition) => definition.hash(state),
            ServiceType::Constructed { definition, arguments } => {
                definition.hash(state);
                arguments.hash(state);
            }
        }
    }
}

impl PartialOrd for ServiceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceType {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ServiceType::Concrete { id: a, .. }, ServiceType::Concrete { id: b, .. }) => a.cmp(b),
            (ServiceType::Open(a), ServiceType::Open(b)) => a.cmp(b),
            (
                ServiceType::Constructed { definition: da, arguments: aa },
                ServiceType::Constructed { definition: db, arguments: ab },
            ) => da.cmp(db).then_with(|| aa.iter().cmp(ab.iter())),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Concrete { name, .. } => f.write_str(name),
            ServiceType::Open(definition) => write!(f, "{}<_>", definition.name),
            ServiceType::Constructed { definition, arguments } => {
                write!(f, "{}<", definition.name)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
        }
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({self})")
    }
}

/// Uniquely identifies a service registration.
///
/// # Examples
/// ```
/// use khazin_container::key::ServiceKey;
///
/// let key = ServiceKey::of::<String>();
/// assert_eq!(key.name(), None);
///
/// let primary = ServiceKey::named::<String>("primary_db");
/// let replica = ServiceKey::named::<String>("replica_db");
/// assert_ne!(primary, replica);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    ty: ServiceType,
    name: Option<&'static str>,
}

impl ServiceKey {
    #[inline]
    pub fn new(ty: ServiceType, name: Option<&'static str>) -> Self {
        Self { ty, name }
    }

    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(ServiceType::of::<T>(), None)
    }

    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self::new(ServiceType::of::<T>(), Some(name))
    }

    #[inline]
    pub fn ty(&self) -> &ServiceType {
        &self.ty
    }

    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Same key with a different name.
    pub fn with_name(&self, name: Option<&'static str>) -> Self {
        Self::new(self.ty.clone(), name)
    }

    /// For a constructed generic key, the key its open registration lives under.
    pub fn open_counterpart(&self) -> Option<ServiceKey> {
        match &self.ty {
            ServiceType::Constructed { definition, .. } => {
                Some(ServiceKey::new(definition.open(), self.name))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "ServiceKey({}, name={:?})", self.ty, name),
            None => write!(f, "ServiceKey({})", self.ty),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} (name={:?})", self.ty, name),
            None => write!(f, "{}", self.ty),
        }
    }
}

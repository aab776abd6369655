//! Resolution scopes.
//!
//! A scope owns the instances it caches (one slot per scoped or pooled
//! entry) and the disposables it created. Every container has one root
//! scope, which also caches singletons; child scopes created from it share
//! its registrations and refer back to it weakly.
//!
//! ```text
//! Container (root scope) ── singletons, pools
//!    ├── Scope "request-1" ── scoped, pooled checkouts, transients
//!    └── Scope "request-2"
//! ```
//!
//! Disposing a scope releases its captured objects in reverse creation
//! order, exactly once. The last owning handle to a scope going away
//! disposes it. Handles obtained from inside the container (the `Scope`
//! service, [`Injector::scope`]) do not own the scope, so services may keep
//! them without keeping the scope alive. Disposing the root invalidates
//! every child scope.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::entry::{EntryState, FactoryFn, ServiceEntry};
use crate::error::{KhazinError, NotRegisteredError, Result};
use crate::injector::Injector;
use crate::instance::{DisposeHook, Instance};
use crate::key::ServiceKey;
use crate::path::{self, PathOwner};
use crate::pool::ObjectPool;
use crate::resolver_lookup::ResolverLookup;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// Something a scope must release when it is disposed.
enum Captured {
    Disposable { instance: Instance, hook: DisposeHook },
    Checkout { instance: Instance, pool: Arc<ObjectPool> },
}

impl Captured {
    fn release(self) {
        match self {
            Captured::Disposable { instance, hook } => hook(&instance),
            Captured::Checkout { instance, pool } => pool.give_back(instance),
        }
    }
}

type Slot = Arc<OnceCell<Instance>>;

pub(crate) struct ScopeState {
    id: u64,
    tag: Option<String>,
    lookup: Arc<ResolverLookup>,
    /// `None` for the root itself.
    root: Option<Weak<ScopeState>>,
    slots: RwLock<Vec<Slot>>,
    captured: Mutex<Vec<Captured>>,
    disposed: AtomicBool,
}

impl ScopeState {
    fn new(lookup: Arc<ResolverLookup>, root: Option<Weak<ScopeState>>, tag: Option<&str>) -> Self {
        let slot_count = lookup.slot_count();
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            tag: tag.map(str::to_owned),
            lookup,
            root,
            slots: RwLock::new((0..slot_count).map(|_| Slot::default()).collect()),
            captured: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let captured = std::mem::take(&mut *self.captured.lock());
        debug!(scope = %self, captured = captured.len(), "Disposing scope");

        for item in captured.into_iter().rev() {
            item.release();
        }
        self.slots.write().clear();

        if self.root.is_none() {
            self.lookup.pools().close_all();
        }
    }
}

/// Disposes the scope when the last owning handle is dropped.
struct Lease(Arc<ScopeState>);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.root.is_none() { "root" } else { "scope" };
        match &self.tag {
            Some(tag) => write!(f, "{kind} '{tag}' (#{})", self.id),
            None => write!(f, "{kind} #{}", self.id),
        }
    }
}

/// Handle to a resolution scope. Clones share the scope.
///
/// Handles returned by [`Container`](crate::Container) and
/// [`create_scope`](Injector::create_scope) own the scope: when the last of
/// them is dropped the scope is disposed. Handles resolved from the
/// container are borrowed and stop working once the scope is disposed.
///
/// # Examples
/// ```
/// use khazin_container::prelude::*;
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let container = Container::builder()
///     .scoped_with::<RequestId>(|_| Ok(Arc::new(RequestId(7))))
///     .build()
///     .unwrap();
///
/// let scope = container.create_scope(Some("request")).unwrap();
/// let a: Arc<RequestId> = scope.resolve().unwrap();
/// let b: Arc<RequestId> = scope.resolve().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// scope.dispose();
/// assert!(scope.resolve::<RequestId>().is_err());
/// ```
#[derive(Clone)]
pub struct Scope {
    state: Arc<ScopeState>,
    lease: Option<Arc<Lease>>,
}

impl Scope {
    fn owned(state: ScopeState) -> Self {
        let state = Arc::new(state);
        Self {
            lease: Some(Arc::new(Lease(state.clone()))),
            state,
        }
    }

    fn borrowed(state: Arc<ScopeState>) -> Self {
        Self { state, lease: None }
    }

    pub(crate) fn root_of(lookup: Arc<ResolverLookup>) -> Self {
        Self::owned(ScopeState::new(lookup, None, None))
    }

    /// A handle to the same scope that does not keep it from being disposed.
    pub fn downgrade(&self) -> Scope {
        Self::borrowed(self.state.clone())
    }

    /// Whether dropping this handle can dispose the scope.
    pub fn is_owning(&self) -> bool {
        self.lease.is_some()
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.state.tag.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.state.root.is_none()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Releases captured objects in reverse creation order and clears the
    /// slots. Idempotent. Disposing the root also closes the object pools.
    pub fn dispose(&self) {
        self.state.dispose();
    }

    /// Number of captured objects awaiting disposal.
    pub fn captured(&self) -> usize {
        self.state.captured.lock().len()
    }

    pub(crate) fn lookup(&self) -> &Arc<ResolverLookup> {
        &self.state.lookup
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.state.lookup.options().strict_di
    }

    pub(crate) fn path_owner(&self) -> PathOwner {
        PathOwner::Scope(self.state.id)
    }

    /// Fails once this scope or its root is disposed.
    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(KhazinError::Disposed {
                scope: self.state.to_string(),
            });
        }
        if let Some(root) = &self.state.root {
            let root_alive = root
                .upgrade()
                .is_some_and(|root| !root.disposed.load(Ordering::Acquire));
            if !root_alive {
                return Err(KhazinError::Disposed {
                    scope: "root".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The root scope singletons are cached in.
    ///
    /// # Errors
    /// [`KhazinError::Disposed`] when the root is gone or disposed.
    pub(crate) fn root(&self) -> Result<Scope> {
        let Some(root) = &self.state.root else {
            return Ok(self.downgrade());
        };
        let root = root.upgrade().map(Scope::borrowed).ok_or_else(|| {
            KhazinError::Disposed {
                scope: "root".to_string(),
            }
        })?;
        root.ensure_alive()?;
        Ok(root)
    }

    fn slot(&self, index: usize) -> Slot {
        if let Some(slot) = self.state.slots.read().get(index) {
            return slot.clone();
        }
        let mut slots = self.state.slots.write();
        if slots.len() <= index {
            let len = (index + 1).max(self.state.lookup.slot_count());
            slots.resize_with(len, Slot::default);
        }
        slots[index].clone()
    }

    fn capture(&self, item: Captured) {
        let mut captured = self.state.captured.lock();
        if self.is_disposed() {
            drop(captured);
            item.release();
            return;
        }
        captured.push(item);
    }

    /// Runs `factory` against this scope without taking ownership.
    fn produce(&self, entry: &ServiceEntry, factory: &FactoryFn) -> Result<Instance> {
        self.ensure_alive()?;
        let instance = factory(self, entry.key().ty())?;
        entry.mark(EntryState::INSTANTIATED);
        trace!(key = %entry.key(), scope = %self, "Created instance");
        Ok(instance)
    }

    /// Creates a new instance, captured by this scope when it is disposable.
    pub(crate) fn create_instance(&self, entry: &ServiceEntry, factory: &FactoryFn) -> Result<Instance> {
        let instance = self.produce(entry, factory)?;
        if let Some(hook) = entry.dispose_hook() {
            self.capture(Captured::Disposable {
                instance: instance.clone(),
                hook: hook.clone(),
            });
        }
        Ok(instance)
    }

    /// The instance cached in `slot`, created on first use.
    ///
    /// Concurrent first requests construct exactly once; the others wait.
    pub(crate) fn get_or_create_instance(
        &self,
        entry: &ServiceEntry,
        slot: usize,
        factory: &FactoryFn,
    ) -> Result<Instance> {
        self.ensure_alive()?;
        let cell = self.slot(slot);
        if let Some(instance) = cell.get() {
            return Ok(instance.clone());
        }
        cell.get_or_try_init(|| self.create_instance(entry, factory))
            .cloned()
    }

    /// Like [`get_or_create_instance`](Self::get_or_create_instance), but
    /// fills the slot from `pool`. The checkout goes back to the pool when
    /// this scope is disposed.
    pub(crate) fn get_or_checkout(
        &self,
        entry: &ServiceEntry,
        slot: usize,
        factory: &FactoryFn,
        pool: &Arc<ObjectPool>,
    ) -> Result<Instance> {
        self.ensure_alive()?;
        let cell = self.slot(slot);
        if let Some(instance) = cell.get() {
            return Ok(instance.clone());
        }
        cell.get_or_try_init(|| {
            let root = self.root()?;
            let instance = pool.checkout(|| root.produce(entry, factory))?;
            self.capture(Captured::Checkout {
                instance: instance.clone(),
                pool: pool.clone(),
            });
            Ok(instance)
        })
        .cloned()
    }

    fn not_registered(&self, key: &ServiceKey) -> KhazinError {
        KhazinError::NotRegistered(NotRegisteredError {
            requested: key.clone(),
            required_by: path::requestor(self.path_owner()),
            suggestions: self.state.lookup.suggestions(key),
        })
    }
}

impl Injector for Scope {
    fn get(&self, key: &ServiceKey) -> Result<Instance> {
        self.ensure_alive()?;
        match self.state.lookup.get(key)? {
            Some(resolver) => resolver.resolve(self),
            None => Err(self.not_registered(key)),
        }
    }

    fn try_get(&self, key: &ServiceKey) -> Result<Option<Instance>> {
        self.ensure_alive()?;
        match self.state.lookup.get(key)? {
            Some(resolver) => resolver.resolve(self).map(Some),
            None => Ok(None),
        }
    }

    fn create_scope(&self, tag: Option<&str>) -> Result<Scope> {
        self.ensure_alive()?;
        let root = match &self.state.root {
            Some(root) => root.clone(),
            None => Arc::downgrade(&self.state),
        };
        let child = Scope::owned(ScopeState::new(self.state.lookup.clone(), Some(root), tag));
        debug!(parent = %self, scope = %child, "Created scope");
        Ok(child)
    }

    fn scope(&self) -> Option<Scope> {
        Some(self.downgrade())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.state, f)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.state.id)
            .field("tag", &self.state.tag)
            .field("root", &self.is_root())
            .field("owning", &self.is_owning())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

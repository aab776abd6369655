//! The request surface shared by the container, its scopes and factories.
//!
//! Factories receive a `&dyn Injector` for the scope that requested them.
//! The untyped methods work on [`ServiceKey`]s and [`Instance`]s; the typed
//! helpers of [`InjectorExt`] downcast for you.

use std::any::type_name;
use std::sync::Arc;

use crate::error::{KhazinError, Result};
use crate::instance::Instance;
use crate::key::ServiceKey;
use crate::scope::Scope;

/// Resolves services by key.
pub trait Injector: Send + Sync {
    /// Resolves `key`.
    ///
    /// # Errors
    /// [`KhazinError::NotRegistered`] when nothing is registered for `key`,
    /// or any error raised while building or constructing it.
    fn get(&self, key: &ServiceKey) -> Result<Instance>;

    /// Like [`get`](Self::get), but `Ok(None)` when `key` itself is not
    /// registered. Failures of its dependencies still propagate.
    fn try_get(&self, key: &ServiceKey) -> Result<Option<Instance>>;

    /// Opens a child scope sharing this injector's registrations.
    fn create_scope(&self, tag: Option<&str>) -> Result<Scope>;

    /// The scope behind this injector, if it is one. The handle does not
    /// own the scope.
    fn scope(&self) -> Option<Scope> {
        None
    }
}

/// Typed helpers over [`Injector`], available on `&dyn Injector` too.
///
/// ```
/// use khazin_container::prelude::*;
/// use std::sync::Arc;
///
/// let container = Container::builder()
///     .singleton_value(String::from("postgres://localhost"))
///     .build()
///     .unwrap();
///
/// let url: Arc<String> = container.resolve().unwrap();
/// assert_eq!(url.as_str(), "postgres://localhost");
/// assert!(container.try_resolve::<u8>().unwrap().is_none());
/// ```
pub trait InjectorExt: Injector {
    fn resolve<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.resolve_key(&ServiceKey::of::<I>())
    }

    fn resolve_named<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> Result<Arc<I>> {
        self.resolve_key(&ServiceKey::named::<I>(name))
    }

    fn try_resolve<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<I>>> {
        self.try_resolve_key(&ServiceKey::of::<I>())
    }

    fn try_resolve_named<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &'static str,
    ) -> Result<Option<Arc<I>>> {
        self.try_resolve_key(&ServiceKey::named::<I>(name))
    }

    /// Resolves `key` and downcasts to `I`. Needed for generic
    /// constructed keys, which have no Rust type of their own.
    fn resolve_key<I: ?Sized + Send + Sync + 'static>(&self, key: &ServiceKey) -> Result<Arc<I>> {
        let instance = self.get(key)?;
        downcast(key, &instance)
    }

    fn try_resolve_key<I: ?Sized + Send + Sync + 'static>(
        &self,
        key: &ServiceKey,
    ) -> Result<Option<Arc<I>>> {
        match self.try_get(key)? {
            Some(instance) => downcast(key, &instance).map(Some),
            None => Ok(None),
        }
    }
}

impl<T: Injector + ?Sized> InjectorExt for T {}

fn downcast<I: ?Sized + Send + Sync + 'static>(key: &ServiceKey, instance: &Instance) -> Result<Arc<I>> {
    instance.downcast::<I>().ok_or_else(|| KhazinError::TypeMismatch {
        key: key.clone(),
        expected: type_name::<I>(),
        found: instance.type_name(),
    })
}

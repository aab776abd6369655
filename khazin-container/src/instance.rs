//! Type-erased service instances and the dispose contract.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A resolved service, type-erased.
///
/// The payload is always an `Arc<I>`, so concrete types and trait objects
/// round-trip alike:
///
/// ```
/// use khazin_container::instance::Instance;
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync { fn now(&self) -> u64; }
/// struct Fixed;
/// impl Clock for Fixed { fn now(&self) -> u64 { 7 } }
///
/// let erased = Instance::new(Arc::new(Fixed) as Arc<dyn Clock>);
/// let clock: Arc<dyn Clock> = erased.downcast::<dyn Clock>().unwrap();
/// assert_eq!(clock.now(), 7);
/// ```
#[derive(Clone)]
pub struct Instance {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<I: ?Sized + Send + Sync + 'static>(value: Arc<I>) -> Self {
        Self {
            payload: Arc::new(value),
            type_name: type_name::<I>(),
        }
    }

    /// Wraps a plain value.
    pub fn from_value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::new(Arc::new(value))
    }

    pub fn downcast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.payload.downcast_ref::<Arc<I>>().cloned()
    }

    pub fn is<I: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.payload.is::<Arc<I>>()
    }

    /// Name of the type the instance was created as.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Identity comparison: `true` when both handles share one payload.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.type_name)
    }
}

/// Implemented by services that hold resources needing deterministic
/// release.
///
/// The scope that created an instance calls [`dispose`](Disposable::dispose)
/// exactly once, when the scope itself is disposed. Instances created in
/// reverse order of capture are released first.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// Releases one captured instance. Attached to an entry at registration.
pub type DisposeHook = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Hook for a sized service type implementing [`Disposable`].
pub fn dispose_hook<T: Disposable + 'static>() -> DisposeHook {
    Arc::new(|instance: &Instance| {
        if let Some(service) = instance.downcast::<T>() {
            service.dispose();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Connection {
        closed: AtomicUsize,
    }

    impl Disposable for Connection {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let instance = Instance::from_value(5u32);
        assert!(instance.downcast::<u64>().is_none());
        assert_eq!(*instance.downcast::<u32>().unwrap(), 5);
        assert!(instance.is::<u32>());
    }

    #[test]
    fn clones_share_identity() {
        let a = Instance::from_value(String::from("x"));
        let b = a.clone();
        let c = Instance::from_value(String::from("x"));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn downcast_keeps_inner_arc() {
        let inner = Arc::new(3i64);
        let instance = Instance::new(inner.clone());
        assert!(Arc::ptr_eq(&inner, &instance.downcast::<i64>().unwrap()));
    }

    #[test]
    fn hook_disposes_matching_type() {
        let conn = Arc::new(Connection { closed: AtomicUsize::new(0) });
        let hook = dispose_hook::<Connection>();
        hook(&Instance::new(conn.clone()));
        hook(&Instance::from_value(1u8));
        assert_eq!(conn.closed.load(Ordering::SeqCst), 1);
    }
}

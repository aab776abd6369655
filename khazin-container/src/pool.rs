//! Object pools backing the `Pooled` lifetime.
//!
//! A scope checks one item out per pooled service and hands it back when
//! it is disposed. Pools never block: an empty pool creates a new item and
//! a full pool disposes the returned one. Pools are named, so several
//! registrations can draw from the same pool.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::entry::ServiceEntry;
use crate::error::{KhazinError, Result};
use crate::instance::{DisposeHook, Instance};

/// A bounded stack of idle instances.
pub struct ObjectPool {
    name: String,
    capacity: usize,
    idle: Mutex<Vec<Instance>>,
    dispose: Option<DisposeHook>,
    closed: AtomicBool,
}

impl ObjectPool {
    pub(crate) fn new(name: String, capacity: usize, dispose: Option<DisposeHook>) -> Self {
        Self {
            name,
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            dispose,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of idle items.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pops an idle item, or creates one with `create` when none is idle.
    ///
    /// # Errors
    /// [`KhazinError::Disposed`] once the pool is closed, or whatever
    /// `create` fails with.
    pub(crate) fn checkout(&self, create: impl FnOnce() -> Result<Instance>) -> Result<Instance> {
        if self.is_closed() {
            return Err(KhazinError::Disposed {
                scope: format!("pool {}", self.name),
            });
        }
        if let Some(item) = self.idle.lock().pop() {
            trace!(pool = %self.name, "Reusing pooled item");
            return Ok(item);
        }
        trace!(pool = %self.name, "Pool empty, creating item");
        create()
    }

    /// Returns an item. Disposed instead when the pool is full or closed.
    pub(crate) fn give_back(&self, item: Instance) {
        let overflow = {
            let mut idle = self.idle.lock();
            if self.is_closed() || idle.len() >= self.capacity {
                Some(item)
            } else {
                idle.push(item);
                None
            }
        };
        if let Some(item) = overflow {
            self.release(&item);
        }
    }

    /// Disposes every idle item. Later returns are disposed immediately.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = std::mem::take(&mut *self.idle.lock());
        debug!(pool = %self.name, released = drained.len(), "Closing pool");
        for item in drained.iter().rev() {
            self.release(item);
        }
    }

    fn release(&self, item: &Instance) {
        if let Some(dispose) = &self.dispose {
            dispose(item);
        }
    }
}

impl fmt::Debug for ObjectPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("idle", &self.idle())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// All pools of one container, by name.
pub(crate) struct PoolRegistry {
    pools: DashMap<String, Arc<ObjectPool>>,
    capacity: usize,
}

impl PoolRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            pools: DashMap::new(),
            capacity,
        }
    }

    /// The pool `entry` draws from, created on first use.
    pub fn pool_for(&self, entry: &ServiceEntry) -> Arc<ObjectPool> {
        let name = entry.pool_name();
        self.pools
            .entry(name.clone())
            .or_insert_with(|| {
                debug!(pool = %name, capacity = self.capacity, "Creating object pool");
                Arc::new(ObjectPool::new(
                    name,
                    self.capacity,
                    entry.dispose_hook().cloned(),
                ))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ObjectPool>> {
        self.pools.get(name).map(|pool| pool.value().clone())
    }

    /// Closes every pool.
    pub fn close_all(&self) {
        let pools: Vec<Arc<ObjectPool>> = self.pools.iter().map(|pool| pool.value().clone()).collect();
        for pool in pools {
            pool.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(capacity: usize) -> (ObjectPool, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let hook: DisposeHook = {
            let released = released.clone();
            Arc::new(move |_: &Instance| {
                released.fetch_add(1, Ordering::SeqCst);
            })
        };
        (ObjectPool::new("test".into(), capacity, Some(hook)), released)
    }

    #[test]
    fn reuses_returned_items() {
        let (pool, _) = counting_pool(2);
        let first = pool.checkout(|| Ok(Instance::from_value(1u8))).unwrap();
        pool.give_back(first.clone());
        assert_eq!(pool.idle(), 1);

        let again = pool
            .checkout(|| panic!("an idle item should be reused"))
            .unwrap();
        assert!(again.ptr_eq(&first));
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn overflow_is_disposed() {
        let (pool, released) = counting_pool(1);
        pool.give_back(Instance::from_value(1u8));
        pool.give_back(Instance::from_value(2u8));
        assert_eq!(pool.idle(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_releases_idle_and_rejects_checkout() {
        let (pool, released) = counting_pool(4);
        pool.give_back(Instance::from_value(1u8));
        pool.give_back(Instance::from_value(2u8));

        pool.close();
        pool.close();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(matches!(
            pool.checkout(|| Ok(Instance::from_value(3u8))),
            Err(KhazinError::Disposed { .. })
        ));

        pool.give_back(Instance::from_value(4u8));
        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(pool.idle(), 0);
    }
}

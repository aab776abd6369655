//! Dependency paths.
//!
//! While an entry is being built or instantiated it sits on a path. Each
//! scope has its own path per thread, and graph building has one more.
//! Pushing an entry that is already on the same path means the entry
//! (transitively) depends on itself; pushing a shorter-lived entry on top of
//! a longer-lived one violates strict DI. Both are reported as errors and
//! the guard returned by [`enter`] pops the entry again on every exit path.
//!
//! Entries of other paths never interact: a singleton whose factory opens
//! a scope of its own is not the requestor of what that scope resolves.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::warn;

use crate::entry::ServiceEntry;
use crate::error::{CircularDependencyError, KhazinError, RequestNotAllowedError, Result};
use crate::key::ServiceKey;

/// Which path an entry is pushed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathOwner {
    /// Graph building, independent of any scope.
    Build,
    /// Instantiation in the scope with this id.
    Scope(u64),
}

thread_local! {
    static PATH: RefCell<Vec<(PathOwner, Arc<ServiceEntry>)>> = const { RefCell::new(Vec::new()) };
}

/// Pops its entry from the thread's path when dropped.
#[must_use = "the entry leaves the path as soon as the guard is dropped"]
pub(crate) struct PathGuard {
    _private: (),
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        PATH.with(|path| {
            path.borrow_mut().pop();
        });
    }
}

/// Pushes `entry` on `owner`'s path after checking for cycles and, when
/// `strict` is set, lifetime ordering against that path's current requestor.
pub(crate) fn enter(owner: PathOwner, entry: &Arc<ServiceEntry>, strict: bool) -> Result<PathGuard> {
    PATH.with(|path| {
        let mut path = path.borrow_mut();
        let own: Vec<&Arc<ServiceEntry>> = path
            .iter()
            .filter(|(frame_owner, _)| *frame_owner == owner)
            .map(|(_, e)| e)
            .collect();

        check_cycle(&own, entry)?;
        if strict {
            if let Some(requestor) = own.last() {
                check_lifetime(requestor, entry)?;
            }
        }
        path.push((owner, Arc::clone(entry)));
        Ok(PathGuard { _private: () })
    })
}

/// Key of the entry `owner` is currently producing, if any.
pub(crate) fn requestor(owner: PathOwner) -> Option<ServiceKey> {
    PATH.with(|path| {
        path.borrow()
            .iter()
            .rev()
            .find(|(frame_owner, _)| *frame_owner == owner)
            .map(|(_, entry)| entry.key().clone())
    })
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    PATH.with(|path| path.borrow().len())
}

fn check_cycle(path: &[&Arc<ServiceEntry>], entry: &Arc<ServiceEntry>) -> Result<()> {
    let Some(start) = path.iter().position(|e| Arc::ptr_eq(*e, entry)) else {
        return Ok(());
    };

    let mut chain: Vec<ServiceKey> = path[start..].iter().map(|e| e.key().clone()).collect();
    chain.push(entry.key().clone());

    warn!(cycle = ?chain, "Circular dependency detected");
    Err(KhazinError::CircularDependency(CircularDependencyError { chain }))
}

/// Strict DI: `requestor` may only depend on entries living at least as
/// long as itself.
pub(crate) fn check_lifetime(requestor: &ServiceEntry, entry: &ServiceEntry) -> Result<()> {
    if requestor.lifetime().may_depend_on(entry.lifetime()) {
        return Ok(());
    }

    warn!(
        requestor = %requestor.key(),
        requestor_lifetime = %requestor.lifetime(),
        requested = %entry.key(),
        requested_lifetime = %entry.lifetime(),
        "Strict DI violation"
    );
    Err(KhazinError::RequestNotAllowed(RequestNotAllowedError {
        requestor: requestor.key().clone(),
        requestor_lifetime: requestor.lifetime(),
        requested: entry.key().clone(),
        requested_lifetime: entry.lifetime(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceDescriptor;

    struct A;
    struct B;

    const HERE: PathOwner = PathOwner::Scope(1);
    const ELSEWHERE: PathOwner = PathOwner::Scope(2);

    fn entry(descriptor: ServiceDescriptor) -> Arc<ServiceEntry> {
        let slot = descriptor.lifetime().uses_slot().then_some(0);
        Arc::new(ServiceEntry::new(descriptor, slot).unwrap())
    }

    fn transient<T: Send + Sync + 'static>(value: fn() -> T) -> Arc<ServiceEntry> {
        entry(ServiceDescriptor::transient::<T>(move |_| Ok(Arc::new(value()))))
    }

    fn singleton<T: Send + Sync + 'static>(value: fn() -> T) -> Arc<ServiceEntry> {
        entry(ServiceDescriptor::singleton::<T>(move |_| Ok(Arc::new(value()))))
    }

    #[test]
    fn guard_pops_on_drop() {
        let a = transient(|| A);
        {
            let _guard = enter(HERE, &a, false).unwrap();
            assert_eq!(depth(), 1);
            assert_eq!(requestor(HERE), Some(ServiceKey::of::<A>()));
            assert_eq!(requestor(ELSEWHERE), None);
        }
        assert_eq!(depth(), 0);
        assert_eq!(requestor(HERE), None);
    }

    #[test]
    fn reentering_reports_the_cycle() {
        let a = transient(|| A);
        let b = transient(|| B);
        let _ga = enter(HERE, &a, false).unwrap();
        let _gb = enter(HERE, &b, false).unwrap();

        match enter(HERE, &a, false) {
            Err(KhazinError::CircularDependency(err)) => {
                assert_eq!(
                    err.chain,
                    vec![ServiceKey::of::<A>(), ServiceKey::of::<B>(), ServiceKey::of::<A>()]
                );
            }
            other => panic!("expected a cycle, got {:?}", other.err()),
        }
        assert_eq!(depth(), 2);
    }

    #[test]
    fn same_entry_on_another_path_is_not_a_cycle() {
        let a = transient(|| A);
        let _outer = enter(HERE, &a, false).unwrap();
        let _inner = enter(ELSEWHERE, &a, false).unwrap();
        assert_eq!(depth(), 2);
    }

    #[test]
    fn strict_mode_rejects_shorter_lived_request() {
        let single = singleton(|| A);
        let short = transient(|| B);
        let _g = enter(HERE, &single, true).unwrap();

        assert!(matches!(
            enter(HERE, &short, true),
            Err(KhazinError::RequestNotAllowed(_))
        ));
        // Non-strict mode lets it through.
        let _inner = enter(HERE, &short, false).unwrap();
    }

    #[test]
    fn strict_mode_only_looks_at_the_same_path() {
        let single = singleton(|| A);
        let short = transient(|| B);
        let _g = enter(HERE, &single, true).unwrap();
        let _inner = enter(ELSEWHERE, &short, true).unwrap();
        assert_eq!(requestor(ELSEWHERE), Some(ServiceKey::of::<B>()));
        assert_eq!(requestor(HERE), Some(ServiceKey::of::<A>()));
    }

    #[test]
    fn strict_mode_allows_longer_lived_request() {
        let short = transient(|| A);
        let single = singleton(|| B);
        let _g = enter(HERE, &short, true).unwrap();
        let _inner = enter(HERE, &single, true).unwrap();
        assert_eq!(depth(), 2);
    }
}

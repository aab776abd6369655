//! Dependency graph building.
//!
//! Building an entry compiles its factory and walks its declared
//! dependencies:
//! - Detects circular dependencies
//! - Checks that all dependencies are registered
//! - Validates lifetime compatibility (strict DI)
//!
//! In [`ResolutionMode::Aot`] every dependency is built recursively, so all
//! of the above surfaces during [`ContainerBuilder::build()`]. In
//! [`ResolutionMode::Jit`] only the requested entry is built and its
//! dependencies are checked for presence; they are built on their own first
//! request.
//!
//! [`ContainerBuilder::build()`]: crate::container::ContainerBuilder::build

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::compiler::Compiler;
use crate::entry::{EntryState, Features, ServiceEntry};
use crate::error::{KhazinError, NotRegisteredError, Result};
use crate::key::ServiceKey;
use crate::options::ResolutionMode;
use crate::path::{self, PathOwner};

/// Where the builder finds the entries of declared dependencies.
pub(crate) trait EntrySource {
    /// Entry for `key`, specializing an open generic registration when
    /// `key` is a constructed type. `None` when nothing matches.
    fn entry(&self, key: &ServiceKey) -> Result<Option<Arc<ServiceEntry>>>;

    /// Registered keys that look like `key`, for error messages.
    fn suggestions(&self, key: &ServiceKey) -> Vec<String>;
}

/// Aborts an ahead-of-time container build from another thread.
///
/// ```
/// use khazin_container::prelude::*;
///
/// let cancel = CancellationFlag::new();
/// cancel.cancel();
/// let result = Container::builder()
///     .resolution_mode(ResolutionMode::Aot)
///     .singleton_value(1u8)
///     .build_with_cancellation(&cancel);
/// assert!(matches!(result, Err(KhazinError::Cancelled)));
/// ```
#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(KhazinError::Cancelled);
        }
        Ok(())
    }
}

/// Builds entries: compiles factories and validates declared dependencies.
///
/// # Algorithm
/// Depth-first over declared dependencies. The entries currently being
/// built live on the thread's dependency path, which reports cycles and
/// strict-DI violations as they are pushed.
pub(crate) struct DependencyGraphBuilder<'a> {
    source: &'a dyn EntrySource,
    compiler: &'a dyn Compiler,
    mode: ResolutionMode,
    strict: bool,
    cancel: Option<&'a CancellationFlag>,
}

impl<'a> DependencyGraphBuilder<'a> {
    pub fn new(
        source: &'a dyn EntrySource,
        compiler: &'a dyn Compiler,
        mode: ResolutionMode,
        strict: bool,
    ) -> Self {
        Self {
            source,
            compiler,
            mode,
            strict,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: Option<&'a CancellationFlag>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds `entry`. A no-op once the entry is `BUILT`.
    ///
    /// # Errors
    /// - [`KhazinError::CircularDependency`]: the entry depends on itself
    /// - [`KhazinError::NotRegistered`]: a declared dependency is missing
    /// - [`KhazinError::RequestNotAllowed`]: strict DI rejected a dependency
    /// - [`KhazinError::Cancelled`]: the cancellation flag was raised
    pub fn build(&self, entry: &Arc<ServiceEntry>) -> Result<()> {
        if entry.state().contains(EntryState::BUILT) {
            return Ok(());
        }
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }

        let _guard = path::enter(PathOwner::Build, entry, self.strict)?;
        trace!(key = %entry.key(), mode = ?self.mode, "Building entry");

        if entry.features().contains(Features::SUPPORTS_BUILD) {
            entry.compile(self.compiler)?;
        }

        for key in entry.dependencies() {
            let dependency = self.source.entry(key)?.ok_or_else(|| {
                KhazinError::NotRegistered(NotRegisteredError {
                    requested: key.clone(),
                    required_by: Some(entry.key().clone()),
                    suggestions: self.source.suggestions(key),
                })
            })?;

            if self.strict {
                path::check_lifetime(entry, &dependency)?;
            }
            if self.mode == ResolutionMode::Aot {
                self.build(&dependency)?;
            }
        }

        entry.mark(EntryState::BUILT | EntryState::VALIDATED);
        debug!(
            key = %entry.key(),
            dependencies = entry.dependencies().len(),
            "Entry built"
        );
        Ok(())
    }
}

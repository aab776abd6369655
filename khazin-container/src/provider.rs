//! Provider trait: a module of related service registrations.
//!
//! Providers group registrations by concern so a container is assembled
//! from a handful of modules instead of one long registration block.
//!
//! # Examples
//! ```rust
//! use khazin_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Database { url: String }
//!
//! struct DatabaseProvider;
//!
//! impl Provider for DatabaseProvider {
//!     fn register(&self, registry: &mut dyn ProviderRegistry) {
//!         registry.register(ServiceDescriptor::singleton::<Database>(|_| {
//!             Ok(Arc::new(Database { url: "postgres://localhost".into() }))
//!         }));
//!     }
//! }
//!
//! let container = Container::builder()
//!     .add_provider(&DatabaseProvider)
//!     .build()
//!     .unwrap();
//! let db: Arc<Database> = container.resolve().unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```

use crate::entry::DecoratorFn;
use crate::key::ServiceKey;
use crate::registry::ServiceDescriptor;

/// A module that registers related services into a container.
pub trait Provider: Send + Sync {
    /// Called once while the container is assembled.
    fn register(&self, registry: &mut dyn ProviderRegistry);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The part of the builder a [`Provider`] gets to see.
///
/// Registration errors (duplicates, malformed descriptors) are reported
/// when the container is built.
pub trait ProviderRegistry {
    fn register(&mut self, descriptor: ServiceDescriptor);

    /// Wraps the factory registered under `key`.
    fn decorate(&mut self, key: ServiceKey, decorator: DecoratorFn);
}

//! Resolution engine of the khazin DI container.
//!
//! Registrations become [`entry::ServiceEntry`]s, entries are built by the
//! dependency graph builder and compiled into per-lifetime resolvers, and
//! [`scope::Scope`]s hand out instances and dispose of what they created.

pub mod compiler;
pub mod container;
pub mod entry;
pub mod error;
pub mod graph;
pub mod injector;
pub mod instance;
pub mod key;
pub mod lifetime;
pub mod lookup;
pub mod options;
mod path;
pub mod pool;
pub mod provider;
pub mod registry;
pub mod resolver;
mod resolver_lookup;
pub mod scope;

pub use container::{Container, ContainerBuilder, prelude};
pub use error::{KhazinError, Result};
pub use injector::{Injector, InjectorExt};
pub use key::ServiceKey;
pub use scope::Scope;

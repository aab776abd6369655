//! # Khazin: a scoped dependency-injection runtime
//!
//! Register services with a lifetime, build a [`Container`], open
//! [`Scope`]s per unit of work and let the container hand out instances,
//! detect cycles and dispose of what it created.
//!
//! ```
//! use khazin::prelude::*;
//! use std::sync::Arc;
//!
//! struct Settings { name: &'static str }
//! struct Greeter { settings: Arc<Settings> }
//!
//! let container = Container::builder()
//!     .singleton_value(Settings { name: "khazin" })
//!     .register(ServiceDescriptor::activated::<Greeter>(
//!         Lifetime::Scoped,
//!         [ServiceKey::of::<Settings>()],
//!         |args| Ok(Arc::new(Greeter { settings: args.get(0)? })),
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let scope = container.create_scope(Some("request")).unwrap();
//! let greeter: Arc<Greeter> = scope.resolve().unwrap();
//! assert_eq!(greeter.settings.name, "khazin");
//! ```

pub use khazin_container::*;
pub use khazin_support::{rendering, telemetry};

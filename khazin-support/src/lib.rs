//! # Khazin Support
//!
//! Engine-independent helpers shared by the khazin crates:
//! - rendering of dependency paths and type names for diagnostics
//! - "did you mean" suggestions for unregistered services
//! - installation of a `tracing` subscriber for binaries and demos

pub mod rendering;
pub mod telemetry;

//! Tracing subscriber installation.
//!
//! The container crates only emit `tracing` events. Binaries decide where
//! they go; this module offers the default choice: a fmt subscriber
//! filtered by `RUST_LOG`, falling back to a caller-supplied directive.

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive`
/// (e.g. `"khazin_container=debug"`) is used.
///
/// Returns `false` when a global subscriber was already installed, which
/// makes the call safe to repeat from tests.
pub fn install_subscriber(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();
    if installed {
        debug!(default_directive, "Installed tracing subscriber");
    }
    installed
}

//! Error types for container operations.
//!
//! Every error carries enough structure (requested key, requestor,
//! dependency path, lifetimes) to diagnose a misconfiguration without
//! re-running with extra logging.

use std::fmt;

use khazin_support::rendering::{PathStep, render_chain, render_path};

use crate::key::ServiceKey;
use crate::lifetime::Lifetime;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum KhazinError {
    /// Requested service was never registered.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// A service (transitively) depends on itself.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// Strict DI: a longer-lived service requested a shorter-lived one.
    #[error("{}", .0)]
    RequestNotAllowed(RequestNotAllowedError),

    /// The same key was registered twice.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// The registration itself is malformed.
    #[error("Invalid registration for {key}: {reason}")]
    InvalidRegistration { key: ServiceKey, reason: String },

    /// Open generic types describe registrations, they cannot be resolved.
    #[error("Cannot resolve open generic {key}\n  Hint: request a constructed type instead")]
    OpenGenericRequested { key: ServiceKey },

    /// A factory returned an error during construction.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: ServiceKey,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The instance produced for a key is not of the requested type.
    #[error("Type mismatch resolving {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: ServiceKey,
        expected: &'static str,
        found: &'static str,
    },

    /// The scope (or the root it redirects to) has been disposed.
    #[error("Scope {scope} has been disposed")]
    Disposed { scope: String },

    /// Container construction was cancelled before anything was published.
    #[error("Container build was cancelled")]
    Cancelled,
}

impl KhazinError {
    /// Wraps an application error raised inside a factory.
    pub fn construction(
        key: ServiceKey,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        KhazinError::ConstructionFailed {
            key,
            source: source.into(),
        }
    }

    pub(crate) fn invalid(key: &ServiceKey, reason: impl Into<String>) -> Self {
        KhazinError::InvalidRegistration {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// `true` when this is the "not registered" error for `key` itself,
    /// not for one of its dependencies.
    pub fn is_not_registered(&self, key: &ServiceKey) -> bool {
        matches!(self, KhazinError::NotRegistered(e) if &e.requested == key)
    }
}

/// Error when a service was not registered.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The service that was requested.
    pub requested: ServiceKey,
    /// The service whose construction requested it, if any.
    pub required_by: Option<ServiceKey>,
    /// Registered services with similar names.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not registered: {}", self.requested)?;

        if let Some(ref requestor) = self.required_by {
            write!(f, "\n  Required by: {requestor}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error when a circular dependency is detected.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The cycle, with the repeated service at both ends.
    /// Example: `[A, B, A]`.
    pub chain: Vec<ServiceKey>,
}

impl CircularDependencyError {
    /// The distinct services forming the cycle, in path order.
    pub fn members(&self) -> &[ServiceKey] {
        match self.chain.split_last() {
            Some((_, members)) if !members.is_empty() => members,
            _ => &self.chain,
        }
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links: Vec<String> = self.chain.iter().map(ToString::to_string).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&links))?;
        write!(
            f,
            "\n  Hint: break the cycle by resolving one side lazily through the injector"
        )
    }
}

/// Error when strict DI rejects a request.
///
/// A Singleton must not hold a Transient: the Transient would be disposed
/// with its scope while the Singleton still references it.
#[derive(Debug)]
pub struct RequestNotAllowedError {
    pub requestor: ServiceKey,
    pub requestor_lifetime: Lifetime,
    pub requested: ServiceKey,
    pub requested_lifetime: Lifetime,
}

impl fmt::Display for RequestNotAllowedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Request not allowed: {} ({}) cannot depend on {} ({})",
            self.requestor, self.requestor_lifetime, self.requested, self.requested_lifetime,
        )?;
        let path = [
            PathStep::new(self.requestor.to_string(), self.requestor_lifetime.to_string()),
            PathStep::new(self.requested.to_string(), self.requested_lifetime.to_string()),
        ];
        write!(f, "{}", render_path(&path))?;
        write!(
            f,
            "  Hint: make {} live at least as long as {}, or disable strict DI",
            self.requested, self.requestor_lifetime,
        )
    }
}

/// Error when registering a key that already exists.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: ServiceKey,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service already registered: {}", self.key)?;
        write!(f, "\n  Hint: register it under a different name")
    }
}

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, KhazinError>;

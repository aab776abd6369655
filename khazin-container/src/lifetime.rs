//! Service lifetimes.
//!
//! A [`Lifetime`] decides where a resolved instance lives and who releases
//! it:
//! - [`Lifetime::Transient`]: a new instance for every request
//! - [`Lifetime::Scoped`]: one instance per scope
//! - [`Lifetime::Pooled`]: one pool checkout per scope
//! - [`Lifetime::Singleton`]: one instance per scope tree, held by the root
//! - [`Lifetime::Instance`]: a pre-built value
//! - [`Lifetime::Contextual`]: computed from the requesting scope
//!
//! # Precedence
//! Every lifetime has a precedence; a higher value lives longer. With
//! strict DI enabled a service may only depend on services whose
//! precedence is at least its own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::Features;

/// Defines the lifetime of a service within the container.
///
/// # Examples
/// ```
/// use khazin_container::lifetime::Lifetime;
///
/// assert!(Lifetime::Singleton.precedence() > Lifetime::Scoped.precedence());
/// assert!(Lifetime::Transient.may_depend_on(Lifetime::Singleton));
/// assert!(!Lifetime::Singleton.may_depend_on(Lifetime::Transient));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// New instance on every request, owned by the requesting scope.
    Transient,
    /// One instance per scope, cached in the scope's slot.
    Scoped,
    /// An item checked out of a named object pool, once per scope.
    ///
    /// The item goes back to the pool when the scope is disposed.
    Pooled,
    /// One instance for the whole scope tree, cached in the root.
    Singleton,
    /// A value built outside the container. Never disposed by it.
    Instance,
    /// Computed from the requesting scope (e.g. the scope itself).
    Contextual,
}

impl Lifetime {
    /// Higher means longer-lived.
    #[inline]
    pub fn precedence(&self) -> u8 {
        match self {
            Lifetime::Transient => 10,
            Lifetime::Scoped | Lifetime::Pooled => 20,
            Lifetime::Singleton => 30,
            Lifetime::Instance | Lifetime::Contextual => 40,
        }
    }

    /// Strict DI rule: a requestor may only hold services that live at
    /// least as long as itself. Equal precedence is allowed.
    #[inline]
    pub fn may_depend_on(&self, requested: Lifetime) -> bool {
        requested.precedence() >= self.precedence()
    }

    /// Whether instances are cached in a per-scope slot.
    #[inline]
    pub fn uses_slot(&self) -> bool {
        matches!(self, Lifetime::Scoped | Lifetime::Pooled | Lifetime::Singleton)
    }

    /// Whether resolution is redirected to the root scope.
    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    /// Whether entries of this lifetime run a factory at all.
    #[inline]
    pub fn is_built(&self) -> bool {
        !matches!(self, Lifetime::Instance | Lifetime::Contextual)
    }

    /// Feature flags every entry with this lifetime carries.
    pub fn features(&self) -> Features {
        match self {
            Lifetime::Transient => Features::SUPPORTS_BUILD | Features::SUPPORTS_ASPECTS,
            Lifetime::Scoped => {
                Features::CREATE_SINGLE_INSTANCE | Features::SUPPORTS_BUILD | Features::SUPPORTS_ASPECTS
            }
            Lifetime::Pooled => {
                Features::CREATE_SINGLE_INSTANCE
                    | Features::SUPPORTS_BUILD
                    | Features::SUPPORTS_ASPECTS
                    | Features::SUPPORTS_POOLING
            }
            Lifetime::Singleton => {
                Features::CREATE_SINGLE_INSTANCE
                    | Features::SHARED
                    | Features::SUPPORTS_BUILD
                    | Features::SUPPORTS_ASPECTS
            }
            Lifetime::Instance => Features::SHARED,
            Lifetime::Contextual => Features::empty(),
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifetime::Transient => "Transient",
            Lifetime::Scoped => "Scoped",
            Lifetime::Pooled => "Pooled",
            Lifetime::Singleton => "Singleton",
            Lifetime::Instance => "Instance",
            Lifetime::Contextual => "Contextual",
        };
        f.write_str(name)
    }
}

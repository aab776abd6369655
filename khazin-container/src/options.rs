//! Container options.
//!
//! [`ContainerOptions`] is a plain serde-friendly value so it can be loaded
//! from whatever configuration format the application already uses.
//! Missing fields fall back to [`Default`].

use serde::{Deserialize, Serialize};

/// When the dependency graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Build an entry the first time it is requested.
    #[default]
    #[serde(alias = "JIT")]
    Jit,
    /// Build every entry while the container is constructed.
    #[serde(alias = "AOT")]
    Aot,
}

/// Backing structure of service lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupEngine {
    /// Hash map while small, balanced tree past the threshold.
    #[default]
    Auto,
    Tree,
    Dict,
}

impl LookupEngine {
    /// Whether a lookup holding `len` entries should be a tree.
    #[inline]
    pub fn prefers_tree(self, len: usize, threshold: usize) -> bool {
        match self {
            LookupEngine::Auto => len > threshold,
            LookupEngine::Tree => true,
            LookupEngine::Dict => false,
        }
    }
}

/// Behaviour switches of a container.
///
/// # Examples
/// ```
/// use khazin_container::options::{ContainerOptions, ResolutionMode};
///
/// let options = ContainerOptions::default()
///     .with_strict_di(true)
///     .with_resolution_mode(ResolutionMode::Aot);
/// assert!(options.strict_di);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Reject services that depend on shorter-lived services.
    #[serde(alias = "StrictDI")]
    pub strict_di: bool,
    #[serde(alias = "ResolutionMode")]
    pub resolution_mode: ResolutionMode,
    #[serde(alias = "Engine")]
    pub engine: LookupEngine,
    /// Entry count above which [`LookupEngine::Auto`] switches to a tree.
    pub tree_threshold: usize,
    /// Idle items a pool keeps before disposing returned ones.
    pub pool_capacity: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            strict_di: false,
            resolution_mode: ResolutionMode::Jit,
            engine: LookupEngine::Auto,
            tree_threshold: 30,
            pool_capacity: 4,
        }
    }
}

impl ContainerOptions {
    pub fn with_strict_di(mut self, strict: bool) -> Self {
        self.strict_di = strict;
        self
    }

    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.resolution_mode = mode;
        self
    }

    pub fn with_engine(mut self, engine: LookupEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_tree_threshold(mut self, threshold: usize) -> Self {
        self.tree_threshold = threshold;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }
}

//! Data-access configuration surface.
//!
//! Loaded through figment so deployments can layer YAML files, environment
//! variables and in-code defaults the same way the rest of the stack does.

use std::collections::HashMap;

use figment::Figment;
use serde::{Deserialize, Serialize};

/// Fetch policy for a relation: join it up front or defer to an explicit
/// follow-up fetch on first access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchPolicy {
    Eager,
    #[default]
    Lazy,
}

/// Behavior knobs for the data-access layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// When true, a nested projection whose query did not join the required
    /// relation fails fast with `MissingJoin` instead of lazily fetching.
    pub strict_projections: bool,

    /// Page size substituted when a caller does not specify one.
    pub default_page_size: u64,

    /// Upper bound applied to requested page sizes.
    pub max_page_size: u64,

    /// Per-relation fetch policy, keyed by relation name.
    pub fetch: HashMap<String, FetchPolicy>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            strict_projections: false,
            default_page_size: 25,
            max_page_size: 1000,
            fetch: HashMap::new(),
        }
    }
}

impl AccessConfig {
    /// Extract the configuration from a figment (YAML/env/serialized layers).
    ///
    /// # Errors
    /// Returns the figment extraction error when a layer holds malformed data.
    pub fn from_figment(figment: &Figment) -> Result<Self, Box<figment::Error>> {
        figment.extract().map_err(Box::new)
    }

    /// Fetch policy for a relation; relations without explicit configuration
    /// default to lazy.
    #[must_use]
    pub fn fetch_policy(&self, relation: &str) -> FetchPolicy {
        self.fetch.get(relation).copied().unwrap_or_default()
    }

    /// Clamp a requested page size to the configured bounds. Zero means
    /// "unspecified" and takes the default; `PageRequest::of` rejects zero,
    /// so it only reaches here through literal construction.
    #[must_use]
    pub fn clamp_page_size(&self, requested: u64) -> u64 {
        let size = if requested == 0 {
            self.default_page_size
        } else {
            requested
        };
        size.min(self.max_page_size)
    }
}

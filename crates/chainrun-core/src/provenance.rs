//! Provenance descriptors attached to run manifests.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::seed::SeedScheme;

/// Semantic version describing the schema of serialized manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Provenance recorded for every `sample` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Manifest schema version.
    pub schema: SchemaVersion,
    /// SHA-256 of the serialized data file handed to every chain.
    pub data_hash: String,
    /// Sampler executable path as given by the caller.
    pub executable: String,
    /// Base seed from which chain seeds were derived.
    pub base_seed: u32,
    /// Seed derivation rule.
    pub seed_scheme: SeedScheme,
    /// RFC 3339 timestamp recording when the run started.
    pub created_at: String,
    /// Version map for the tools involved in the run.
    pub tool_versions: BTreeMap<String, String>,
}

impl RunProvenance {
    /// Creates a provenance record stamped with the current time.
    pub fn new(
        data_hash: impl Into<String>,
        executable: impl Into<String>,
        base_seed: u32,
        seed_scheme: SeedScheme,
    ) -> Self {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            "chainrun-core".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        Self {
            schema: SchemaVersion::default(),
            data_hash: data_hash.into(),
            executable: executable.into(),
            base_seed,
            seed_scheme,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            tool_versions,
        }
    }
}

#![deny(missing_docs)]
#![doc = "Shared error taxonomy, configuration and seeding policy for chainrun."]

/// Typed `sample` configuration and validation.
pub mod config;
pub mod errors;
pub mod provenance;
pub mod seed;
/// Canonical JSON and hashing helpers.
pub mod serde;

pub use config::SampleConfig;
pub use errors::{ChainError, ErrorInfo, ErrorKind};
pub use provenance::{RunProvenance, SchemaVersion};
pub use seed::{chain_seed, chain_seeds, derive_substream_seed, SeedScheme, DEFAULT_BASE_SEED};

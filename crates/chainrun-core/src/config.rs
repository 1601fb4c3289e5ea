use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ErrorInfo};
use crate::seed::{SeedScheme, DEFAULT_BASE_SEED};

/// Arguments the orchestrator builds itself and that `extra_args` may not override.
const MANAGED_KEYWORDS: &[&str] = &["sample", "data", "random", "output"];
const MANAGED_PREFIXES: &[&str] = &[
    "id=",
    "seed=",
    "file=",
    "num_samples=",
    "num_warmup=",
    "thin=",
    "delta=",
    "refresh=",
];

/// Recognised options for a `sample` call.
///
/// Loaded from YAML (or JSON) with unknown keys rejected, so a misspelled
/// option surfaces as [`ChainError::InvalidArgument`] instead of being ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleConfig {
    /// Base RNG seed; per-chain seeds are derived from it.
    #[serde(default)]
    pub seed: Option<u32>,
    /// Rule used to derive per-chain seeds from `seed`.
    #[serde(default)]
    pub seed_scheme: SeedScheme,
    /// Upper bound on concurrently running chains. Defaults to the chain count.
    #[serde(default)]
    pub max_parallel: Option<usize>,
    /// Per-chain wall-clock limit in seconds.
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    /// Wall-clock limit in seconds for the whole run; expiry cancels all chains.
    #[serde(default)]
    pub run_timeout_secs: Option<f64>,
    /// Retain the run directory (data, outputs, manifest) after completion.
    #[serde(default)]
    pub keep_files: bool,
    /// Parent directory for the run directory. Defaults to the system temp dir.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Post warm-up draws per chain.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Warm-up iterations per chain.
    #[serde(default = "default_num_warmup")]
    pub num_warmup: usize,
    /// Thinning period for saved draws.
    #[serde(default)]
    pub thin: Option<usize>,
    /// Target acceptance statistic for step size adaptation.
    #[serde(default)]
    pub adapt_delta: Option<f64>,
    /// Progress refresh interval forwarded to the sampler.
    #[serde(default)]
    pub refresh: Option<usize>,
    /// Additional sampler arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Extra environment variables for every chain process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_num_samples() -> usize {
    1000
}

fn default_num_warmup() -> usize {
    1000
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            seed: None,
            seed_scheme: SeedScheme::default(),
            max_parallel: None,
            timeout_secs: None,
            run_timeout_secs: None,
            keep_files: false,
            output_dir: None,
            num_samples: default_num_samples(),
            num_warmup: default_num_warmup(),
            thin: None,
            adapt_delta: None,
            refresh: None,
            extra_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

fn invalid(code: &str, message: impl Into<String>) -> ChainError {
    ChainError::InvalidArgument(ErrorInfo::new(code, message))
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>, ChainError> {
    let Some(secs) = value else {
        return Ok(None);
    };
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if secs > 0.0 => Ok(Some(duration)),
        _ => Err(ChainError::InvalidArgument(
            ErrorInfo::new("config_duration", format!("{field} must be a positive number of seconds"))
                .with_context("field", field)
                .with_context("value", secs.to_string()),
        )),
    }
}

impl SampleConfig {
    /// Parses a configuration from YAML or JSON text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ChainError> {
        let config: SampleConfig = serde_yaml::from_str(text).map_err(|err| {
            ChainError::InvalidArgument(
                ErrorInfo::new("config_parse", err.to_string())
                    .with_hint("check option names against the SampleConfig fields"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ChainError::InvalidArgument(
                ErrorInfo::new("config_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            ChainError::InvalidArgument(info) => ChainError::InvalidArgument(
                info.with_context("path", path.display().to_string()),
            ),
            other => other,
        })
    }

    /// Checks field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.max_parallel == Some(0) {
            return Err(invalid("config_max_parallel", "max_parallel must be at least 1"));
        }
        seconds("timeout_secs", self.timeout_secs)?;
        seconds("run_timeout_secs", self.run_timeout_secs)?;
        if self.thin == Some(0) {
            return Err(invalid("config_thin", "thin must be at least 1"));
        }
        if let Some(delta) = self.adapt_delta {
            if !(delta > 0.0 && delta < 1.0) {
                return Err(ChainError::InvalidArgument(
                    ErrorInfo::new("config_adapt_delta", "adapt_delta must lie in (0, 1)")
                        .with_context("value", delta.to_string()),
                ));
            }
        }
        for arg in &self.extra_args {
            let managed = MANAGED_KEYWORDS.contains(&arg.as_str())
                || MANAGED_PREFIXES.iter().any(|prefix| arg.starts_with(prefix));
            if managed {
                return Err(ChainError::InvalidArgument(
                    ErrorInfo::new("config_extra_arg", "extra argument overrides a managed argument")
                        .with_context("arg", arg.clone())
                        .with_hint("use the dedicated config field instead"),
                ));
            }
        }
        Ok(())
    }

    /// Per-chain timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        seconds("timeout_secs", self.timeout_secs).ok().flatten()
    }

    /// Whole-run timeout as a [`Duration`].
    pub fn run_timeout(&self) -> Option<Duration> {
        seconds("run_timeout_secs", self.run_timeout_secs)
            .ok()
            .flatten()
    }

    /// Base seed, falling back to [`DEFAULT_BASE_SEED`].
    pub fn base_seed(&self) -> u32 {
        self.seed.unwrap_or(DEFAULT_BASE_SEED)
    }

    /// Number of chains allowed to run at once for a run of `chains`.
    pub fn parallelism(&self, chains: usize) -> usize {
        self.max_parallel.unwrap_or(chains).clamp(1, chains.max(1))
    }
}

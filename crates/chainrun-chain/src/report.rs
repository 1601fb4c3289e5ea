use std::path::{Path, PathBuf};

use chainrun_core::errors::{ChainError, ErrorInfo};
use chainrun_core::RunProvenance;
use chainrun_draws::DrawTable;
use chainrun_proc::ProcessResult;
use serde::{Deserialize, Serialize};

use crate::spec::ChainSpec;

/// Lifecycle of a single chain.
///
/// `Pending → Running → {Succeeded, Failed, TimedOut, Cancelled}`; a chain that
/// never got to run may also go straight from `Pending` to `Failed` (launch
/// error) or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainState {
    /// Waiting for a concurrency slot.
    Pending,
    /// Process spawned, not yet reaped.
    Running,
    /// Process exited cleanly and its output parsed.
    Succeeded,
    /// Launch, runtime or output failure.
    Failed,
    /// Killed after exceeding the per-chain timeout.
    TimedOut,
    /// Stopped or never started because the run was cancelled.
    Cancelled,
}

impl ChainState {
    /// True once no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChainState::Pending | ChainState::Running)
    }

    /// Terminal state recorded for a chain-level error.
    pub fn for_error(error: &ChainError) -> Self {
        match error {
            ChainError::Timeout(_) => ChainState::TimedOut,
            ChainError::Cancelled(_) => ChainState::Cancelled,
            _ => ChainState::Failed,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(self, next: ChainState) -> Result<ChainState, ChainError> {
        let allowed = match (self, next) {
            (ChainState::Pending, ChainState::Running)
            | (ChainState::Pending, ChainState::Failed)
            | (ChainState::Pending, ChainState::Cancelled) => true,
            (ChainState::Running, next) => next.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(ChainError::Orchestration(
                ErrorInfo::new("chain_state", "illegal chain state transition")
                    .with_context("from", format!("{self:?}"))
                    .with_context("to", format!("{next:?}")),
            ))
        }
    }
}

/// Everything known about one chain once the run is over.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    /// Launch description.
    pub spec: ChainSpec,
    /// Terminal state.
    pub state: ChainState,
    /// Process observations, absent when nothing was spawned.
    pub process: Option<ProcessResult>,
    /// Parsed draws, present only for `Succeeded`.
    pub draws: Option<DrawTable>,
    /// Failure cause, present for every non-successful state.
    pub error: Option<ChainError>,
}

impl ChainReport {
    pub(crate) fn pending(spec: ChainSpec) -> Self {
        Self {
            spec,
            state: ChainState::Pending,
            process: None,
            draws: None,
            error: None,
        }
    }

    /// True when the chain finished with parsed draws.
    pub fn succeeded(&self) -> bool {
        self.state == ChainState::Succeeded
    }

    fn summary(&self) -> ChainSummary {
        ChainSummary {
            index: self.spec.index,
            id: self.spec.id,
            seed: self.spec.seed,
            state: self.state,
            output: self
                .spec
                .output_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            exit_code: self.process.as_ref().and_then(|p| p.exit_code),
            signal: self.process.as_ref().and_then(|p| p.signal),
            duration_ms: self
                .process
                .as_ref()
                .map(|p| p.duration.as_millis() as u64),
            draws: self.draws.as_ref().map(DrawTable::num_draws),
            error: self.error.clone(),
        }
    }
}

/// Aggregate outcome of a `sample` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Every chain succeeded.
    Success,
    /// At least one chain succeeded and at least one did not.
    PartialFailure,
    /// No chain succeeded.
    Failure,
}

impl RunStatus {
    /// Classifies a set of terminal chain states.
    pub fn from_states<I: IntoIterator<Item = ChainState>>(states: I) -> Self {
        let (mut ok, mut total) = (0usize, 0usize);
        for state in states {
            total += 1;
            if state == ChainState::Succeeded {
                ok += 1;
            }
        }
        match ok {
            0 => RunStatus::Failure,
            n if n == total => RunStatus::Success,
            _ => RunStatus::PartialFailure,
        }
    }
}

/// Compact per-chain record used in manifests and CLI summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    /// Zero-based chain index.
    pub index: usize,
    /// CmdStan chain id.
    pub id: usize,
    /// Chain seed.
    pub seed: u32,
    /// Terminal state.
    pub state: ChainState,
    /// Output file name inside the run directory.
    pub output: String,
    /// Exit code, when the process exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal, when killed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// Wall-clock time of the process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Number of parsed draws.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draws: Option<usize>,
    /// Failure cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ChainError>,
}

/// Serializable run summary written as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Run provenance.
    pub provenance: RunProvenance,
    /// Aggregate status.
    pub status: RunStatus,
    /// Per-chain summaries in index order.
    pub chains: Vec<ChainSummary>,
}

/// Result of a `sample` call: one report per chain, in chain-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    chains: Vec<ChainReport>,
    status: RunStatus,
    run_dir: Option<PathBuf>,
    provenance: RunProvenance,
}

impl SampleResult {
    pub(crate) fn new(
        chains: Vec<ChainReport>,
        run_dir: Option<PathBuf>,
        provenance: RunProvenance,
    ) -> Self {
        let status = RunStatus::from_states(chains.iter().map(|report| report.state));
        Self {
            chains,
            status,
            run_dir,
            provenance,
        }
    }

    /// Reports indexed by chain index.
    pub fn chains(&self) -> &[ChainReport] {
        &self.chains
    }

    /// Report for chain `index`.
    pub fn chain(&self, index: usize) -> Option<&ChainReport> {
        self.chains.get(index)
    }

    /// Aggregate status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Retained run directory; `None` unless files were kept.
    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Provenance of the run.
    pub fn provenance(&self) -> &RunProvenance {
        &self.provenance
    }

    /// Chains that finished with draws.
    pub fn succeeded(&self) -> impl Iterator<Item = &ChainReport> {
        self.chains.iter().filter(|report| report.succeeded())
    }

    /// Chains that did not succeed.
    pub fn failed(&self) -> impl Iterator<Item = &ChainReport> {
        self.chains.iter().filter(|report| !report.succeeded())
    }

    /// Draws of all successful chains, concatenated in chain-index order.
    pub fn merged_draws(&self) -> Result<DrawTable, ChainError> {
        let tables: Vec<(usize, &DrawTable)> = self
            .chains
            .iter()
            .filter_map(|report| report.draws.as_ref().map(|draws| (report.spec.id, draws)))
            .collect();
        DrawTable::merge_chains(&tables)
    }

    /// Serializable summary of the run.
    pub fn manifest(&self) -> RunManifest {
        RunManifest {
            provenance: self.provenance.clone(),
            status: self.status,
            chains: self.chains.iter().map(ChainReport::summary).collect(),
        }
    }
}

#![deny(missing_docs)]
#![doc = "Multi-chain CmdStan sampling: launch, supervise and aggregate chains."]

/// Model description.
pub mod model;
pub mod orchestrator;
/// Per-chain reports, run status and the aggregated result.
pub mod report;
/// Per-chain launch specs and CmdStan argument construction.
pub mod spec;

pub use chainrun_core::{ChainError, SampleConfig, SeedScheme};
pub use chainrun_data::{DataValue, InputData};
pub use chainrun_draws::DrawTable;
pub use chainrun_proc::{CancellationToken, Launcher, ProcessRunner};
pub use model::Model;
pub use orchestrator::ChainOrchestrator;
pub use report::{ChainReport, ChainState, ChainSummary, RunManifest, RunStatus, SampleResult};
pub use spec::{sample_args, ChainSpec};

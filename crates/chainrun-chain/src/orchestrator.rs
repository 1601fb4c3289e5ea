//! Concurrent execution of N sampler chains against one shared data file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chainrun_core::errors::{ChainError, ErrorInfo};
use chainrun_core::serde::{sha256_hex, to_canonical_json_bytes};
use chainrun_core::{chain_seeds, RunProvenance, SampleConfig};
use chainrun_data::{serialize, write_data_file, InputData};
use chainrun_draws::DrawTable;
use chainrun_proc::{Invocation, Launcher, ProcessResult, ProcessRunner};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::model::Model;
use crate::report::{ChainReport, ChainState, SampleResult};
use crate::spec::ChainSpec;

const DATA_FILE: &str = "data.json";
const MANIFEST_FILE: &str = "manifest.json";

/// What a chain task reports back to the control loop.
#[derive(Debug)]
struct ChainOutcome {
    launched: bool,
    process: Option<ProcessResult>,
    draws: Option<DrawTable>,
    error: Option<ChainError>,
}

impl ChainOutcome {
    fn not_started(error: ChainError) -> Self {
        Self {
            launched: false,
            process: None,
            draws: None,
            error: Some(error),
        }
    }
}

/// Runs several chains of one model concurrently and collects their draws.
#[derive(Clone)]
pub struct ChainOrchestrator {
    model: Model,
    launcher: Arc<dyn Launcher>,
}

impl std::fmt::Debug for ChainOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainOrchestrator")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChainOrchestrator {
    /// Orchestrator that launches real processes.
    pub fn new(model: Model) -> Self {
        Self::with_launcher(model, Arc::new(ProcessRunner::new()))
    }

    /// Orchestrator that launches through `launcher`.
    pub fn with_launcher(model: Model, launcher: Arc<dyn Launcher>) -> Self {
        Self { model, launcher }
    }

    /// The model being sampled.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Runs `chains` chains and waits for all of them.
    ///
    /// Only call-level problems (`InvalidArgument`, `MalformedData`,
    /// `Orchestration`) are returned as `Err`; chain failures are reported in
    /// the result.
    pub async fn sample(
        &self,
        data: &InputData,
        chains: usize,
        config: &SampleConfig,
    ) -> Result<SampleResult, ChainError> {
        self.sample_with_cancel(data, chains, config, CancellationToken::new())
            .await
    }

    /// Like [`ChainOrchestrator::sample`], stopping early when `cancel` fires.
    ///
    /// Running processes are killed and reaped; chains still waiting for a
    /// slot are reported as cancelled without ever launching.
    pub async fn sample_with_cancel(
        &self,
        data: &InputData,
        chains: usize,
        config: &SampleConfig,
        cancel: CancellationToken,
    ) -> Result<SampleResult, ChainError> {
        if chains == 0 {
            return Err(ChainError::InvalidArgument(
                ErrorInfo::new("chains_zero", "at least one chain is required")
                    .with_context("chains", "0"),
            ));
        }
        config.validate()?;
        data.require(self.model.required())?;
        let payload = serialize(data)?;

        let base_seed = config.base_seed();
        let seeds = chain_seeds(base_seed, chains, config.seed_scheme);
        let mut provenance = RunProvenance::new(
            sha256_hex(payload.as_bytes()),
            self.model.executable().display().to_string(),
            base_seed,
            config.seed_scheme,
        );
        provenance.tool_versions.insert(
            "chainrun-chain".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        let run_dir = create_run_dir(config.output_dir.as_deref())?;
        let data_path = run_dir.path().join(DATA_FILE);
        write_data_file(&data_path, &payload)?;

        let specs: Vec<ChainSpec> = seeds
            .iter()
            .enumerate()
            .map(|(index, &seed)| ChainSpec::new(index, seed, run_dir.path(), &data_path, config))
            .collect();
        let parallelism = config.parallelism(chains);
        info!(
            chains,
            parallelism,
            base_seed,
            run_dir = %run_dir.path().display(),
            "starting run"
        );

        let token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();
        for spec in &specs {
            let invocation = Invocation {
                executable: self.model.executable().to_path_buf(),
                args: spec.args.clone(),
                working_dir: Some(run_dir.path().to_path_buf()),
                env: config.env.clone(),
                timeout: config.timeout(),
            };
            let span = info_span!("chain", index = spec.index, seed = spec.seed);
            let launcher = Arc::clone(&self.launcher);
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();
            let index = spec.index;
            let output_path = spec.output_path.clone();
            tasks.spawn(
                async move {
                    let outcome =
                        run_chain(launcher, semaphore, invocation, output_path, token).await;
                    (index, outcome)
                }
                .instrument(span),
            );
        }

        let mut reports: Vec<ChainReport> = specs.into_iter().map(ChainReport::pending).collect();
        let mut deadline_fired = false;
        let run_deadline = sleep_or_pending(config.run_timeout());
        tokio::pin!(run_deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((index, outcome)) => {
                            record(&mut reports[index], outcome, deadline_fired)?;
                        }
                        Err(join_error) => {
                            token.cancel();
                            tasks.abort_all();
                            while tasks.join_next().await.is_some() {}
                            return Err(ChainError::orchestration("chain_task", join_error));
                        }
                    }
                }
                _ = &mut run_deadline, if !deadline_fired => {
                    deadline_fired = true;
                    warn!("run deadline reached, cancelling outstanding chains");
                    token.cancel();
                }
            }
        }

        let kept = if config.keep_files {
            Some(run_dir.into_path())
        } else {
            if let Err(err) = run_dir.close() {
                warn!(error = %err, "failed to remove run directory");
            }
            None
        };
        let result = SampleResult::new(reports, kept, provenance);
        if let Some(dir) = result.run_dir() {
            write_manifest(dir, &result)?;
        }
        info!(
            status = ?result.status(),
            succeeded = result.succeeded().count(),
            chains,
            "run finished"
        );
        Ok(result)
    }

    /// Blocking wrapper around [`ChainOrchestrator::sample`] for sync callers.
    pub fn sample_blocking(
        &self,
        data: &InputData,
        chains: usize,
        config: &SampleConfig,
    ) -> Result<SampleResult, ChainError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ChainError::orchestration("runtime_build", err))?;
        runtime.block_on(self.sample(data, chains, config))
    }
}

async fn sleep_or_pending(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn create_run_dir(parent: Option<&Path>) -> Result<TempDir, ChainError> {
    let parent: PathBuf = parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    let failed = |err: std::io::Error| {
        ChainError::Orchestration(
            ErrorInfo::new("run_dir_create", err.to_string())
                .with_context("parent", parent.display().to_string()),
        )
    };
    fs::create_dir_all(&parent).map_err(failed)?;
    // Chains run inside the run directory, so the paths handed to them must be absolute.
    let parent = std::path::absolute(&parent).map_err(failed)?;
    tempfile::Builder::new()
        .prefix("chainrun-")
        .tempdir_in(&parent)
        .map_err(failed)
}

fn write_manifest(dir: &Path, result: &SampleResult) -> Result<(), ChainError> {
    let bytes = to_canonical_json_bytes(&result.manifest())?;
    let path = dir.join(MANIFEST_FILE);
    fs::write(&path, bytes).map_err(|err| {
        ChainError::Orchestration(
            ErrorInfo::new("manifest_write", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })
}

async fn run_chain(
    launcher: Arc<dyn Launcher>,
    semaphore: Arc<Semaphore>,
    invocation: Invocation,
    output_path: PathBuf,
    token: CancellationToken,
) -> ChainOutcome {
    let waiting = || {
        ChainError::Cancelled(ErrorInfo::new(
            "cancelled_while_pending",
            "run was cancelled before the chain started",
        ))
    };
    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => return ChainOutcome::not_started(waiting()),
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return ChainOutcome::not_started(waiting()),
        },
    };
    if token.is_cancelled() {
        return ChainOutcome::not_started(waiting());
    }

    debug!(args = ?invocation.args, "launching chain");
    let launched = launcher.run(&invocation, &token).await;
    drop(permit);

    match launched {
        Ok(process) => match chainrun_draws::parse(&output_path) {
            Ok(draws) => ChainOutcome {
                launched: true,
                process: Some(process),
                draws: Some(draws),
                error: None,
            },
            Err(error) => ChainOutcome {
                launched: true,
                process: Some(process),
                draws: None,
                error: Some(error),
            },
        },
        Err(failure) => ChainOutcome {
            launched: failure.process.is_some(),
            process: failure.process,
            draws: None,
            error: Some(failure.error),
        },
    }
}

fn record(
    report: &mut ChainReport,
    outcome: ChainOutcome,
    deadline_fired: bool,
) -> Result<(), ChainError> {
    if outcome.launched {
        report.state = report.state.advance(ChainState::Running)?;
    }
    let error = match outcome.error {
        Some(ChainError::Cancelled(info)) if deadline_fired => Some(ChainError::Cancelled(
            info.with_context("reason", "run_timeout"),
        )),
        other => other,
    };
    let terminal = error
        .as_ref()
        .map(ChainState::for_error)
        .unwrap_or(ChainState::Succeeded);
    report.state = report.state.advance(terminal)?;
    report.process = outcome.process;
    report.draws = outcome.draws;
    report.error = error;

    let (index, seed) = (report.spec.index, report.spec.seed);
    match &report.error {
        None => info!(
            index,
            seed,
            draws = report.draws.as_ref().map(DrawTable::num_draws),
            "chain succeeded"
        ),
        Some(error) => warn!(index, seed, state = ?report.state, %error, "chain did not succeed"),
    }
    Ok(())
}

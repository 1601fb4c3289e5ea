use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chainrun_chain::{
    CancellationToken, ChainOrchestrator, ChainState, DataValue, InputData, Launcher, Model,
    ProcessRunner, RunStatus, SampleConfig,
};
use chainrun_core::ErrorKind;
use chainrun_proc::{Invocation, ProcessResult, RunFailure};

fn echo_sampler() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chainrun-echo-sampler"))
}

fn data() -> InputData {
    InputData::new().with("N", 2).with("y", vec![1.0, 2.0])
}

fn config(env: &[(&str, &str)]) -> SampleConfig {
    SampleConfig {
        seed: Some(7),
        num_samples: 10,
        num_warmup: 10,
        env: env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..SampleConfig::default()
    }
}

/// Counts launches before delegating to a real runner.
#[derive(Default)]
struct Spy {
    inner: ProcessRunner,
    launches: AtomicUsize,
}

#[async_trait]
impl Launcher for Spy {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, RunFailure> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.inner.run(invocation, cancel).await
    }
}

/// Points one chain at an executable that does not exist.
struct BreakChain {
    inner: ProcessRunner,
    id: usize,
}

#[async_trait]
impl Launcher for BreakChain {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, RunFailure> {
        let marker = format!("id={}", self.id);
        if invocation.args.iter().any(|arg| *arg == marker) {
            let mut broken = invocation.clone();
            broken.executable = PathBuf::from("/nonexistent/model");
            return self.inner.run(&broken, cancel).await;
        }
        self.inner.run(invocation, cancel).await
    }
}

fn spied() -> (Arc<Spy>, ChainOrchestrator) {
    let spy = Arc::new(Spy::default());
    let orchestrator =
        ChainOrchestrator::with_launcher(Model::new(echo_sampler()), spy.clone());
    (spy, orchestrator)
}

#[tokio::test]
async fn zero_chains_is_rejected_before_launch() {
    let (spy, orchestrator) = spied();
    let err = orchestrator.sample(&data(), 0, &config(&[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(spy.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn jagged_data_is_rejected_before_launch() {
    let (spy, orchestrator) = spied();
    let jagged = InputData::new().with(
        "m",
        DataValue::Array(vec![
            DataValue::from(vec![1, 2]),
            DataValue::from(vec![3]),
        ]),
    );
    let err = orchestrator.sample(&jagged, 3, &config(&[])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedData);
    assert_eq!(err.info().code, "data_jagged");
    assert_eq!(spy.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_config_is_rejected_before_launch() {
    let (spy, orchestrator) = spied();
    let config = SampleConfig {
        max_parallel: Some(0),
        ..config(&[])
    };
    let err = orchestrator.sample(&data(), 2, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(spy.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_bad_executable_leaves_siblings_intact() {
    let launcher = Arc::new(BreakChain {
        inner: ProcessRunner::new(),
        id: 2,
    });
    let orchestrator = ChainOrchestrator::with_launcher(Model::new(echo_sampler()), launcher);
    let result = orchestrator.sample(&data(), 4, &config(&[])).await.unwrap();

    assert_eq!(result.status(), RunStatus::PartialFailure);
    assert_eq!(result.succeeded().count(), 3);
    let broken = result.chain(1).unwrap();
    assert_eq!(broken.state, ChainState::Failed);
    assert!(broken.process.is_none());
    assert!(broken.draws.is_none());
    assert_eq!(broken.error.as_ref().unwrap().kind(), ErrorKind::Launch);

    let merged = result.merged_draws().unwrap();
    assert_eq!(merged.num_draws(), 30);
    let chain_ids = merged.column("chain__").unwrap();
    assert!(!chain_ids.contains(&2.0));
}

#[tokio::test]
async fn nonzero_exit_keeps_diagnostics() {
    let orchestrator = ChainOrchestrator::new(Model::new(echo_sampler()));
    let config = config(&[("ECHO_SAMPLER_FAIL_CHAIN", "1")]);
    let result = orchestrator.sample(&data(), 2, &config).await.unwrap();

    assert_eq!(result.status(), RunStatus::PartialFailure);
    let failed = result.chain(0).unwrap();
    assert_eq!(failed.state, ChainState::Failed);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::Runtime);
    assert_eq!(error.info().context["exit_code"], "70");
    let process = failed.process.as_ref().unwrap();
    assert_eq!(process.exit_code, Some(70));
    assert!(process.stderr.contains("failed on request"));
    assert_eq!(result.chain(1).unwrap().state, ChainState::Succeeded);
}

#[tokio::test]
async fn truncated_output_is_malformed() {
    let orchestrator = ChainOrchestrator::new(Model::new(echo_sampler()));
    let config = config(&[("ECHO_SAMPLER_TRUNCATE_CHAIN", "2")]);
    let result = orchestrator.sample(&data(), 2, &config).await.unwrap();

    let truncated = result.chain(1).unwrap();
    assert_eq!(truncated.state, ChainState::Failed);
    assert!(truncated.process.as_ref().unwrap().success());
    let error = truncated.error.as_ref().unwrap();
    assert_eq!(error.kind(), ErrorKind::MalformedOutput);
    assert_eq!(error.info().code, "draws_truncated");
}

#[tokio::test]
async fn every_chain_failing_is_failure() {
    let orchestrator = ChainOrchestrator::new(Model::new(echo_sampler()));
    let config = config(&[("ECHO_SAMPLER_FAIL_CHAIN", "1,2,3")]);
    let result = orchestrator.sample(&data(), 3, &config).await.unwrap();
    assert_eq!(result.status(), RunStatus::Failure);
    assert_eq!(result.failed().count(), 3);
    assert_eq!(result.merged_draws().unwrap().num_draws(), 0);
}

#[tokio::test]
async fn missing_executable_fails_every_chain_without_err() {
    let orchestrator = ChainOrchestrator::new(Model::new("/nonexistent/model"));
    let result = orchestrator.sample(&data(), 2, &config(&[])).await.unwrap();
    assert_eq!(result.status(), RunStatus::Failure);
    for report in result.chains() {
        assert_eq!(report.error.as_ref().unwrap().kind(), ErrorKind::Launch);
    }
}

fn assert_reaped(pid: u32) {
    if cfg!(target_os = "linux") {
        assert!(
            !Path::new(&format!("/proc/{pid}")).exists(),
            "process {pid} outlived the call"
        );
    }
}

#[tokio::test]
async fn slow_chain_times_out_and_is_reaped() {
    let orchestrator = ChainOrchestrator::new(Model::new(echo_sampler()));
    let config = SampleConfig {
        timeout_secs: Some(1.0),
        ..config(&[
            ("ECHO_SAMPLER_SLEEP_MS", "30000"),
            ("ECHO_SAMPLER_SLEEP_CHAIN", "2"),
        ])
    };
    let started = Instant::now();
    let result = orchestrator.sample(&data(), 3, &config).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));

    assert_eq!(result.status(), RunStatus::PartialFailure);
    let slow = result.chain(1).unwrap();
    assert_eq!(slow.state, ChainState::TimedOut);
    assert_eq!(slow.error.as_ref().unwrap().kind(), ErrorKind::Timeout);
    assert_reaped(slow.process.as_ref().unwrap().pid.unwrap());
    assert_eq!(result.chain(0).unwrap().state, ChainState::Succeeded);
    assert_eq!(result.chain(2).unwrap().state, ChainState::Succeeded);
}

#[tokio::test]
async fn run_deadline_cancels_running_and_waiting_chains() {
    let (spy, orchestrator) = spied();
    let config = SampleConfig {
        max_parallel: Some(1),
        run_timeout_secs: Some(0.5),
        ..config(&[("ECHO_SAMPLER_SLEEP_MS", "30000")])
    };
    let result = orchestrator.sample(&data(), 3, &config).await.unwrap();

    assert_eq!(result.status(), RunStatus::Failure);
    assert_eq!(spy.launches.load(Ordering::SeqCst), 1);
    for report in result.chains() {
        assert_eq!(report.state, ChainState::Cancelled);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.info().context["reason"], "run_timeout");
    }
    let running = result.chain(0).unwrap();
    assert_reaped(running.process.as_ref().unwrap().pid.unwrap());
    assert!(result.chain(1).unwrap().process.is_none());
    assert!(result.chain(2).unwrap().process.is_none());
}

#[tokio::test]
async fn caller_cancellation_stops_the_run() {
    let orchestrator = ChainOrchestrator::new(Model::new(echo_sampler()));
    let config = config(&[("ECHO_SAMPLER_SLEEP_MS", "30000")]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });
    let started = Instant::now();
    let result = orchestrator
        .sample_with_cancel(&data(), 2, &config, cancel)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(20));
    for report in result.chains() {
        assert_eq!(report.state, ChainState::Cancelled);
        assert_reaped(report.process.as_ref().unwrap().pid.unwrap());
    }
}

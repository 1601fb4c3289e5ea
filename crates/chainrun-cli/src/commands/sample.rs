use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use chainrun_chain::{ChainOrchestrator, Model, RunManifest, RunStatus};
use chainrun_core::SampleConfig;
use chainrun_data::InputData;
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::print_json;

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Compiled CmdStan model executable.
    #[arg(long)]
    pub exe: PathBuf,
    /// CmdStan JSON data file.
    #[arg(long)]
    pub data: PathBuf,
    /// Number of chains to run.
    #[arg(long, default_value_t = 4)]
    pub chains: usize,
    /// YAML or JSON file with sampling options.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Base seed; overrides the config file.
    #[arg(long)]
    pub seed: Option<u32>,
    /// Maximum number of chains running at once.
    #[arg(long)]
    pub max_parallel: Option<usize>,
    /// Per-chain timeout in seconds.
    #[arg(long)]
    pub timeout: Option<f64>,
    /// Keep the run directory (data, outputs, manifest).
    #[arg(long)]
    pub keep_files: bool,
    /// Parent directory for the run directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Write the merged draws of successful chains to this CSV file.
    #[arg(long)]
    pub draws: Option<PathBuf>,
    /// Data variables the model requires, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub require: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SampleSummary {
    #[serde(flatten)]
    manifest: RunManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draws_file: Option<String>,
}

fn resolve_config(args: &SampleArgs) -> Result<SampleConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => SampleConfig::load(path)?,
        None => SampleConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.max_parallel.is_some() {
        config.max_parallel = args.max_parallel;
    }
    if args.timeout.is_some() {
        config.timeout_secs = args.timeout;
    }
    if args.keep_files {
        config.keep_files = true;
    }
    if args.out.is_some() {
        config.output_dir = args.out.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Exit status: 0 when every chain succeeded, 2 on partial failure, 1 otherwise.
fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Success => ExitCode::SUCCESS,
        RunStatus::PartialFailure => ExitCode::from(2),
        RunStatus::Failure => ExitCode::from(1),
    }
}

pub fn run(args: &SampleArgs) -> Result<ExitCode, Box<dyn Error>> {
    let config = resolve_config(args)?;
    let data = InputData::load(&args.data)?;
    let model = Model::new(&args.exe).with_required(args.require.iter().cloned());
    let orchestrator = ChainOrchestrator::new(model);

    let result = orchestrator.sample_blocking(&data, args.chains, &config)?;

    let mut draws_file = None;
    if let Some(path) = &args.draws {
        let merged = result.merged_draws()?;
        merged.write_csv(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), draws = merged.num_draws(), "wrote merged draws");
        draws_file = Some(path.display().to_string());
    }

    let summary = SampleSummary {
        manifest: result.manifest(),
        run_dir: result.run_dir().map(|dir| dir.display().to_string()),
        draws_file,
    };
    print_json(&summary)?;
    Ok(exit_code(result.status()))
}

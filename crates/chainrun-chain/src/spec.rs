use std::path::{Path, PathBuf};

use chainrun_core::SampleConfig;
use serde::{Deserialize, Serialize};

/// Launch description of one chain, fixed before the chain starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Zero-based position in the result.
    pub index: usize,
    /// One-based CmdStan chain id (`index + 1`).
    pub id: usize,
    /// Seed passed as `random seed=`.
    pub seed: u32,
    /// Shared input data file.
    pub data_path: PathBuf,
    /// Stan CSV file this chain writes.
    pub output_path: PathBuf,
    /// Complete argument vector handed to the executable.
    pub args: Vec<String>,
}

impl ChainSpec {
    /// Builds the spec for chain `index` inside `run_dir`.
    pub fn new(
        index: usize,
        seed: u32,
        run_dir: &Path,
        data_path: &Path,
        config: &SampleConfig,
    ) -> Self {
        let id = index + 1;
        let output_path = run_dir.join(format!("output-{id}.csv"));
        let args = sample_args(id, seed, data_path, &output_path, config);
        Self {
            index,
            id,
            seed,
            data_path: data_path.to_path_buf(),
            output_path,
            args,
        }
    }
}

/// CmdStan argument vector for a `sample` run.
///
/// Layout: `sample num_samples=.. num_warmup=.. [thin=..] [adapt delta=..] id=..
/// data file=.. random seed=.. output file=.. [refresh=..]` followed by the
/// caller's extra arguments.
pub fn sample_args(
    id: usize,
    seed: u32,
    data_path: &Path,
    output_path: &Path,
    config: &SampleConfig,
) -> Vec<String> {
    let mut args = vec![
        "sample".to_string(),
        format!("num_samples={}", config.num_samples),
        format!("num_warmup={}", config.num_warmup),
    ];
    if let Some(thin) = config.thin {
        args.push(format!("thin={thin}"));
    }
    if let Some(delta) = config.adapt_delta {
        args.push("adapt".to_string());
        args.push(format!("delta={delta}"));
    }
    args.push(format!("id={id}"));
    args.push("data".to_string());
    args.push(format!("file={}", data_path.display()));
    args.push("random".to_string());
    args.push(format!("seed={seed}"));
    args.push("output".to_string());
    args.push(format!("file={}", output_path.display()));
    if let Some(refresh) = config.refresh {
        args.push(format!("refresh={refresh}"));
    }
    args.extend(config.extra_args.iter().cloned());
    args
}

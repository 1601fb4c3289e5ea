//! Stand-in for a compiled CmdStan model, used by the orchestrator tests.
//!
//! Accepts the `sample` argument grammar, reads the data file and writes a
//! Stan CSV whose columns echo every data variable (`name`, `name.i`,
//! `name.i.j`, column-major like Stan) next to a seed-dependent `theta`.
//!
//! Behaviour switches, each taking a comma separated list of chain ids unless
//! noted:
//! - `ECHO_SAMPLER_FAIL_CHAIN`: exit with status 70 without writing output.
//! - `ECHO_SAMPLER_TRUNCATE_CHAIN`: exit cleanly after writing half a row.
//! - `ECHO_SAMPLER_SLEEP_MS`: milliseconds to sleep before sampling,
//!   restricted to `ECHO_SAMPLER_SLEEP_CHAIN` when that is set.
//! - `ECHO_SAMPLER_DELAY_BY_ID`: sleep `value / id` milliseconds, so higher
//!   ids finish first.

use std::env;
use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use chainrun_data::{DataValue, InputData};

const PARAMETER: &str = "theta";

struct Request {
    id: usize,
    seed: u32,
    num_samples: usize,
    data: PathBuf,
    output: PathBuf,
}

fn parse_args(args: &[String]) -> Result<Request, Box<dyn Error>> {
    if args.first().map(String::as_str) != Some("sample") {
        return Err("first argument must be `sample`".into());
    }
    let mut section = "sample";
    let mut id = 1;
    let mut seed = 0;
    let mut num_samples = 1000;
    let mut data = None;
    let mut output = None;
    for arg in &args[1..] {
        match arg.split_once('=') {
            None => section = arg.as_str(),
            Some(("id", value)) => id = value.parse()?,
            Some(("seed", value)) => seed = value.parse()?,
            Some(("num_samples", value)) => num_samples = value.parse()?,
            Some(("file", value)) if section == "data" => data = Some(PathBuf::from(value)),
            Some(("file", value)) if section == "output" => output = Some(PathBuf::from(value)),
            Some(_) => {}
        }
    }
    Ok(Request {
        id,
        seed,
        num_samples,
        data: data.ok_or("missing `data file=`")?,
        output: output.ok_or("missing `output file=`")?,
    })
}

fn targets(var: &str, id: usize) -> bool {
    env::var(var)
        .map(|list| list.split(',').any(|item| item.trim().parse::<usize>().ok() == Some(id)))
        .unwrap_or(false)
}

fn env_millis(var: &str) -> Option<u64> {
    env::var(var).ok().and_then(|value| value.trim().parse().ok())
}

fn element<'a>(value: &'a DataValue, index: &[usize]) -> Option<&'a DataValue> {
    index.iter().try_fold(value, |node, &i| match node {
        DataValue::Array(items) => items.get(i),
        _ => None,
    })
}

fn scalar(value: &DataValue) -> Option<f64> {
    match value {
        DataValue::Int(i) => Some(*i as f64),
        DataValue::Real(r) => Some(*r),
        DataValue::Array(_) => None,
    }
}

/// Flattens one variable into `(column, value)` pairs, first index fastest.
fn flatten(
    name: &str,
    value: &DataValue,
    out: &mut Vec<(String, f64)>,
) -> Result<(), Box<dyn Error>> {
    let shape = value.shape(name)?;
    let total: usize = shape.iter().product();
    for mut k in 0..total {
        let mut index = Vec::with_capacity(shape.len());
        for &extent in &shape {
            index.push(k % extent);
            k /= extent;
        }
        let leaf = element(value, &index)
            .and_then(scalar)
            .ok_or_else(|| format!("variable `{name}` has no element at {index:?}"))?;
        let mut column = name.to_string();
        for i in &index {
            let _ = write!(column, ".{}", i + 1);
        }
        out.push((column, leaf));
    }
    Ok(())
}

fn theta(seed: u32, draw: usize) -> f64 {
    let mixed = u64::from(seed)
        .wrapping_mul(2_654_435_761)
        .wrapping_add(draw as u64 * 40_503);
    (mixed % 1_000_000) as f64 / 1_000_000.0
}

fn render(request: &Request, data: &InputData) -> Result<String, Box<dyn Error>> {
    let mut echoed = Vec::new();
    for (name, value) in data {
        flatten(name, value, &mut echoed)?;
    }
    let with_parameter = data.get(PARAMETER).is_none();

    let mut text = String::new();
    writeln!(text, "# model = echo_model")?;
    writeln!(text, "# method = sample (Default)")?;
    writeln!(text, "#   sample")?;
    writeln!(text, "#     num_samples = {}", request.num_samples)?;
    writeln!(text, "# id = {}", request.id)?;
    writeln!(text, "# data")?;
    writeln!(text, "#   file = {}", request.data.display())?;
    writeln!(text, "# random")?;
    writeln!(text, "#   seed = {}", request.seed)?;

    let mut header = vec!["lp__".to_string(), "accept_stat__".to_string()];
    header.extend(echoed.iter().map(|(column, _)| column.clone()));
    if with_parameter {
        header.push(PARAMETER.to_string());
    }
    writeln!(text, "{}", header.join(","))?;
    writeln!(text, "# Adaptation terminated")?;
    writeln!(text, "# Step size = 1")?;

    for draw in 0..request.num_samples {
        let mut row = vec![format!("{}", -0.5 * (draw + 1) as f64), "0.9".to_string()];
        row.extend(echoed.iter().map(|(_, value)| format!("{value}")));
        if with_parameter {
            row.push(format!("{}", theta(request.seed, draw)));
        }
        writeln!(text, "{}", row.join(","))?;
    }
    writeln!(text, "#")?;
    writeln!(text, "#  Elapsed Time: 0 seconds (Sampling)")?;
    Ok(text)
}

fn truncate(text: &str) -> String {
    let body = text.trim_end_matches('\n');
    let last_row = body.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
    let keep = last_row + (body.len() - last_row) / 2;
    body[..keep.max(last_row + 1).min(body.len())].to_string()
}

fn run() -> Result<ExitCode, Box<dyn Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let request = parse_args(&args)?;

    if let Some(ms) = env_millis("ECHO_SAMPLER_DELAY_BY_ID") {
        thread::sleep(Duration::from_millis(ms / request.id.max(1) as u64));
    }
    if let Some(ms) = env_millis("ECHO_SAMPLER_SLEEP_MS") {
        let restricted = env::var("ECHO_SAMPLER_SLEEP_CHAIN").is_ok();
        if !restricted || targets("ECHO_SAMPLER_SLEEP_CHAIN", request.id) {
            thread::sleep(Duration::from_millis(ms));
        }
    }
    if targets("ECHO_SAMPLER_FAIL_CHAIN", request.id) {
        eprintln!("chain {} failed on request", request.id);
        return Ok(ExitCode::from(70));
    }

    let data = InputData::load(&request.data)?;
    let mut text = render(&request, &data)?;
    if targets("ECHO_SAMPLER_TRUNCATE_CHAIN", request.id) {
        // Drop the trailing comment block so the cut falls inside a draw row.
        let rows_end = text.find("#\n#  Elapsed").unwrap_or(text.len());
        text = truncate(&text[..rows_end]);
    }
    fs::write(&request.output, text)?;
    println!(
        "Iteration: {n} / {n} [100%]  (Sampling)",
        n = request.num_samples
    );
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("echo-sampler: {err}");
            ExitCode::from(65)
        }
    }
}

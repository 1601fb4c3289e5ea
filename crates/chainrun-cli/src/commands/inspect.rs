use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::print_json;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Stan CSV file written by a sampler.
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
struct Inspection<'a> {
    path: String,
    columns: Vec<&'a str>,
    parameters: Vec<&'a str>,
    draws: usize,
    metadata: &'a BTreeMap<String, String>,
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let table = chainrun_draws::parse(&args.file)?;
    let inspection = Inspection {
        path: args.file.display().to_string(),
        columns: table.columns().collect(),
        parameters: table.parameter_names(),
        draws: table.num_draws(),
        metadata: &table.metadata,
    };
    print_json(&inspection)
}

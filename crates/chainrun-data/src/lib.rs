#![deny(missing_docs)]
#![doc = "Input data model and CmdStan JSON serialization for chainrun."]

/// CmdStan JSON serialization and data file writing.
pub mod json;
/// Numeric data values, shape validation and JSON ingestion.
pub mod value;

pub use json::{serialize, to_json_value, write_data_file};
pub use value::{DataValue, InputData};

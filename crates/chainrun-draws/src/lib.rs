#![deny(missing_docs)]
#![doc = "Stan CSV draws parsing and multi-chain draw tables for chainrun."]

/// Stan CSV parsing entry points.
pub mod parser;
/// In-memory draw tables and variable lookups.
pub mod table;

pub use parser::{parse, parse_reader, parse_str};
pub use table::{Draw, DrawTable, VariableColumns, CHAIN_COLUMN};

pub mod inspect;
pub mod sample;

use std::error::Error;

use chainrun_core::serde::to_canonical_json_bytes;
use serde::Serialize;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let json = to_canonical_json_bytes(value)?;
    println!("{}", String::from_utf8(json)?);
    Ok(())
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chainrun_core::errors::{ChainError, ErrorInfo};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::value::{DataValue, InputData};

fn to_json(value: &DataValue) -> Value {
    match value {
        DataValue::Int(int) => Value::Number(Number::from(*int)),
        DataValue::Real(real) => match Number::from_f64(*real) {
            Some(number) => Value::Number(number),
            None if real.is_nan() => Value::String("NaN".to_string()),
            None if *real > 0.0 => Value::String("Inf".to_string()),
            None => Value::String("-Inf".to_string()),
        },
        DataValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
    }
}

/// Converts validated input data into a CmdStan JSON value.
pub fn to_json_value(data: &InputData) -> Result<Value, ChainError> {
    data.shapes()?;
    let mut object = Map::new();
    for (name, value) in data {
        object.insert(name.clone(), to_json(value));
    }
    Ok(Value::Object(object))
}

/// Serializes input data into CmdStan JSON text.
///
/// Variables are emitted in lexicographic order and reals keep their decimal
/// point, so the output is byte-for-byte deterministic and integer/real kinds
/// survive a round trip.
pub fn serialize(data: &InputData) -> Result<String, ChainError> {
    let value = to_json_value(data)?;
    let mut text = serde_json::to_string_pretty(&value).map_err(|err| {
        ChainError::MalformedData(ErrorInfo::new("data_serialize", err.to_string()))
    })?;
    text.push('\n');
    Ok(text)
}

/// Writes an already serialized payload through a scoped, buffered handle.
///
/// The handle is flushed explicitly and closed when it drops, on success and
/// on every error path.
pub fn write_data_file(path: &Path, payload: &str) -> Result<(), ChainError> {
    let io_error = |code: &str, err: std::io::Error| {
        ChainError::Orchestration(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    };
    let file = File::create(path).map_err(|err| io_error("data_file_create", err))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(payload.as_bytes())
        .map_err(|err| io_error("data_file_write", err))?;
    writer.flush().map_err(|err| io_error("data_file_flush", err))?;
    debug!(path = %path.display(), bytes = payload.len(), "wrote data file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reals_keep_decimal_point() {
        let data = InputData::new().with("sigma", 1.0).with("n", 1);
        let text = serialize(&data).unwrap();
        assert!(text.contains("\"sigma\": 1.0"));
        assert!(text.contains("\"n\": 1\n") || text.contains("\"n\": 1,"));
    }

    #[test]
    fn non_finite_reals_use_cmdstan_tokens() {
        let data = InputData::new().with("x", vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        let value = to_json_value(&data).unwrap();
        assert_eq!(value["x"], serde_json::json!(["NaN", "Inf", "-Inf"]));
    }
}

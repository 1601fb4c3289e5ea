use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chainrun_core::errors::{ChainError, ErrorInfo};
use serde_json::Value;

/// A single data value: a numeric scalar or a (possibly nested) array of them.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Integer scalar.
    Int(i64),
    /// Real scalar; may be non-finite.
    Real(f64),
    /// Ordered sequence; one entry per element of the leading dimension.
    Array(Vec<DataValue>),
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Int(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Int(i64::from(value))
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Real(value)
    }
}

impl<T: Into<DataValue>> From<Vec<T>> for DataValue {
    fn from(values: Vec<T>) -> Self {
        DataValue::Array(values.into_iter().map(Into::into).collect())
    }
}

fn malformed(code: &str, message: impl Into<String>, variable: &str, path: &str) -> ChainError {
    ChainError::MalformedData(
        ErrorInfo::new(code, message)
            .with_context("variable", variable)
            .with_context("element", path),
    )
}

impl DataValue {
    /// Returns the dimensions of this value after checking that it is rectangular.
    ///
    /// Scalars have an empty shape; an empty array has shape `[0]`.
    pub fn shape(&self, variable: &str) -> Result<Vec<usize>, ChainError> {
        self.shape_at(variable, variable)
    }

    fn shape_at(&self, variable: &str, path: &str) -> Result<Vec<usize>, ChainError> {
        let items = match self {
            DataValue::Int(_) | DataValue::Real(_) => return Ok(Vec::new()),
            DataValue::Array(items) => items,
        };
        let mut inner: Option<Vec<usize>> = None;
        for (idx, item) in items.iter().enumerate() {
            let item_path = format!("{path}[{idx}]");
            let shape = item.shape_at(variable, &item_path)?;
            match &inner {
                None => inner = Some(shape),
                Some(expected) if *expected != shape => {
                    return Err(ChainError::MalformedData(
                        ErrorInfo::new("data_jagged", "array is not rectangular")
                            .with_context("variable", variable)
                            .with_context("element", item_path)
                            .with_context("expected", format!("{expected:?}"))
                            .with_context("found", format!("{shape:?}")),
                    ));
                }
                Some(_) => {}
            }
        }
        let mut dims = vec![items.len()];
        dims.extend(inner.unwrap_or_default());
        Ok(dims)
    }

    fn from_json_at(value: &Value, variable: &str, path: &str) -> Result<Self, ChainError> {
        match value {
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(DataValue::Int(int))
                } else if number.is_u64() {
                    Err(malformed(
                        "data_int_range",
                        "integer does not fit in 64 signed bits",
                        variable,
                        path,
                    ))
                } else {
                    number
                        .as_f64()
                        .map(DataValue::Real)
                        .ok_or_else(|| malformed("data_number", "unrepresentable number", variable, path))
                }
            }
            Value::String(text) => match text.as_str() {
                "NaN" | "nan" => Ok(DataValue::Real(f64::NAN)),
                "Inf" | "+Inf" | "inf" | "Infinity" | "+Infinity" => Ok(DataValue::Real(f64::INFINITY)),
                "-Inf" | "-inf" | "-Infinity" => Ok(DataValue::Real(f64::NEG_INFINITY)),
                _ => Err(malformed(
                    "data_unsupported",
                    "strings are not numeric data",
                    variable,
                    path,
                )),
            },
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| Self::from_json_at(item, variable, &format!("{path}[{idx}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(DataValue::Array),
            Value::Bool(_) => Err(malformed(
                "data_unsupported",
                "booleans are not numeric data",
                variable,
                path,
            )),
            Value::Null => Err(malformed(
                "data_unsupported",
                "null is not numeric data",
                variable,
                path,
            )),
            Value::Object(_) => Err(malformed(
                "data_unsupported",
                "nested mappings are not supported",
                variable,
                path,
            )),
        }
    }
}

/// Named input variables handed to every chain.
///
/// Backed by a `BTreeMap`, so iteration (and therefore serialization) is
/// always in lexicographic name order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputData {
    vars: BTreeMap<String, DataValue>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.ends_with("__")
}

impl InputData {
    /// Creates an empty data set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`InputData::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a variable, returning the previous value under that name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Option<DataValue> {
        self.vars.insert(name.into(), value.into())
    }

    /// Looks up a variable by name.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.vars.get(name)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variables are defined.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, DataValue> {
        self.vars.iter()
    }

    /// Fails with `MalformedData` listing every name in `required` that is absent.
    pub fn require<S: AsRef<str>>(&self, required: &[S]) -> Result<(), ChainError> {
        let missing: Vec<&str> = required
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.vars.contains_key(*name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ChainError::MalformedData(
            ErrorInfo::new("data_missing", "required variables are missing")
                .with_context("missing", missing.join(",")),
        ))
    }

    /// Validates every variable and returns its shape, keyed by name.
    pub fn shapes(&self) -> Result<BTreeMap<String, Vec<usize>>, ChainError> {
        let mut shapes = BTreeMap::new();
        for (name, value) in &self.vars {
            if !is_identifier(name) {
                return Err(ChainError::MalformedData(
                    ErrorInfo::new("data_name", "variable name is not a valid identifier")
                        .with_context("variable", name.clone()),
                ));
            }
            shapes.insert(name.clone(), value.shape(name)?);
        }
        Ok(shapes)
    }

    /// Converts a JSON object into input data, rejecting unsupported leaves.
    pub fn from_json(value: &Value) -> Result<Self, ChainError> {
        let object = value.as_object().ok_or_else(|| {
            ChainError::MalformedData(ErrorInfo::new(
                "data_root",
                "input data must be a JSON object",
            ))
        })?;
        let mut data = InputData::new();
        for (name, value) in object {
            data.insert(name.clone(), DataValue::from_json_at(value, name, name)?);
        }
        Ok(data)
    }

    /// Parses input data from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ChainError> {
        let value: Value = serde_json::from_str(text).map_err(|err| {
            ChainError::MalformedData(ErrorInfo::new("data_json", err.to_string()))
        })?;
        Self::from_json(&value)
    }

    /// Loads input data from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let text = fs::read_to_string(path).map_err(|err| {
            ChainError::MalformedData(
                ErrorInfo::new("data_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_json_str(&text)
    }
}

impl<'a> IntoIterator for &'a InputData {
    type Item = (&'a String, &'a DataValue);
    type IntoIter = btree_map::Iter<'a, String, DataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}

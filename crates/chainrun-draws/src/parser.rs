use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use chainrun_core::errors::{ChainError, ErrorInfo};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::table::DrawTable;

fn wrap_csv(code: &str, err: csv::Error) -> ChainError {
    let mut info = ErrorInfo::new(code, err.to_string());
    if let Some(position) = err.position() {
        info = info.with_context("line", position.line().to_string());
    }
    ChainError::MalformedOutput(info)
}

fn record_line(record: &StringRecord) -> String {
    record
        .position()
        .map(|position| position.line().to_string())
        .unwrap_or_else(|| "?".to_string())
}

/// Scrapes `# key = value` comment lines; trailing `(Default)` markers are dropped.
fn scrape_metadata(text: &str) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for line in text.lines() {
        let Some(comment) = line.trim_start().strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = comment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        let value = value.trim();
        let value = value.strip_suffix("(Default)").unwrap_or(value).trim();
        metadata
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
    metadata
}

/// Parses Stan CSV text into a [`DrawTable`].
///
/// Lines starting with `#` are comments wherever they appear. The first
/// non-comment record is the header and every following record must match its
/// width. Text that does not end in a newline is treated as truncated.
pub fn parse_str(text: &str) -> Result<DrawTable, ChainError> {
    if !text.is_empty() && !text.ends_with('\n') {
        let line = text.lines().count();
        return Err(ChainError::MalformedOutput(
            ErrorInfo::new("draws_truncated", "output ends mid-line")
                .with_context("line", line.to_string())
                .with_hint("the sampler was probably killed while writing"),
        ));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(|err| wrap_csv("draws_header", err))?,
        None => {
            return Err(ChainError::MalformedOutput(ErrorInfo::new(
                "draws_missing_header",
                "output contains no header row",
            )))
        }
    };
    let columns: Vec<String> = header.iter().map(str::to_string).collect();
    if let Some(position) = columns.iter().position(String::is_empty) {
        return Err(ChainError::MalformedOutput(
            ErrorInfo::new("draws_empty_column", "header contains an empty column name")
                .with_context("line", record_line(&header))
                .with_context("column", position.to_string()),
        ));
    }

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|err| wrap_csv("draws_record", err))?;
        if record.len() != columns.len() {
            return Err(ChainError::MalformedOutput(
                ErrorInfo::new("draws_width", "row width does not match header")
                    .with_context("line", record_line(&record))
                    .with_context("expected", columns.len().to_string())
                    .with_context("found", record.len().to_string()),
            ));
        }
        let mut row = Vec::with_capacity(record.len());
        for (column, field) in columns.iter().zip(record.iter()) {
            let value = field.parse::<f64>().map_err(|_| {
                ChainError::MalformedOutput(
                    ErrorInfo::new("draws_non_numeric", "field is not a number")
                        .with_context("line", record_line(&record))
                        .with_context("column", column.clone())
                        .with_context("value", field),
                )
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    let mut table = DrawTable::new(columns, rows)?;
    table.metadata = scrape_metadata(text);
    debug!(
        columns = table.num_columns(),
        draws = table.num_draws(),
        "parsed draws"
    );
    Ok(table)
}

/// Parses Stan CSV from any reader, e.g. a pipe or an in-memory buffer.
pub fn parse_reader<R: Read>(mut reader: R) -> Result<DrawTable, ChainError> {
    let mut text = String::new();
    reader.read_to_string(&mut text).map_err(|err| {
        ChainError::MalformedOutput(ErrorInfo::new("draws_read", err.to_string()))
    })?;
    parse_str(&text)
}

/// Reads and parses a Stan CSV file.
pub fn parse(path: &Path) -> Result<DrawTable, ChainError> {
    let text = fs::read_to_string(path).map_err(|err| {
        ChainError::MalformedOutput(
            ErrorInfo::new("draws_read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    parse_str(&text).map_err(|err| match err {
        ChainError::MalformedOutput(info) => {
            ChainError::MalformedOutput(info.with_context("path", path.display().to_string()))
        }
        other => other,
    })
}

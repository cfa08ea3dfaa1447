//! Built-in structural analyzer for CSV and JSON uploads.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{AnalysisError, DatasetAnalyzer, DatasetSummary, FileKind};

/// Reports row/column counts, column names and missing cells.
///
/// Spreadsheets are rejected; they need an external analyzer.
#[derive(Debug, Default)]
pub struct PreviewAnalyzer;

impl PreviewAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatasetAnalyzer for PreviewAnalyzer {
    async fn analyze(&self, kind: FileKind, data: &[u8]) -> Result<DatasetSummary, AnalysisError> {
        match kind {
            FileKind::Csv => summarize_csv(std::str::from_utf8(data)?),
            FileKind::Json => summarize_json(&serde_json::from_slice(data)?),
            FileKind::Xlsx | FileKind::Text => Err(AnalysisError::UnsupportedType(format!(
                "{} analyzer cannot read {}",
                self.name(),
                kind.mime_type()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "Preview"
    }
}

fn summarize_csv(text: &str) -> Result<DatasetSummary, AnalysisError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(ToString::to_string).collect();
    if columns.is_empty() {
        return Err(AnalysisError::Malformed(
            "CSV file has no header row".to_string(),
        ));
    }

    let mut missing: Vec<usize> = vec![0; columns.len()];
    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        rows += 1;
        for (idx, count) in missing.iter_mut().enumerate() {
            if record.get(idx).is_none_or(|f| f.trim().is_empty()) {
                *count += 1;
            }
        }
    }

    Ok(DatasetSummary {
        shape: [rows, columns.len()],
        missing_values: columns.iter().cloned().zip(missing).collect(),
        columns,
    })
}

fn summarize_json(value: &Value) -> Result<DatasetSummary, AnalysisError> {
    let records: Vec<Map<String, Value>> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => flatten(obj),
                other => {
                    let mut row = Map::new();
                    row.insert("0".to_string(), other.clone());
                    row
                }
            })
            .collect(),
        Value::Object(obj) => vec![flatten(obj)],
        _ => {
            return Err(AnalysisError::Malformed(
                "JSON upload must be an object or an array".to_string(),
            ));
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let missing_values: BTreeMap<String, usize> = columns
        .iter()
        .map(|col| {
            let count = records
                .iter()
                .filter(|r| r.get(col).is_none_or(Value::is_null))
                .count();
            (col.clone(), count)
        })
        .collect();

    Ok(DatasetSummary {
        shape: [records.len(), columns.len()],
        columns,
        missing_values,
    })
}

/// Flatten nested objects into dotted keys (`{"a": {"b": 1}}` -> `a.b`).
fn flatten(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(&mut out, None, obj);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: Option<&str>, obj: &Map<String, Value>) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&name), inner),
            _ => {
                out.insert(name, value.clone());
            }
        }
    }
}

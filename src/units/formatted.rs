//! Formatted: materialize landed files as tables.
//!
//! Every file under the persistent folder becomes one table in the formatted
//! zone. The table name is derived from the file's relative path, so a file
//! that was already materialized is recognised and skipped on later runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::core::stage::{RegistryError, UnitArgs};
use crate::domain::{Dataset, Value};
use crate::store::SharedStore;

use super::ProcessingUnit;

pub const CSV_UNIT_NAME: &str = "csv_formatted";
pub const JSON_UNIT_NAME: &str = "json_formatted";

/// Source file formats the formatted stage understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Json => "json",
        }
    }

    /// The other format, whose files share table names with this one's
    pub fn sibling(&self) -> SourceFormat {
        match self {
            SourceFormat::Csv => SourceFormat::Json,
            SourceFormat::Json => SourceFormat::Csv,
        }
    }

    /// Parse raw file bytes into a dataset
    pub fn parse(&self, bytes: &[u8]) -> Result<Dataset> {
        match self {
            SourceFormat::Csv => read_csv(bytes),
            SourceFormat::Json => read_json(bytes),
        }
    }
}

/// Deterministic table name for a file path relative to the persistent folder.
///
/// Lower-cased, extension removed, path separators become `_`, and anything
/// outside `[a-z0-9_]` is dropped.
pub fn compute_table_name(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    let joined = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");

    joined
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// A file of the other format that maps to the same table as `path`.
///
/// Table names drop the extension, so `a.csv` and `a.json` collide and only
/// the first one materialized is kept.
pub fn colliding_sibling(path: &Path, format: SourceFormat) -> Option<PathBuf> {
    let sibling = path.with_extension(format.sibling().extension());
    sibling.is_file().then_some(sibling)
}

/// Files of one format below `folder`, sorted by path
pub fn list_source_files(folder: &Path, format: SourceFormat) -> Result<Vec<PathBuf>> {
    let root = folder
        .to_str()
        .with_context(|| format!("Non UTF-8 folder path: {}", folder.display()))?;
    let pattern = format!("{}/**/*.{}", glob::Pattern::escape(root), format.extension());

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_csv(bytes: &[u8]) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut dataset = Dataset::new(headers)?;
    for record in reader.records() {
        let record = record.context("Malformed CSV record")?;
        dataset.push_row(record.iter().map(Value::infer).collect())?;
    }
    Ok(dataset)
}

fn json_cell(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        nested => Value::Text(nested.to_string()),
    }
}

/// Collect record objects from the accepted JSON layouts
fn json_records(document: &JsonValue) -> Vec<&serde_json::Map<String, JsonValue>> {
    match document {
        JsonValue::Object(map) => match map.get("Results") {
            Some(JsonValue::Array(results)) => {
                results.iter().filter_map(JsonValue::as_object).collect()
            }
            _ => vec![map],
        },
        JsonValue::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                JsonValue::Object(map) if map.contains_key("Results") => json_records(item),
                JsonValue::Object(map) => vec![map],
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn read_json(bytes: &[u8]) -> Result<Dataset> {
    let document: JsonValue = serde_json::from_slice(bytes).context("Malformed JSON document")?;
    let records = json_records(&document);

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut dataset = Dataset::new(columns.clone())?;
    for record in records {
        let row = columns
            .iter()
            .map(|c| record.get(c).map(json_cell).unwrap_or(Value::Null))
            .collect();
        dataset.push_row(row)?;
    }
    Ok(dataset)
}

/// Reads every file of one format into the formatted zone
pub struct FormattedUnit {
    name: &'static str,
    format: SourceFormat,
    folder: PathBuf,
    target: SharedStore,
}

impl FormattedUnit {
    pub fn new(
        name: &'static str,
        format: SourceFormat,
        folder: PathBuf,
        target: SharedStore,
    ) -> Self {
        Self {
            name,
            format,
            folder,
            target,
        }
    }

    async fn materialize(&self, path: &Path) -> Result<bool> {
        let relative = path.strip_prefix(&self.folder).unwrap_or(path);
        let table = compute_table_name(relative);

        if self.target.exists_table(&table)? {
            match colliding_sibling(path, self.format) {
                Some(sibling) => warn!(
                    %table,
                    file = %path.display(),
                    other = %sibling.display(),
                    "Table name shared with a file of another format, skipping"
                ),
                None => debug!(%table, "Table already materialized, skipping"),
            }
            return Ok(false);
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let dataset = self
            .format
            .parse(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if dataset.width() == 0 {
            warn!(file = %path.display(), "Source file has no columns, skipping");
            return Ok(false);
        }

        self.target.insert_table(&table, &dataset)?;
        info!(%table, rows = dataset.len(), "Materialized table");
        Ok(true)
    }
}

/// Registry constructor for the CSV reader
pub fn build_csv(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (folder, target) = args.into_folder_to_zone(CSV_UNIT_NAME)?;
    Ok(Box::new(FormattedUnit::new(
        CSV_UNIT_NAME,
        SourceFormat::Csv,
        folder,
        target,
    )))
}

/// Registry constructor for the JSON reader
pub fn build_json(args: UnitArgs) -> Result<Box<dyn ProcessingUnit>, RegistryError> {
    let (folder, target) = args.into_folder_to_zone(JSON_UNIT_NAME)?;
    Ok(Box::new(FormattedUnit::new(
        JSON_UNIT_NAME,
        SourceFormat::Json,
        folder,
        target,
    )))
}

#[async_trait]
impl ProcessingUnit for FormattedUnit {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self) -> Result<()> {
        let files = list_source_files(&self.folder, self.format)?;
        let mut created = 0usize;
        for path in &files {
            if self.materialize(path).await? {
                created += 1;
            }
        }
        info!(
            unit = self.name,
            files = files.len(),
            created,
            "Formatted files"
        );
        Ok(())
    }
}

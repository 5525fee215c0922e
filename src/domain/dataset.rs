//! In-memory tabular dataset passed between pipeline steps.
//!
//! A `Dataset` is an ordered list of column names plus row-major cells.
//! Every transformation takes the dataset by value and hands back a new one,
//! so a step can never observe another step's output being mutated later.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Canonical text form used when timestamps are rendered or persisted
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised by shape-changing dataset operations
#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    #[error("Row {row} has {actual} cells, expected {expected}")]
    RowWidth {
        row: usize,
        actual: usize,
        expected: usize,
    },

    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Column '{name}' has {actual} values, dataset has {expected} rows")]
    ColumnLength {
        name: String,
        actual: usize,
        expected: usize,
    },
}

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Missing-value marker check (NaN counts as missing)
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    /// Borrow the value as text, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the value is numeric or parses as a number
    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Infer a typed value from raw text (empty → missing)
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        Value::Text(raw.to_string())
    }

    /// Stable key used for equality in de-duplication and grouping.
    ///
    /// Missing values share one key, matching how duplicate detection treats
    /// two missing identifiers as equal.
    pub fn key(&self) -> String {
        match self {
            Value::Null => "\u{0}null".to_string(),
            Value::Float(f) if f.is_nan() => "\u{0}null".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Int(i) => format!("n:{i}"),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9e15 => format!("n:{}", *f as i64),
            Value::Float(f) => format!("n:{f}"),
            Value::Text(s) => format!("s:{s}"),
            Value::Timestamp(t) => format!("t:{}", t.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered columns with row-major cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns
    pub fn new(columns: Vec<String>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a dataset from columns and rows, validating row widths
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, DatasetError> {
        let mut dataset = Self::new(columns)?;
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows in order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell lookup by row ordinal and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DatasetError> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::RowWidth {
                row: self.rows.len(),
                actual: row.len(),
                expected: self.columns.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Decompose into columns and rows
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    /// Row-wise outer union.
    ///
    /// Columns appear in first-seen order; cells of columns absent from a
    /// part are null-filled.
    pub fn concat(parts: Vec<Dataset>) -> Dataset {
        let mut columns: Vec<String> = Vec::new();
        for part in &parts {
            for column in &part.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(parts.iter().map(Dataset::len).sum());
        for part in parts {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| part.column_index(c)).collect();
            for row in part.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|m| m.map(|i| row[i].clone()).unwrap_or(Value::Null))
                        .collect(),
                );
            }
        }

        Dataset { columns, rows }
    }

    /// Rename every column through `f`
    pub fn rename_columns<F>(mut self, f: F) -> Result<Dataset, DatasetError>
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(c)).collect();
        let mut seen = HashSet::new();
        for column in &renamed {
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        self.columns = renamed;
        Ok(self)
    }

    /// Project onto the listed columns, in list order; absent names are skipped
    pub fn select(self, keep: &[&str]) -> Dataset {
        let indices: Vec<usize> = keep.iter().filter_map(|c| self.column_index(c)).collect();
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Dataset { columns, rows }
    }

    /// Remove the listed columns; absent names are ignored
    pub fn drop_columns(self, drop: &[&str]) -> Dataset {
        let keep: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !drop.contains(&c.as_str()))
            .cloned()
            .collect();
        let keep_refs: Vec<&str> = keep.iter().map(String::as_str).collect();
        self.select(&keep_refs)
    }

    /// Keep the first row of every natural-key group, preserving order
    pub fn dedup_by(self, keys: &[&str]) -> Dataset {
        let indices: Vec<usize> = keys.iter().filter_map(|k| self.column_index(k)).collect();
        if indices.is_empty() {
            return self;
        }

        let mut seen = HashSet::new();
        let Dataset { columns, rows } = self;
        let rows = rows
            .into_iter()
            .filter(|row| {
                let key: Vec<String> = indices.iter().map(|&i| row[i].key()).collect();
                seen.insert(key)
            })
            .collect();
        Dataset { columns, rows }
    }

    /// Keep rows for which `predicate` holds
    pub fn filter_rows<F>(self, predicate: F) -> Dataset
    where
        F: Fn(&Dataset, usize) -> bool,
    {
        let keep: Vec<bool> = (0..self.len()).map(|i| predicate(&self, i)).collect();
        let Dataset { columns, rows } = self;
        let rows = rows
            .into_iter()
            .zip(keep)
            .filter_map(|(row, k)| k.then_some(row))
            .collect();
        Dataset { columns, rows }
    }

    /// Rewrite every cell of one column; no-op when the column is absent
    pub fn map_column<F>(mut self, name: &str, f: F) -> Dataset
    where
        F: Fn(&Value) -> Value,
    {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
        self
    }

    /// Append a column, or overwrite it when the name already exists
    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> Result<Dataset, DatasetError> {
        if values.len() != self.rows.len() {
            return Err(DatasetError::ColumnLength {
                name: name.to_string(),
                actual: values.len(),
                expected: self.rows.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(self)
    }

    /// Move a column to the front
    pub fn move_to_front(self, name: &str) -> Dataset {
        if !self.has_column(name) {
            return self;
        }
        let mut order: Vec<&str> = vec![name];
        order.extend(self.columns.iter().map(String::as_str).filter(|c| *c != name));
        let order: Vec<String> = order.into_iter().map(String::from).collect();
        let refs: Vec<&str> = order.iter().map(String::as_str).collect();
        self.select(&refs)
    }

    /// Mean of the numeric values in each key group of `value_column`
    pub fn group_means(&self, keys: &[&str], value_column: &str) -> HashMap<Vec<String>, f64> {
        let key_idx: Vec<usize> = keys.iter().filter_map(|k| self.column_index(k)).collect();
        let mut sums: HashMap<Vec<String>, (f64, usize)> = HashMap::new();
        let Some(value_idx) = self.column_index(value_column) else {
            return HashMap::new();
        };
        if key_idx.len() != keys.len() {
            return HashMap::new();
        }

        for row in &self.rows {
            if let Some(v) = row[value_idx].as_f64() {
                let key = key_idx.iter().map(|&i| row[i].key()).collect();
                let entry = sums.entry(key).or_insert((0.0, 0));
                entry.0 += v;
                entry.1 += 1;
            }
        }

        sums.into_iter()
            .map(|(k, (sum, n))| (k, sum / n as f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_concat_outer_union_null_fills() {
        let a = Dataset::from_rows(cols(&["id", "a"]), vec![vec![1i64.into(), "x".into()]]).unwrap();
        let b = Dataset::from_rows(cols(&["id", "b"]), vec![vec![2i64.into(), "y".into()]]).unwrap();

        let merged = Dataset::concat(vec![a, b]);

        assert_eq!(merged.columns(), &cols(&["id", "a", "b"])[..]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(0, "b"), Some(&Value::Null));
        assert_eq!(merged.get(1, "a"), Some(&Value::Null));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let ds = Dataset::from_rows(
            cols(&["id", "v"]),
            vec![
                vec![1i64.into(), "first".into()],
                vec![2i64.into(), "other".into()],
                vec![1i64.into(), "second".into()],
            ],
        )
        .unwrap();

        let deduped = ds.dedup_by(&["id"]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped.get(0, "v"), Some(&Value::from("first")));
    }

    #[test]
    fn test_int_and_integral_float_share_key() {
        assert_eq!(Value::Int(3).key(), Value::Float(3.0).key());
        assert_ne!(Value::Int(3).key(), Value::Text("3".into()).key());
    }

    #[test]
    fn test_row_width_is_validated() {
        let mut ds = Dataset::new(cols(&["a", "b"])).unwrap();
        let err = ds.push_row(vec![Value::Null]).unwrap_err();
        assert!(matches!(err, DatasetError::RowWidth { expected: 2, .. }));
    }

    #[test]
    fn test_select_skips_absent_columns() {
        let ds = Dataset::from_rows(cols(&["a", "b"]), vec![vec![1i64.into(), 2i64.into()]]).unwrap();
        let projected = ds.select(&["b", "missing", "a"]);
        assert_eq!(projected.columns(), &cols(&["b", "a"])[..]);
    }

    #[test]
    fn test_value_inference() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("42"), Value::Int(42));
        assert_eq!(Value::infer("4.5"), Value::Float(4.5));
        assert_eq!(Value::infer("Sedan"), Value::Text("Sedan".into()));
    }
}

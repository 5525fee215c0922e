//! Reusable cleaning steps.
//!
//! Every function here takes the working dataset by value and returns the
//! next one. Helpers that need a column tolerate its absence and return the
//! input unchanged.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::CleaningSettings;
use crate::domain::{Dataset, DatasetError, Value};

/// Signature of a pipeline step slot
pub type Step = fn(Dataset, &CleaningSettings) -> Result<Dataset, DatasetError>;

/// Default slot: pass the dataset through
pub fn identity(data: Dataset, _settings: &CleaningSettings) -> Result<Dataset, DatasetError> {
    Ok(data)
}

/// Lower-case a name and turn whitespace runs into underscores
pub fn snake_case(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Default column normalization
pub fn snake_case_columns(
    data: Dataset,
    _settings: &CleaningSettings,
) -> Result<Dataset, DatasetError> {
    data.rename_columns(snake_case)
}

/// Split camel-case tokens: `OverallFrontCrashRating` → `overall_front_crash_rating`
pub fn camel_to_snake(name: &str) -> String {
    let name = name.replace("NHTSA", "nhtsa");
    let mut out = String::with_capacity(name.len() + 8);
    for (i, c) in name.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(c);
    }
    out.replace('-', "_").to_lowercase()
}

/// Whether a cell is digit-only noise in a text column
pub fn is_digit_noise(value: &Value) -> bool {
    match value {
        Value::Int(_) => true,
        Value::Float(f) => !f.is_nan(),
        Value::Text(s) => {
            let s = s.trim();
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Replace exact text sentinels with missing, in every column
pub fn null_sentinels(data: Dataset, sentinels: &[&str]) -> Dataset {
    let columns: Vec<String> = data.columns().to_vec();
    columns.iter().fold(data, |data, column| {
        data.map_column(column, |v| match v {
            Value::Text(s) if sentinels.contains(&s.trim()) => Value::Null,
            other => other.clone(),
        })
    })
}

/// Apply a correction table to text cells of the listed columns.
///
/// A `None` replacement marks the value missing.
pub fn correct_values(
    data: Dataset,
    columns: &[&str],
    corrections: &[(&str, Option<&str>)],
) -> Dataset {
    columns.iter().fold(data, |data, column| {
        data.map_column(column, |v| {
            let text = match v {
                Value::Text(s) => s.trim(),
                other => return other.clone(),
            };
            match corrections.iter().find(|(from, _)| *from == text) {
                Some((_, Some(to))) => Value::Text((*to).to_string()),
                Some((_, None)) => Value::Null,
                None => v.clone(),
            }
        })
    })
}

/// Coerce a column to integers; non-numeric cells become missing
pub fn to_integer(data: Dataset, column: &str) -> Dataset {
    data.map_column(column, |v| match v.as_f64() {
        Some(f) => Value::Int(f.round() as i64),
        None => Value::Null,
    })
}

/// Coerce a column to floats; non-numeric cells become missing
pub fn to_float(data: Dataset, column: &str) -> Dataset {
    data.map_column(column, |v| v.as_f64().map(Value::Float).unwrap_or(Value::Null))
}

/// Indicator column name for a category value
fn indicator_name(prefix: Option<&str>, value: &str) -> String {
    match prefix {
        Some(prefix) => snake_case(&format!("{}_{}", prefix, value)),
        None => snake_case(value),
    }
}

/// Indicator columns for the non-missing values found in `indices`.
///
/// Values whose indicator names coincide (case or spacing variants) share
/// one column, set when any of them is present. Columns come out in name
/// order, skipping the first `skip`.
fn indicator_columns(
    data: &Dataset,
    indices: &[usize],
    prefix: Option<&str>,
    skip: usize,
) -> Vec<(String, Vec<Value>)> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in data.rows() {
        for &i in indices {
            if row[i].is_null() {
                continue;
            }
            let raw = row[i].to_string();
            groups
                .entry(indicator_name(prefix, &raw))
                .or_default()
                .insert(raw);
        }
    }

    groups
        .into_iter()
        .skip(skip)
        .map(|(name, raws)| {
            let values = data
                .rows()
                .iter()
                .map(|row| {
                    let hit = indices
                        .iter()
                        .any(|&i| !row[i].is_null() && raws.contains(&row[i].to_string()));
                    Value::Int(hit as i64)
                })
                .collect();
            (name, values)
        })
        .collect()
}

/// Collapse parallel category columns into one indicator column per distinct
/// value across all of them. Sources are dropped; indicators are 0/1 and
/// appended in sorted name order.
pub fn one_hot_union(
    data: Dataset,
    sources: &[&str],
    prefix: Option<&str>,
) -> Result<Dataset, DatasetError> {
    let indices: Vec<usize> = sources.iter().filter_map(|c| data.column_index(c)).collect();
    if indices.is_empty() {
        return Ok(data);
    }

    let indicators = indicator_columns(&data, &indices, prefix, 0);
    let mut data = data.drop_columns(sources);
    for (name, values) in indicators {
        data = data.with_column(&name, values)?;
    }
    Ok(data)
}

/// One-hot encode a single column; missing cells get all-zero indicators.
///
/// With `drop_first`, the first indicator in name order is omitted.
pub fn one_hot_column(
    data: Dataset,
    column: &str,
    prefix: Option<&str>,
    drop_first: bool,
) -> Result<Dataset, DatasetError> {
    let Some(idx) = data.column_index(column) else {
        return Ok(data);
    };

    let indicators = indicator_columns(&data, &[idx], prefix, usize::from(drop_first));
    let mut data = data.drop_columns(&[column]);
    for (name, values) in indicators {
        data = data.with_column(&name, values)?;
    }
    Ok(data)
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Timestamp(ts) => Some(ts.date()),
        Value::Text(s) => {
            let s = s.trim();
            // ISO strings may carry a time part we do not need
            let date_part = s.split(['T', ' ']).next().unwrap_or(s);
            NaiveDate::parse_from_str(s, "%m/%d/%Y")
                .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y-%m-%d"))
                .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
                .ok()
        }
        _ => None,
    }
}

fn parse_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Timestamp(ts) => Some(ts.time()),
        Value::Text(s) => {
            let s = s.trim();
            NaiveTime::parse_from_str(s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .ok()
        }
        _ => None,
    }
}

/// Combine date and time cells into one timestamp column.
///
/// Source columns are dropped; an unparseable pair yields missing.
pub fn combine_datetime(
    data: Dataset,
    date_column: &str,
    time_column: &str,
    output: &str,
) -> Result<Dataset, DatasetError> {
    let (Some(date_idx), Some(time_idx)) =
        (data.column_index(date_column), data.column_index(time_column))
    else {
        return Ok(data);
    };

    let combined: Vec<Value> = data
        .rows()
        .iter()
        .map(|row| {
            match (parse_date(&row[date_idx]), parse_time(&row[time_idx])) {
                (Some(d), Some(t)) => Value::Timestamp(NaiveDateTime::new(d, t)),
                _ => Value::Null,
            }
        })
        .collect();

    data.drop_columns(&[date_column, time_column])
        .with_column(output, combined)
}

/// Drop rows missing any of the listed columns
pub fn drop_missing(data: Dataset, columns: &[&str]) -> Dataset {
    let indices: Vec<usize> = columns.iter().filter_map(|c| data.column_index(c)).collect();
    data.filter_rows(|ds, i| indices.iter().all(|&c| !ds.rows()[i][c].is_null()))
}

/// Columns whose present cells are all numeric, excluding `exclude`
pub fn numeric_columns(data: &Dataset, exclude: &[&str]) -> Vec<String> {
    data.columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !exclude.contains(&name.as_str()))
        .filter(|(i, _)| {
            data.rows()
                .iter()
                .map(|row| &row[*i])
                .filter(|v| !v.is_null())
                .all(|v| matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_)))
        })
        .map(|(_, name)| name.clone())
        .collect()
}

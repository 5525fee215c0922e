//! SQLite-backed table store (one database file per zone).
//!
//! Column types are inferred from the data when a table is created and
//! restored from the declared types on read, so timestamps survive a round
//! trip through the store.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};
use tracing::debug;

use crate::domain::{Dataset, Value, TIMESTAMP_FORMAT};

use super::{quote_ident, StoreError, TableStore};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Float(f) if f.is_nan() => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(*b as i64),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Timestamp(t) => ToSqlOutput::from(t.format(TIMESTAMP_FORMAT).to_string()),
        })
    }
}

/// Declared SQL type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
    Timestamp,
}

impl ColumnType {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Narrowest type that holds every non-missing value of a column
    fn infer<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut inferred: Option<ColumnType> = None;
        for value in values {
            let this = match value {
                v if v.is_null() => continue,
                Value::Bool(_) | Value::Int(_) => ColumnType::Integer,
                Value::Float(_) => ColumnType::Real,
                Value::Timestamp(_) => ColumnType::Timestamp,
                Value::Text(_) | Value::Null => ColumnType::Text,
            };
            inferred = Some(match (inferred, this) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Integer), ColumnType::Real)
                | (Some(ColumnType::Real), ColumnType::Integer) => ColumnType::Real,
                _ => ColumnType::Text,
            });
            if inferred == Some(ColumnType::Text) {
                break;
            }
        }
        inferred.unwrap_or(ColumnType::Text)
    }
}

/// Table store persisted in a single SQLite database
pub struct SqliteTableStore {
    label: String,
    conn: Mutex<Connection>,
}

impl SqliteTableStore {
    /// Open (or create) the database file at `path`
    pub fn open(label: impl Into<String>, path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            label: label.into(),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database
    pub fn in_memory(label: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            label: label.into(),
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn table_columns(conn: &Connection, name: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
        let columns = stmt
            .query_map([], |row| {
                let column: String = row.get(1)?;
                let declared: String = row.get(2)?;
                Ok((column, declared))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create(conn: &Connection, name: &str, data: &Dataset) -> Result<(), StoreError> {
        if data.width() == 0 {
            return Err(StoreError::NoColumns(name.to_string()));
        }
        let definitions: Vec<String> = data
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let kind = ColumnType::infer(data.rows().iter().map(|r| &r[i]));
                format!("{} {}", quote_ident(column), kind.as_sql())
            })
            .collect();
        conn.execute(
            &format!("CREATE TABLE {} ({})", quote_ident(name), definitions.join(", ")),
            [],
        )?;
        Ok(())
    }

    fn append(conn: &Connection, name: &str, data: &Dataset) -> Result<(), StoreError> {
        if data.width() == 0 || data.is_empty() {
            return Ok(());
        }
        let columns: Vec<String> = data.columns().iter().map(|c| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(name),
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        for row in data.rows() {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(())
    }

    fn read_value(value: ValueRef<'_>, declared: &str) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                if declared.eq_ignore_ascii_case("TIMESTAMP") {
                    if let Ok(ts) = NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT) {
                        return Value::Timestamp(ts);
                    }
                }
                Value::Text(text)
            }
        }
    }
}

impl TableStore for SqliteTableStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn exists_table(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        Self::table_exists(&conn, name)
    }

    fn get_table(&self, name: &str) -> Result<Dataset, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let schema = Self::table_columns(&conn, name)?;
        if schema.is_empty() {
            return Err(StoreError::TableNotFound(name.to_string()));
        }

        let mut dataset = Dataset::new(schema.iter().map(|(c, _)| c.clone()).collect())?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(schema.len());
            for (i, (_, declared)) in schema.iter().enumerate() {
                cells.push(Self::read_value(row.get_ref(i)?, declared));
            }
            dataset.push_row(cells)?;
        }
        Ok(dataset)
    }

    fn insert_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;

        if Self::table_exists(&tx, name)? {
            let existing = Self::table_columns(&tx, name)?;
            if let Some(column) = data
                .columns()
                .iter()
                .find(|c| !existing.iter().any(|(e, _)| e == *c))
            {
                return Err(StoreError::SchemaMismatch {
                    table: name.to_string(),
                    column: column.clone(),
                });
            }
        } else {
            Self::create(&tx, name, data)?;
        }
        Self::append(&tx, name, data)?;
        tx.commit()?;

        debug!(store = %self.label, table = name, rows = data.len(), "Inserted rows");
        Ok(())
    }

    fn replace_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        Self::create(&tx, name, data)?;
        Self::append(&tx, name, data)?;
        tx.commit()?;

        debug!(store = %self.label, table = name, rows = data.len(), "Replaced table");
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

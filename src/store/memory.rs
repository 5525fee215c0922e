//! In-process table store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::Dataset;

use super::{StoreError, TableStore};

/// Table store held entirely in memory; tables list in name order
pub struct MemoryTableStore {
    label: String,
    tables: Mutex<BTreeMap<String, Dataset>>,
}

impl MemoryTableStore {
    /// Create an empty store
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seed a table (builder style, for fixtures)
    pub fn with_table(self, name: &str, data: Dataset) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.insert(name.to_string(), data);
        }
        self
    }
}

impl TableStore for MemoryTableStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn exists_table(&self, name: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.contains_key(name))
    }

    fn get_table(&self, name: &str) -> Result<Dataset, StoreError> {
        let tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn insert_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        match tables.remove(name) {
            Some(existing) => {
                if let Some(column) = data.columns().iter().find(|c| !existing.has_column(c)) {
                    let err = StoreError::SchemaMismatch {
                        table: name.to_string(),
                        column: column.clone(),
                    };
                    tables.insert(name.to_string(), existing);
                    return Err(err);
                }
                let merged = Dataset::concat(vec![existing, data.clone()]);
                tables.insert(name.to_string(), merged);
            }
            None => {
                if data.width() == 0 {
                    return Err(StoreError::NoColumns(name.to_string()));
                }
                tables.insert(name.to_string(), data.clone());
            }
        }
        Ok(())
    }

    fn replace_table(&self, name: &str, data: &Dataset) -> Result<(), StoreError> {
        if data.width() == 0 {
            return Err(StoreError::NoColumns(name.to_string()));
        }
        let mut tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        tables.insert(name.to_string(), data.clone());
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.keys().cloned().collect())
    }
}

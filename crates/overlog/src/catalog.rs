//! The per-instance table catalog.

use crate::{
    datum::DataType,
    error::Error,
    schema::Schema,
    storage::{MemTable, Table},
};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// A catalog entry: one named relation, its schema, key columns, optional
/// location column, and its owned storage instance.
pub struct TableDef {
    name: String,
    schema: Schema,
    key_cols: Vec<usize>,
    loc_col: Option<usize>,
    storage: Mutex<Box<dyn Table>>,
}

impl TableDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_cols(&self) -> &[usize] {
        &self.key_cols
    }

    /// The column designating the owning network address, if the relation is
    /// not purely local.
    pub fn loc_col(&self) -> Option<usize> {
        self.loc_col
    }

    /// The relation's storage. Mutated only by the router thread once the
    /// runtime is started; the lock is uncontended in steady state.
    pub fn storage(&self) -> &Mutex<Box<dyn Table>> {
        &self.storage
    }
}

/// Process-wide-per-instance lookup state: table name to definition. Define
/// and delete are synchronous, caller-thread operations; they must not race
/// router execution (quiesce first), though the interior locks keep either
/// order memory-safe.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<TableDef>>>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Defines a new relation backed by [`MemTable`] storage. Fails with
    /// [`Error::DuplicateTable`] if the name exists; no state changes on
    /// failure.
    pub fn define_table(
        &self,
        name: &str,
        schema: Schema,
        key_cols: Vec<usize>,
        loc_col: Option<usize>,
    ) -> Result<Arc<TableDef>, Error> {
        for &col in key_cols.iter().chain(loc_col.iter()) {
            if col >= schema.len() {
                return Err(Error::ArityMismatch {
                    table: name.to_string(),
                    expected: schema.len(),
                    actual: col + 1,
                });
            }
        }
        // The location column carries a network address.
        if let Some(col) = loc_col {
            if schema.ty(col) != DataType::String {
                return Err(Error::TypeMismatch {
                    context: format!("location column {col} of '{name}'"),
                    expected: DataType::String,
                    actual: schema.ty(col),
                });
            }
        }

        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(name) {
            return Err(Error::DuplicateTable {
                name: name.to_string(),
            });
        }
        let def = Arc::new(TableDef {
            name: name.to_string(),
            schema,
            key_cols,
            loc_col,
            storage: Mutex::new(Box::new(MemTable::new())),
        });
        tables.insert(name.to_string(), def.clone());
        Ok(def)
    }

    /// Removes a relation and releases its storage (unpinning every stored
    /// tuple).
    pub fn delete_table(&self, name: &str) -> Result<(), Error> {
        let mut tables = self.tables.write().unwrap();
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownTable {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<Arc<TableDef>> {
        self.tables.read().unwrap().get(name).cloned()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TableDef>, Error> {
        self.get(name).ok_or_else(|| Error::UnknownTable {
            name: name.to_string(),
        })
    }
}

//! In-memory hash-keyed relation storage.

use super::Table;
use crate::hash::DefaultBuildHasher;
use crate::tuple::Tuple;
use hashbrown::HashSet;

/// The default [`Table`] backend: a hash set keyed by schema-aware tuple
/// equality and hash. Stored tuples hold one pin each, released when the
/// tuple is deleted or the table is dropped.
#[derive(Default)]
pub struct MemTable {
    tuples: HashSet<Tuple, DefaultBuildHasher>,
}

impl MemTable {
    pub fn new() -> MemTable {
        MemTable::default()
    }
}

impl Table for MemTable {
    fn insert(&mut self, tuple: Tuple) -> bool {
        self.tuples.insert(tuple)
    }

    fn delete(&mut self, tuple: &Tuple) -> bool {
        self.tuples.remove(tuple)
    }

    fn scan(&self) -> Box<dyn Iterator<Item = Tuple> + '_> {
        Box::new(self.tuples.iter().cloned())
    }

    fn len(&self) -> usize {
        self.tuples.len()
    }
}

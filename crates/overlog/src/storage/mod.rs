//! Storage contract for relation backends.

use crate::tuple::Tuple;

mod mem;
pub use mem::MemTable;

/// The contract any relation backend must satisfy. One instance stores the
/// content of one relation; the router thread is the only mutator once the
/// runtime is started.
pub trait Table: Send {
    /// Inserts a tuple, deduplicating by full-tuple equality. Returns `true`
    /// iff the tuple was not already present.
    fn insert(&mut self, tuple: Tuple) -> bool;

    /// Removes a tuple equal to `tuple`. Returns `true` iff something was
    /// removed.
    fn delete(&mut self, tuple: &Tuple) -> bool;

    /// Iterates over the current content. Each yielded tuple is a fresh pin.
    fn scan(&self) -> Box<dyn Iterator<Item = Tuple> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

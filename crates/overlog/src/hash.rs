//! Hashing utilities.

use std::hash::{BuildHasherDefault, Hash, Hasher};
use xxhash_rust::xxh3::Xxh3Default;

/// The hasher behind tuple deduplication.
pub type DefaultBuildHasher = BuildHasherDefault<Xxh3Default>;

/// Default hashing function used for tuple deduplication and dispatch keys.
pub fn default_hash<T: Hash + ?Sized>(x: &T) -> u64 {
    let mut hasher = Xxh3Default::new();
    x.hash(&mut hasher);
    hasher.finish()
}

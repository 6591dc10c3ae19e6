//! An incremental runtime for a distributed Datalog dialect.
//!
//! Programs declare typed relations and delta rules over them. Installing a
//! program compiles each rule into operator chains triggered by insertions
//! into its body relations; a single router thread then drains a bounded
//! work queue, applying each incoming tuple and every derivation it causes
//! to fixpoint before taking the next item. Relations may carry a location
//! column; tuples located at another address are handed to a [`Network`]
//! implementation instead of being stored locally.

pub mod ast;

mod catalog;
pub use catalog::{Catalog, TableDef};

mod datum;
pub use datum::{DataType, Datum, Str};

mod error;
pub use error::{DetailedError, Error};

mod expr;
mod hash;

mod network;
pub use network::{Network, NullNetwork, RecordingNetwork};

mod operator;
mod planner;
mod router;

mod runtime;
pub use runtime::{Runtime, RuntimeConfig};

mod schema;
pub use schema::Schema;

pub mod storage;

mod timer;
pub use timer::Timer;

mod tuple;
pub use tuple::Tuple;

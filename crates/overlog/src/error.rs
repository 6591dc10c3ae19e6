//! Error types reported by the runtime.

use crate::datum::DataType;
use serde::Serialize;
use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
};

/// Errors that carry a stable, machine-readable error code in addition to
/// the human-readable `Display` form.
pub trait DetailedError: StdError + Serialize {
    fn error_code(&self) -> Cow<'static, str>;
}

/// Errors reported by the catalog, planner, router, and codecs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Error {
    /// A table with this name is already defined in the catalog.
    DuplicateTable { name: String },
    /// The named table is not present in the catalog.
    UnknownTable { name: String },
    /// A body clause of `rule` can never be connected to the chain's delta
    /// relation through any join path.
    Infeasible { rule: String, table: String },
    /// A head or qualifier expression references a variable that no body
    /// clause binds.
    UnboundVariable { rule: String, variable: String },
    /// A tuple or clause has the wrong number of columns for its table.
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },
    /// A datum's runtime variant does not match the declared column type.
    TypeMismatch {
        context: String,
        expected: DataType,
        actual: DataType,
    },
    /// A rule is structurally invalid (e.g. an aggregate outside the head).
    InvalidRule { rule: String, reason: String },
    /// A decode consumed more bytes than are buffered.
    Underrun { needed: usize, remaining: usize },
    /// Runtime expression evaluation failed.
    Eval { reason: String },
    /// Malformed text input to a datum parse.
    InvalidText { ty: DataType, input: String },
    /// The runtime has shut down; the work queue no longer accepts items.
    Terminated,
}

impl DetailedError for Error {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::DuplicateTable { .. } => Cow::from("DuplicateTable"),
            Self::UnknownTable { .. } => Cow::from("UnknownTable"),
            Self::Infeasible { .. } => Cow::from("Infeasible"),
            Self::UnboundVariable { .. } => Cow::from("UnboundVariable"),
            Self::ArityMismatch { .. } => Cow::from("ArityMismatch"),
            Self::TypeMismatch { .. } => Cow::from("TypeMismatch"),
            Self::InvalidRule { .. } => Cow::from("InvalidRule"),
            Self::Underrun { .. } => Cow::from("Underrun"),
            Self::Eval { .. } => Cow::from("Eval"),
            Self::InvalidText { .. } => Cow::from("InvalidText"),
            Self::Terminated => Cow::from("Terminated"),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::DuplicateTable { name } => {
                write!(f, "duplicate table definition: '{name}'")
            }
            Self::UnknownTable { name } => write!(f, "no such table: '{name}'"),
            Self::Infeasible { rule, table } => {
                write!(
                    f,
                    "rule '{rule}': clause over '{table}' cannot be joined to the delta relation"
                )
            }
            Self::UnboundVariable { rule, variable } => {
                write!(f, "rule '{rule}': variable '{variable}' is never bound")
            }
            Self::ArityMismatch {
                table,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "table '{table}' has {expected} columns, but {actual} were supplied"
                )
            }
            Self::TypeMismatch {
                context,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "{context}: expected {}, got {}",
                    expected.name(),
                    actual.name()
                )
            }
            Self::InvalidRule { rule, reason } => {
                write!(f, "rule '{rule}' is invalid: {reason}")
            }
            Self::Underrun { needed, remaining } => {
                write!(
                    f,
                    "decode underrun: needed {needed} bytes, {remaining} buffered"
                )
            }
            Self::Eval { reason } => write!(f, "expression evaluation failed: {reason}"),
            Self::InvalidText { ty, input } => {
                write!(f, "cannot parse '{input}' as {}", ty.name())
            }
            Self::Terminated => f.write_str("runtime has been terminated"),
        }
    }
}

impl StdError for Error {}

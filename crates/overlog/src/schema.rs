//! Table schemas.

use crate::{datum::DataType, datum::Datum, error::Error};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// An ordered, fixed-length list of column types. Immutable once built; two
/// schemas are equal iff they have the same length and identical type
/// sequence, position-wise.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Schema {
    types: Arc<[DataType]>,
}

impl Schema {
    pub fn new(types: impl Into<Vec<DataType>>) -> Schema {
        Schema {
            types: Arc::from(types.into().into_boxed_slice()),
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn ty(&self, col: usize) -> DataType {
        self.types[col]
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// Checks that `values` matches this schema exactly: same column count,
    /// and every datum's runtime variant equal to the declared type.
    pub fn validate(&self, table: &str, values: &[Datum]) -> Result<(), Error> {
        if values.len() != self.len() {
            return Err(Error::ArityMismatch {
                table: table.to_string(),
                expected: self.len(),
                actual: values.len(),
            });
        }
        for (col, value) in values.iter().enumerate() {
            if value.ty() != self.ty(col) {
                return Err(Error::TypeMismatch {
                    context: format!("column {col} of '{table}'"),
                    expected: self.ty(col),
                    actual: value.ty(),
                });
            }
        }
        Ok(())
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, ty) in self.types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod test {
    use super::Schema;
    use crate::datum::{DataType, Datum};
    use crate::error::Error;

    #[test]
    fn equality_is_positional() {
        let a = Schema::new(vec![DataType::Int, DataType::String]);
        let b = Schema::new(vec![DataType::Int, DataType::String]);
        let c = Schema::new(vec![DataType::String, DataType::Int]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Schema::new(vec![DataType::Int]));
    }

    #[test]
    fn validate_checks_arity_and_types() {
        let schema = Schema::new(vec![DataType::Int, DataType::String]);
        assert!(schema
            .validate("t", &[Datum::Int(1), Datum::string("x")])
            .is_ok());
        assert!(matches!(
            schema.validate("t", &[Datum::Int(1)]),
            Err(Error::ArityMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            schema.validate("t", &[Datum::Int(1), Datum::Int(2)]),
            Err(Error::TypeMismatch { .. })
        ));
    }
}

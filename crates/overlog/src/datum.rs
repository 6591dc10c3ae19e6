//! Scalar values and their type-dispatched operations.
//!
//! A [`Datum`] is a tagged scalar: the runtime variant always matches the
//! [`DataType`] declared for its column, and equality, ordering, and hashing
//! are dispatched on the tag rather than inferred from content. Strings are
//! immutable, length-delimited byte buffers under shared ownership; every
//! other variant is copied by value.

use crate::error::Error;
use bytes::{Buf, BufMut};
use serde::Serialize;
use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// The closed set of column types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum DataType {
    Bool,
    Char,
    Double,
    Int,
    String,
}

impl DataType {
    /// Resolves a textual type name from a table declaration.
    pub fn from_name(name: &str) -> Option<DataType> {
        match name {
            "bool" => Some(DataType::Bool),
            "char" => Some(DataType::Char),
            "double" => Some(DataType::Double),
            "int" | "int8" => Some(DataType::Int),
            "string" => Some(DataType::String),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Char => "char",
            DataType::Double => "double",
            DataType::Int => "int",
            DataType::String => "string",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Double)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable, reference-counted byte string. No terminator is stored;
/// the length lives in the shared header. Cloning bumps the count.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Str(Arc<[u8]>);

impl Str {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str(Arc::from(s.as_bytes()))
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Arc::from(s.into_bytes().into_boxed_slice()))
    }
}

impl From<&[u8]> for Str {
    fn from(b: &[u8]) -> Self {
        Str(Arc::from(b))
    }
}

impl Display for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

/// A single scalar value.
#[derive(Clone, Debug)]
pub enum Datum {
    Bool(bool),
    Char(u8),
    Double(f64),
    Int(i64),
    String(Str),
}

impl Datum {
    pub fn string(s: &str) -> Datum {
        Datum::String(Str::from(s))
    }

    pub fn ty(&self) -> DataType {
        match self {
            Datum::Bool(_) => DataType::Bool,
            Datum::Char(_) => DataType::Char,
            Datum::Double(_) => DataType::Double,
            Datum::Int(_) => DataType::Int,
            Datum::String(_) => DataType::String,
        }
    }

    /// Parses the textual form of a datum of the given type.
    pub fn from_text(ty: DataType, input: &str) -> Result<Datum, Error> {
        let invalid = || Error::InvalidText {
            ty,
            input: input.to_string(),
        };
        match ty {
            DataType::Bool => match input {
                "true" => Ok(Datum::Bool(true)),
                "false" => Ok(Datum::Bool(false)),
                _ => Err(invalid()),
            },
            DataType::Char => {
                let mut bytes = input.bytes();
                match (bytes.next(), bytes.next()) {
                    (Some(c), None) => Ok(Datum::Char(c)),
                    _ => Err(invalid()),
                }
            }
            DataType::Double => input
                .parse::<f64>()
                .map(Datum::Double)
                .map_err(|_| invalid()),
            DataType::Int => input.parse::<i64>().map(Datum::Int).map_err(|_| invalid()),
            DataType::String => Ok(Datum::string(input)),
        }
    }

    /// Serializes the datum into `buf`. Strings are written as a u32
    /// big-endian length prefix followed by the raw bytes.
    pub fn write_to(&self, buf: &mut impl BufMut) {
        match self {
            Datum::Bool(b) => buf.put_u8(*b as u8),
            Datum::Char(c) => buf.put_u8(*c),
            Datum::Double(d) => buf.put_f64(*d),
            Datum::Int(i) => buf.put_i64(*i),
            Datum::String(s) => {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }

    /// Deserializes one datum of the given type from `buf`. Reading past the
    /// buffered bytes is a hard decode failure, never a panic.
    pub fn read_from(ty: DataType, buf: &mut impl Buf) -> Result<Datum, Error> {
        fn need(buf: &impl Buf, n: usize) -> Result<(), Error> {
            if buf.remaining() < n {
                Err(Error::Underrun {
                    needed: n,
                    remaining: buf.remaining(),
                })
            } else {
                Ok(())
            }
        }

        match ty {
            DataType::Bool => {
                need(buf, 1)?;
                Ok(Datum::Bool(buf.get_u8() != 0))
            }
            DataType::Char => {
                need(buf, 1)?;
                Ok(Datum::Char(buf.get_u8()))
            }
            DataType::Double => {
                need(buf, 8)?;
                Ok(Datum::Double(buf.get_f64()))
            }
            DataType::Int => {
                need(buf, 8)?;
                Ok(Datum::Int(buf.get_i64()))
            }
            DataType::String => {
                need(buf, 4)?;
                let len = buf.get_u32() as usize;
                need(buf, len)?;
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                Ok(Datum::String(Str::from(bytes.as_slice())))
            }
        }
    }
}

// Equality, ordering, and hashing dispatch on the type tag. Doubles use the
// IEEE total order so that `Eq` and `Hash` agree.
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Char(a), Datum::Char(b)) => a == b,
            (Datum::Double(a), Datum::Double(b)) => a.total_cmp(b) == Ordering::Equal,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::String(a), Datum::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Bool(a), Datum::Bool(b)) => Some(a.cmp(b)),
            (Datum::Char(a), Datum::Char(b)) => Some(a.cmp(b)),
            (Datum::Double(a), Datum::Double(b)) => Some(a.total_cmp(b)),
            (Datum::Int(a), Datum::Int(b)) => Some(a.cmp(b)),
            (Datum::String(a), Datum::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Datum::Bool(b) => {
                state.write_u8(0);
                b.hash(state);
            }
            Datum::Char(c) => {
                state.write_u8(1);
                c.hash(state);
            }
            Datum::Double(d) => {
                state.write_u8(2);
                d.to_bits().hash(state);
            }
            Datum::Int(i) => {
                state.write_u8(3);
                i.hash(state);
            }
            Datum::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
        }
    }
}

impl Display for Datum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Char(c) => write!(f, "{}", *c as char),
            Datum::Double(d) => write!(f, "{d}"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::String(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{DataType, Datum, Str};
    use crate::error::Error;
    use crate::hash::default_hash;

    #[test]
    fn type_names_round_trip() {
        for ty in [
            DataType::Bool,
            DataType::Char,
            DataType::Double,
            DataType::Int,
            DataType::String,
        ] {
            assert_eq!(DataType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(DataType::from_name("int8"), Some(DataType::Int));
        assert_eq!(DataType::from_name("blob"), None);
    }

    #[test]
    fn equality_is_type_dispatched() {
        assert_ne!(Datum::Int(1), Datum::Double(1.0));
        assert_ne!(Datum::Bool(true), Datum::Int(1));
        assert_eq!(Datum::string("x"), Datum::string("x"));
        assert_ne!(Datum::string("x"), Datum::string("y"));
    }

    #[test]
    fn double_eq_and_hash_agree() {
        let a = Datum::Double(0.5);
        let b = Datum::Double(0.5);
        assert_eq!(a, b);
        assert_eq!(default_hash(&a), default_hash(&b));
        // -0.0 and 0.0 are distinct under the total order.
        assert_ne!(Datum::Double(0.0), Datum::Double(-0.0));
    }

    #[test]
    fn text_parsing() {
        assert_eq!(
            Datum::from_text(DataType::Int, "42").unwrap(),
            Datum::Int(42)
        );
        assert_eq!(
            Datum::from_text(DataType::Bool, "true").unwrap(),
            Datum::Bool(true)
        );
        assert_eq!(
            Datum::from_text(DataType::Char, "a").unwrap(),
            Datum::Char(b'a')
        );
        assert!(matches!(
            Datum::from_text(DataType::Int, "forty-two"),
            Err(Error::InvalidText { .. })
        ));
    }

    #[test]
    fn binary_round_trip() {
        let values = [
            Datum::Bool(true),
            Datum::Char(b'z'),
            Datum::Double(2.25),
            Datum::Int(-7),
            Datum::string("hello"),
        ];
        for v in &values {
            let mut buf = Vec::new();
            v.write_to(&mut buf);
            let mut slice = buf.as_slice();
            assert_eq!(&Datum::read_from(v.ty(), &mut slice).unwrap(), v);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn decode_underrun_is_an_error() {
        let mut buf = Vec::new();
        Datum::string("hello").write_to(&mut buf);
        // Truncate mid-payload.
        let mut slice = &buf[..buf.len() - 2];
        assert!(matches!(
            Datum::read_from(DataType::String, &mut slice),
            Err(Error::Underrun { .. })
        ));
        let mut empty: &[u8] = &[];
        assert!(matches!(
            Datum::read_from(DataType::Int, &mut empty),
            Err(Error::Underrun { .. })
        ));
    }

    #[test]
    fn shared_strings_are_refcounted() {
        let s = Str::from("shared");
        let d1 = Datum::String(s.clone());
        let d2 = d1.clone();
        assert_eq!(d1, d2);
        drop(d1);
        assert_eq!(d2, Datum::string("shared"));
    }
}

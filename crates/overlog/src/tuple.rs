//! Reference-counted, immutable tuples.
//!
//! A [`Tuple`] is the unit of dataflow: an ordered vector of datums bound to
//! some schema at construction. The handle is a thin wrapper over an atomic
//! reference count; cloning it is the "pin" and dropping it the "unpin", so
//! tuples can be shared across producer threads and the router thread
//! without copying. The payload is freed exactly once, when the last holder
//! releases it.

use crate::{datum::Datum, error::Error, schema::Schema};
use bytes::{Buf, BufMut};
use itertools::Itertools;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Tuple {
    values: Arc<[Datum]>,
}

impl Tuple {
    /// Builds a tuple bound to `schema`, validating per-column variants.
    pub fn new(table: &str, schema: &Schema, values: Vec<Datum>) -> Result<Tuple, Error> {
        schema.validate(table, &values)?;
        Ok(Tuple::from_datums(values))
    }

    /// Builds an intermediate tuple with no schema check. Used for the
    /// partially-bound column vectors that flow between chain operators;
    /// anything stored in or routed under a table goes through [`Tuple::new`].
    pub(crate) fn from_datums(values: Vec<Datum>) -> Tuple {
        Tuple {
            values: Arc::from(values.into_boxed_slice()),
        }
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn get(&self, col: usize) -> &Datum {
        &self.values[col]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The number of live pins on this tuple's payload.
    pub fn pin_count(&self) -> usize {
        Arc::strong_count(&self.values)
    }

    /// Concatenates the bound columns so far with a scanned row.
    pub(crate) fn concat(&self, row: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.len() + row.len());
        values.extend_from_slice(self.values());
        values.extend_from_slice(row.values());
        Tuple::from_datums(values)
    }

    /// Serializes the tuple's datums in column order.
    pub fn encode(&self, buf: &mut impl BufMut) {
        for value in self.values() {
            value.write_to(buf);
        }
    }

    /// Deserializes a tuple of the given schema.
    pub fn decode(table: &str, schema: &Schema, buf: &mut impl Buf) -> Result<Tuple, Error> {
        let mut values = Vec::with_capacity(schema.len());
        for col in 0..schema.len() {
            values.push(Datum::read_from(schema.ty(col), buf)?);
        }
        Tuple::new(table, schema, values)
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.values.iter().format(", "))
    }
}

#[cfg(test)]
mod test {
    use super::Tuple;
    use crate::datum::{DataType, Datum};
    use crate::error::Error;
    use crate::schema::Schema;
    use bytes::{Buf, BytesMut};
    use proptest::prelude::*;

    fn schema() -> Schema {
        Schema::new(vec![DataType::Int, DataType::String])
    }

    #[test]
    fn construction_is_schema_checked() {
        let t = Tuple::new("t", &schema(), vec![Datum::Int(1), Datum::string("a")]).unwrap();
        assert_eq!(t.get(0), &Datum::Int(1));
        assert!(matches!(
            Tuple::new("t", &schema(), vec![Datum::string("a"), Datum::Int(1)]),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn pins_balance_unpins() {
        let t = Tuple::new("t", &schema(), vec![Datum::Int(1), Datum::string("a")]).unwrap();
        assert_eq!(t.pin_count(), 1);
        let pinned = t.clone();
        assert_eq!(t.pin_count(), 2);
        drop(pinned);
        assert_eq!(t.pin_count(), 1);
    }

    #[test]
    fn concat_preserves_order() {
        let a = Tuple::from_datums(vec![Datum::Int(1)]);
        let b = Tuple::from_datums(vec![Datum::Int(2), Datum::Int(3)]);
        let c = a.concat(&b);
        assert_eq!(
            c.values(),
            &[Datum::Int(1), Datum::Int(2), Datum::Int(3)]
        );
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let t = Tuple::new("t", &schema(), vec![Datum::Int(9), Datum::string("xyz")]).unwrap();
        let mut buf: Vec<u8> = Vec::new();
        t.encode(&mut buf);
        let mut whole = buf.as_slice();
        assert_eq!(Tuple::decode("t", &schema(), &mut whole).unwrap(), t);
        let mut truncated = &buf[..buf.len() - 1];
        assert!(matches!(
            Tuple::decode("t", &schema(), &mut truncated),
            Err(Error::Underrun { .. })
        ));
    }

    #[test]
    fn codec_composes_with_bytes_buffers() {
        let t = Tuple::new("t", &schema(), vec![Datum::Int(3), Datum::string("abc")]).unwrap();
        let mut buf = BytesMut::new();
        t.encode(&mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(Tuple::decode("t", &schema(), &mut bytes).unwrap(), t);
        assert!(!bytes.has_remaining());
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(i in any::<i64>(), s in ".{0,32}") {
            let schema = schema();
            let t = Tuple::new("t", &schema, vec![Datum::Int(i), Datum::string(&s)]).unwrap();
            let mut buf: Vec<u8> = Vec::new();
            t.encode(&mut buf);
            let decoded = Tuple::decode("t", &schema, &mut buf.as_slice()).unwrap();
            prop_assert_eq!(decoded, t);
        }
    }
}

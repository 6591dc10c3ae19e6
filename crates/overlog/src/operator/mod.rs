//! The compiled operator-chain pipeline.
//!
//! Each rule clause compiles to one chain: a sequence of operators triggered
//! when a tuple arrives for the chain's delta relation. Operators form a
//! closed variant dispatched by `match`, so adding a kind is a compile
//! error everywhere it matters. Within one invocation tuples flow
//! scan -> filter -> aggregate -> insert; an aggregate buffers the whole
//! invocation before emitting, and an insert that reports "new" feeds the
//! derived tuple back into routing.

use crate::catalog::Catalog;
use crate::error::Error;
use crate::tuple::Tuple;
use std::collections::VecDeque;

mod aggregate;
mod filter;
mod insert;
mod scan;

pub use aggregate::{Accumulator, AggExpr, AggregateOp};
pub use filter::FilterOp;
pub use insert::InsertOp;
pub use scan::ScanOp;

/// A tuple derived during chain execution, awaiting routing. `stored` marks
/// whether the terminal insert already applied it to its table's storage;
/// tuples destined for relations with a location column defer the store to
/// the router, which decides local vs. remote.
#[derive(Debug)]
pub(crate) struct Pending {
    pub table: String,
    pub tuple: Tuple,
    pub stored: bool,
}

/// Derivations drained to fixpoint by the router.
pub(crate) type Derived = VecDeque<Pending>;

/// One compiled operator.
#[derive(Clone, Debug)]
pub enum Op {
    Scan(ScanOp),
    Filter(FilterOp),
    Aggregate(AggregateOp),
    Insert(InsertOp),
}

/// A compiled chain: the delta relation that triggers it, the head relation
/// its terminal insert targets, and the operator sequence.
#[derive(Clone, Debug)]
pub struct OpChain {
    pub rule: String,
    pub delta_table: String,
    pub head_table: String,
    pub ops: Vec<Op>,
}

impl OpChain {
    /// Runs the chain for one delta tuple. Derived head tuples that were new
    /// to their storage are appended to `derived` for further routing. A
    /// chain that produces nothing is simply dropped; that is not an error.
    pub(crate) fn run(
        &self,
        delta: &Tuple,
        catalog: &Catalog,
        derived: &mut Derived,
    ) -> Result<(), Error> {
        let mut batch = vec![delta.clone()];
        for op in &self.ops {
            if batch.is_empty() {
                return Ok(());
            }
            match op {
                Op::Scan(scan) => {
                    let mut next = Vec::new();
                    for tuple in &batch {
                        scan.invoke(tuple, catalog, &mut next)?;
                    }
                    batch = next;
                }
                Op::Filter(filter) => {
                    let mut next = Vec::with_capacity(batch.len());
                    for tuple in batch {
                        if filter.invoke(&tuple)? {
                            next.push(tuple);
                        }
                    }
                    batch = next;
                }
                Op::Aggregate(agg) => {
                    batch = agg.reduce(batch)?;
                }
                Op::Insert(insert) => {
                    for tuple in &batch {
                        insert.invoke(tuple, catalog, derived)?;
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Derived, FilterOp, InsertOp, Op, OpChain, ScanOp};
    use crate::ast::BinOp;
    use crate::catalog::Catalog;
    use crate::datum::{DataType, Datum};
    use crate::expr::Expr;
    use crate::schema::Schema;
    use crate::tuple::Tuple;

    fn int_pair() -> Schema {
        Schema::new(vec![DataType::Int, DataType::Int])
    }

    fn pair(table: &str, x: i64, y: i64) -> Tuple {
        Tuple::new(table, &int_pair(), vec![Datum::Int(x), Datum::Int(y)]).unwrap()
    }

    /// edge(1,2), edge(2,3); chain for `path(X,Z) :- delta edge(X,Y), edge(Y,Z)`.
    #[test]
    fn scan_join_then_insert() {
        let catalog = Catalog::new();
        let edge = catalog
            .define_table("edge", int_pair(), vec![0, 1], None)
            .unwrap();
        catalog
            .define_table("path", int_pair(), vec![0, 1], None)
            .unwrap();
        {
            let mut storage = edge.storage().lock().unwrap();
            storage.insert(pair("edge", 1, 2));
            storage.insert(pair("edge", 2, 3));
        }

        let chain = OpChain {
            rule: "r".to_string(),
            delta_table: "edge".to_string(),
            head_table: "path".to_string(),
            ops: vec![
                // Probe edge rows whose first column equals bound column 1 (Y).
                Op::Scan(ScanOp::new("edge", vec![(1, 0)], vec![], vec![])),
                Op::Insert(InsertOp::new(
                    "path",
                    Some(vec![Expr::Column(0), Expr::Column(3)]),
                    false,
                )),
            ],
        };

        let mut derived = Derived::new();
        chain.run(&pair("edge", 1, 2), &catalog, &mut derived).unwrap();
        let pending = derived.pop_front().unwrap();
        assert_eq!(pending.table, "path");
        assert_eq!(pending.tuple, pair("path", 1, 3));
        assert!(pending.stored);
        assert!(derived.is_empty());

        let path = catalog.lookup("path").unwrap();
        assert_eq!(path.storage().lock().unwrap().len(), 1);
    }

    #[test]
    fn filter_drops_failing_tuples() {
        let catalog = Catalog::new();
        catalog
            .define_table("out", int_pair(), vec![0, 1], None)
            .unwrap();

        let chain = OpChain {
            rule: "r".to_string(),
            delta_table: "in".to_string(),
            head_table: "out".to_string(),
            ops: vec![
                Op::Filter(FilterOp::new(vec![Expr::binop(
                    BinOp::Lt,
                    Expr::Column(0),
                    Expr::Column(1),
                )])),
                Op::Insert(InsertOp::new("out", None, false)),
            ],
        };

        let mut derived = Derived::new();
        chain.run(&pair("in", 5, 2), &catalog, &mut derived).unwrap();
        assert!(derived.is_empty());
        chain.run(&pair("in", 2, 5), &catalog, &mut derived).unwrap();
        assert_eq!(derived.len(), 1);
    }
}

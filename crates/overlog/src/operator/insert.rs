//! Insert (and delete) operator.

use super::{Derived, Pending};
use crate::catalog::Catalog;
use crate::error::Error;
use crate::expr::Expr;
use crate::tuple::Tuple;

/// The terminal operator of every chain: evaluates the projection into a
/// head-schema tuple and inserts it into (or, for retraction rules, deletes
/// it from) the head relation's storage. An insert that reports "new" queues
/// the tuple for routing so chains triggered by the head relation also run.
/// Heads with a location column skip the local store here; the router
/// decides whether the tuple is local or belongs to a remote node.
#[derive(Clone, Debug)]
pub struct InsertOp {
    table: String,
    /// `None` passes the bound tuple through unchanged (the aggregate
    /// upstream already produced head-shaped output).
    projection: Option<Vec<Expr>>,
    do_delete: bool,
}

impl InsertOp {
    pub fn new(table: &str, projection: Option<Vec<Expr>>, do_delete: bool) -> InsertOp {
        InsertOp {
            table: table.to_string(),
            projection,
            do_delete,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn invoke(
        &self,
        bound: &Tuple,
        catalog: &Catalog,
        derived: &mut Derived,
    ) -> Result<(), Error> {
        let def = catalog.lookup(&self.table)?;
        let out = match &self.projection {
            Some(exprs) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(expr.eval(bound.values())?);
                }
                Tuple::new(&self.table, def.schema(), values)?
            }
            None => {
                def.schema().validate(&self.table, bound.values())?;
                bound.clone()
            }
        };

        if self.do_delete {
            def.storage().lock().unwrap().delete(&out);
            return Ok(());
        }
        if def.loc_col().is_some() {
            derived.push_back(Pending {
                table: self.table.clone(),
                tuple: out,
                stored: false,
            });
        } else if def.storage().lock().unwrap().insert(out.clone()) {
            derived.push_back(Pending {
                table: self.table.clone(),
                tuple: out,
                stored: true,
            });
        }
        Ok(())
    }
}

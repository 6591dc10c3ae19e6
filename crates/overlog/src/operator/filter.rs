//! Filter operator.

use crate::error::Error;
use crate::expr::Expr;
use crate::tuple::Tuple;

/// Drops a tuple unless every qualifier evaluates true. Qualifiers are
/// checked left to right with fail-fast short circuit.
#[derive(Clone, Debug)]
pub struct FilterOp {
    quals: Vec<Expr>,
}

impl FilterOp {
    pub fn new(quals: Vec<Expr>) -> FilterOp {
        FilterOp { quals }
    }

    pub(crate) fn invoke(&self, tuple: &Tuple) -> Result<bool, Error> {
        for qual in &self.quals {
            if !qual.eval_bool(tuple.values())? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::FilterOp;
    use crate::ast::BinOp;
    use crate::datum::Datum;
    use crate::expr::Expr;
    use crate::tuple::Tuple;

    #[test]
    fn all_quals_must_hold() {
        let filter = FilterOp::new(vec![
            Expr::binop(BinOp::Gt, Expr::Column(0), Expr::Literal(Datum::Int(0))),
            Expr::binop(BinOp::Lt, Expr::Column(0), Expr::Literal(Datum::Int(10))),
        ]);
        assert!(filter.invoke(&Tuple::from_datums(vec![Datum::Int(5)])).unwrap());
        assert!(!filter.invoke(&Tuple::from_datums(vec![Datum::Int(-1)])).unwrap());
        assert!(!filter.invoke(&Tuple::from_datums(vec![Datum::Int(11)])).unwrap());
    }

    #[test]
    fn failing_qual_stops_evaluation() {
        // Second qualifier would divide by zero; the first already failed.
        let filter = FilterOp::new(vec![
            Expr::Literal(Datum::Bool(false)),
            Expr::binop(
                BinOp::Eq,
                Expr::binop(
                    BinOp::Div,
                    Expr::Literal(Datum::Int(1)),
                    Expr::Literal(Datum::Int(0)),
                ),
                Expr::Literal(Datum::Int(0)),
            ),
        ]);
        assert!(!filter.invoke(&Tuple::from_datums(vec![])).unwrap());
    }
}

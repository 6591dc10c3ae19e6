//! Aggregate operator.

use crate::ast::AggFunc;
use crate::datum::Datum;
use crate::error::Error;
use crate::expr::Expr;
use crate::tuple::Tuple;
use hashbrown::HashMap;

/// One output column of an aggregation: either a grouping expression or a
/// reduction over the group.
#[derive(Clone, Debug)]
pub enum AggExpr {
    Group(Expr),
    Agg(AggFunc, Expr),
}

/// Groups the tuples of one chain invocation by the non-aggregated columns
/// and applies a reduction per group. All tuples of a group are buffered
/// before anything is emitted; the buffering is scoped to a single
/// invocation, never across invocations.
#[derive(Clone, Debug)]
pub struct AggregateOp {
    cols: Vec<AggExpr>,
}

impl AggregateOp {
    pub fn new(cols: Vec<AggExpr>) -> AggregateOp {
        AggregateOp { cols }
    }

    pub(crate) fn reduce(&self, batch: Vec<Tuple>) -> Result<Vec<Tuple>, Error> {
        // Group keys in first-seen order so output is deterministic per
        // invocation.
        let mut order: Vec<Vec<Datum>> = Vec::new();
        let mut groups: HashMap<Vec<Datum>, Vec<Accumulator>> = HashMap::new();

        for tuple in &batch {
            let mut key = Vec::new();
            for col in &self.cols {
                if let AggExpr::Group(expr) = col {
                    key.push(expr.eval(tuple.values())?);
                }
            }
            let accs = match groups.get_mut(&key) {
                Some(accs) => accs,
                None => {
                    order.push(key.clone());
                    groups.entry(key).or_insert_with(|| {
                        self.cols
                            .iter()
                            .filter_map(|col| match col {
                                AggExpr::Agg(func, _) => Some(Accumulator::new(*func)),
                                AggExpr::Group(_) => None,
                            })
                            .collect()
                    })
                }
            };
            let mut acc_idx = 0;
            for col in &self.cols {
                if let AggExpr::Agg(_, expr) = col {
                    accs[acc_idx].update(expr.eval(tuple.values())?)?;
                    acc_idx += 1;
                }
            }
        }

        let mut out = Vec::with_capacity(order.len());
        for key in order {
            let accs = groups.remove(&key).expect("group recorded in order");
            let mut key_iter = key.into_iter();
            let mut acc_iter = accs.into_iter();
            let mut values = Vec::with_capacity(self.cols.len());
            for col in &self.cols {
                match col {
                    AggExpr::Group(_) => values.push(key_iter.next().expect("group key arity")),
                    AggExpr::Agg(..) => {
                        values.push(acc_iter.next().expect("accumulator arity").finish())
                    }
                }
            }
            out.push(Tuple::from_datums(values));
        }
        Ok(out)
    }
}

/// Running state of one reduction.
#[derive(Clone, Debug)]
pub enum Accumulator {
    Count(i64),
    Sum(Option<Datum>),
    Min(Option<Datum>),
    Max(Option<Datum>),
}

impl Accumulator {
    fn new(func: AggFunc) -> Accumulator {
        match func {
            AggFunc::Count => Accumulator::Count(0),
            AggFunc::Sum => Accumulator::Sum(None),
            AggFunc::Min => Accumulator::Min(None),
            AggFunc::Max => Accumulator::Max(None),
        }
    }

    fn update(&mut self, value: Datum) -> Result<(), Error> {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(state) => {
                *state = Some(match state.take() {
                    None => value,
                    Some(sum) => add(sum, value)?,
                });
            }
            Accumulator::Min(state) => {
                *state = Some(match state.take() {
                    None => value,
                    Some(min) => {
                        if value < min {
                            value
                        } else {
                            min
                        }
                    }
                });
            }
            Accumulator::Max(state) => {
                *state = Some(match state.take() {
                    None => value,
                    Some(max) => {
                        if value > max {
                            value
                        } else {
                            max
                        }
                    }
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> Datum {
        match self {
            Accumulator::Count(n) => Datum::Int(n),
            // A group exists only if at least one tuple contributed to it.
            Accumulator::Sum(state) | Accumulator::Min(state) | Accumulator::Max(state) => {
                state.expect("aggregate over a non-empty group")
            }
        }
    }
}

fn add(lhs: Datum, rhs: Datum) -> Result<Datum, Error> {
    match (&lhs, &rhs) {
        (Datum::Int(a), Datum::Int(b)) => {
            a.checked_add(*b).map(Datum::Int).ok_or_else(|| Error::Eval {
                reason: format!("sum overflow: {a} + {b}"),
            })
        }
        (Datum::Double(a), Datum::Double(b)) => Ok(Datum::Double(a + b)),
        _ => Err(Error::Eval {
            reason: format!("sum over {} and {}", lhs.ty(), rhs.ty()),
        }),
    }
}

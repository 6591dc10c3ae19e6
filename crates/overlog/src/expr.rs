//! Directly evaluable runtime expression trees.
//!
//! The planner compiles rule qualifiers and projections from the AST into
//! these trees; variables become column indices into the accumulated bound
//! tuple. Evaluation is total over well-typed input by construction (the
//! planner type-checks), but still returns `Result` so that a division by
//! zero or a corrupted tuple drops one work item rather than the router
//! thread.

use crate::ast::BinOp;
use crate::datum::{DataType, Datum};
use crate::error::Error;
use std::cmp::Ordering;

#[derive(Clone, Debug)]
pub enum Expr {
    /// A reference into the bound column vector.
    Column(usize),
    Literal(Datum),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn binop(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The static result type, given the types of the bound columns.
    pub fn ty(&self, bound: &[DataType]) -> Result<DataType, Error> {
        match self {
            Expr::Column(col) => Ok(bound[*col]),
            Expr::Literal(value) => Ok(value.ty()),
            Expr::BinOp { op, left, right } => {
                let lt = left.ty(bound)?;
                let rt = right.ty(bound)?;
                binop_ty(*op, lt, rt)
            }
        }
    }

    pub fn eval(&self, bound: &[Datum]) -> Result<Datum, Error> {
        match self {
            Expr::Column(col) => Ok(bound[*col].clone()),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::BinOp { op, left, right } => {
                // `and`/`or` short-circuit left to right.
                match op {
                    BinOp::And => {
                        return if !as_bool(left.eval(bound)?)? {
                            Ok(Datum::Bool(false))
                        } else {
                            Ok(Datum::Bool(as_bool(right.eval(bound)?)?))
                        };
                    }
                    BinOp::Or => {
                        return if as_bool(left.eval(bound)?)? {
                            Ok(Datum::Bool(true))
                        } else {
                            Ok(Datum::Bool(as_bool(right.eval(bound)?)?))
                        };
                    }
                    _ => {}
                }

                let lhs = left.eval(bound)?;
                let rhs = right.eval(bound)?;
                match op {
                    BinOp::Eq => Ok(Datum::Bool(lhs == rhs)),
                    BinOp::Ne => Ok(Datum::Bool(lhs != rhs)),
                    BinOp::Lt => cmp(&lhs, &rhs).map(|o| Datum::Bool(o == Ordering::Less)),
                    BinOp::Le => cmp(&lhs, &rhs).map(|o| Datum::Bool(o != Ordering::Greater)),
                    BinOp::Gt => cmp(&lhs, &rhs).map(|o| Datum::Bool(o == Ordering::Greater)),
                    BinOp::Ge => cmp(&lhs, &rhs).map(|o| Datum::Bool(o != Ordering::Less)),
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arith(*op, &lhs, &rhs),
                    BinOp::And | BinOp::Or => unreachable!("handled above"),
                }
            }
        }
    }

    /// Evaluates a qualifier. Non-boolean results are evaluation errors.
    pub fn eval_bool(&self, bound: &[Datum]) -> Result<bool, Error> {
        as_bool(self.eval(bound)?)
    }
}

fn as_bool(value: Datum) -> Result<bool, Error> {
    match value {
        Datum::Bool(b) => Ok(b),
        other => Err(Error::Eval {
            reason: format!("expected bool, got {}", other.ty()),
        }),
    }
}

fn cmp(lhs: &Datum, rhs: &Datum) -> Result<Ordering, Error> {
    lhs.partial_cmp(rhs).ok_or_else(|| Error::Eval {
        reason: format!("cannot compare {} with {}", lhs.ty(), rhs.ty()),
    })
}

fn arith(op: BinOp, lhs: &Datum, rhs: &Datum) -> Result<Datum, Error> {
    match (lhs, rhs) {
        (Datum::Int(a), Datum::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
                BinOp::Div => a.checked_div(*b),
                _ => unreachable!(),
            };
            result.map(Datum::Int).ok_or_else(|| Error::Eval {
                reason: format!("integer arithmetic failed: {a} {op:?} {b}"),
            })
        }
        (Datum::Double(a), Datum::Double(b)) => {
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => unreachable!(),
            };
            Ok(Datum::Double(result))
        }
        _ => Err(Error::Eval {
            reason: format!("arithmetic over {} and {}", lhs.ty(), rhs.ty()),
        }),
    }
}

fn binop_ty(op: BinOp, lt: DataType, rt: DataType) -> Result<DataType, Error> {
    let mismatch = || Error::TypeMismatch {
        context: format!("operands of {op:?}"),
        expected: lt,
        actual: rt,
    };
    match op {
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if lt == rt {
                Ok(DataType::Bool)
            } else {
                Err(mismatch())
            }
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            if lt == rt && lt.is_numeric() {
                Ok(lt)
            } else {
                Err(mismatch())
            }
        }
        BinOp::And | BinOp::Or => {
            if lt == DataType::Bool && rt == DataType::Bool {
                Ok(DataType::Bool)
            } else {
                Err(mismatch())
            }
        }
    }
}

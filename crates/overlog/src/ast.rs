//! The parser boundary: an already-validated program syntax tree.
//!
//! The concrete grammar and lexer live outside this crate; the planner
//! consumes programs in this form. A program is a set of table and timer
//! declarations, initial facts, and rules. A rule derives tuples for its
//! head relation from a body of join clauses and qualifier expressions.

use crate::datum::{DataType, Datum};

/// A full program, ready for planning.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub name: String,
    pub tables: Vec<TableDecl>,
    pub timers: Vec<TimerDecl>,
    pub facts: Vec<Fact>,
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn new(name: &str) -> Program {
        Program {
            name: name.to_string(),
            ..Program::default()
        }
    }
}

/// Declares a relation: column types, key columns, and an optional location
/// column identifying the owning network address.
#[derive(Clone, Debug)]
pub struct TableDecl {
    pub name: String,
    pub cols: Vec<DataType>,
    pub key_cols: Vec<usize>,
    pub loc_col: Option<usize>,
}

/// Declares a periodic alarm feeding the named relation.
#[derive(Clone, Debug)]
pub struct TimerDecl {
    pub table: String,
    pub period_ms: u64,
}

/// An initial fact, inserted when the program is installed.
#[derive(Clone, Debug)]
pub struct Fact {
    pub table: String,
    pub values: Vec<Datum>,
}

/// One rule: `head :- body, quals`. A retraction rule (`is_delete`) removes
/// derived tuples from the head relation instead of inserting them.
#[derive(Clone, Debug)]
pub struct Rule {
    pub name: String,
    pub head: HeadClause,
    pub body: Vec<JoinClause>,
    pub quals: Vec<RuleExpr>,
    pub is_delete: bool,
}

/// The rule head: a target relation and one projection expression per
/// column. Aggregate functions may appear only here.
#[derive(Clone, Debug)]
pub struct HeadClause {
    pub table: String,
    pub args: Vec<RuleExpr>,
}

/// A body join clause: a relation and one term per column.
#[derive(Clone, Debug)]
pub struct JoinClause {
    pub table: String,
    pub args: Vec<Term>,
}

/// A join-clause argument.
#[derive(Clone, Debug)]
pub enum Term {
    Var(String),
    Const(Datum),
}

impl Term {
    pub fn var(name: &str) -> Term {
        Term::Var(name.to_string())
    }
}

/// An expression over rule variables and constants, used for qualifiers and
/// head projections.
#[derive(Clone, Debug)]
pub enum RuleExpr {
    Var(String),
    Const(Datum),
    BinOp {
        op: BinOp,
        left: Box<RuleExpr>,
        right: Box<RuleExpr>,
    },
    Agg {
        func: AggFunc,
        arg: Box<RuleExpr>,
    },
}

impl RuleExpr {
    pub fn var(name: &str) -> RuleExpr {
        RuleExpr::Var(name.to_string())
    }

    pub fn binop(op: BinOp, left: RuleExpr, right: RuleExpr) -> RuleExpr {
        RuleExpr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn agg(func: AggFunc, arg: RuleExpr) -> RuleExpr {
        RuleExpr::Agg {
            func,
            arg: Box::new(arg),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
}

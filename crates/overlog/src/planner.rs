//! Compiles a program into operator chains.
//!
//! For every rule, and for every join clause `j` in its body, the planner
//! emits one chain triggered by `j`'s relation: starting from the delta
//! clause it repeatedly picks the first remaining clause (in body order)
//! that shares a variable with the relations joined so far, and pushes each
//! qualifier down to the earliest point where all of its variables are
//! bound. There is no cost-based join reordering; the only guarantee is
//! connectivity-driven feasibility. A clause that can never connect to the
//! delta aborts the plan, and nothing is installed.

use crate::ast::{JoinClause, Program, Rule, RuleExpr, TableDecl, Term, TimerDecl};
use crate::catalog::Catalog;
use crate::datum::DataType;
use crate::error::Error;
use crate::expr::Expr;
use crate::operator::{AggExpr, AggregateOp, FilterOp, InsertOp, Op, OpChain, ScanOp};
use crate::schema::Schema;
use crate::tuple::Tuple;
use hashbrown::{HashMap, HashSet};

/// A fully compiled program, ready to install.
#[derive(Debug)]
pub struct ProgramPlan {
    pub name: String,
    pub tables: Vec<TableDecl>,
    pub timers: Vec<TimerDecl>,
    pub facts: Vec<(String, Tuple)>,
    pub rules: Vec<RulePlan>,
}

/// One compiled rule: its chains plus the bootstrap relation whose current
/// content is replayed through the new chains at install time, so facts that
/// existed before the rule observe it exactly once.
#[derive(Debug)]
pub struct RulePlan {
    pub name: String,
    pub chains: Vec<OpChain>,
    pub bootstrap: String,
}

/// Plans `program` against the catalog. Pure with respect to durable state:
/// reads the catalog for type resolution, writes nothing.
pub fn plan_program(program: &Program, catalog: &Catalog) -> Result<ProgramPlan, Error> {
    let mut pending: HashMap<String, Schema> = HashMap::new();
    for decl in &program.tables {
        if pending.contains_key(&decl.name) || catalog.get(&decl.name).is_some() {
            return Err(Error::DuplicateTable {
                name: decl.name.clone(),
            });
        }
        pending.insert(decl.name.clone(), validate_decl(decl)?);
    }

    let schema_of = |name: &str| -> Result<Schema, Error> {
        if let Some(schema) = pending.get(name) {
            return Ok(schema.clone());
        }
        catalog.lookup(name).map(|def| def.schema().clone())
    };

    for timer in &program.timers {
        let schema = schema_of(&timer.table)?;
        if schema.len() != 1 || schema.ty(0) != DataType::Int {
            return Err(Error::TypeMismatch {
                context: format!("timer relation '{}'", timer.table),
                expected: DataType::Int,
                actual: schema.ty(0),
            });
        }
    }

    let mut facts = Vec::with_capacity(program.facts.len());
    for fact in &program.facts {
        let schema = schema_of(&fact.table)?;
        facts.push((
            fact.table.clone(),
            Tuple::new(&fact.table, &schema, fact.values.clone())?,
        ));
    }

    let mut rules = Vec::with_capacity(program.rules.len());
    for rule in &program.rules {
        rules.push(plan_rule(rule, &schema_of)?);
    }

    Ok(ProgramPlan {
        name: program.name.clone(),
        tables: program.tables.clone(),
        timers: program.timers.clone(),
        facts,
        rules,
    })
}

fn validate_decl(decl: &TableDecl) -> Result<Schema, Error> {
    let schema = Schema::new(decl.cols.clone());
    for &col in decl.key_cols.iter().chain(decl.loc_col.iter()) {
        if col >= schema.len() {
            return Err(Error::ArityMismatch {
                table: decl.name.clone(),
                expected: schema.len(),
                actual: col + 1,
            });
        }
    }
    if let Some(col) = decl.loc_col {
        if schema.ty(col) != DataType::String {
            return Err(Error::TypeMismatch {
                context: format!("location column {col} of '{}'", decl.name),
                expected: DataType::String,
                actual: schema.ty(col),
            });
        }
    }
    Ok(schema)
}

fn plan_rule(
    rule: &Rule,
    schema_of: &impl Fn(&str) -> Result<Schema, Error>,
) -> Result<RulePlan, Error> {
    if rule.body.is_empty() {
        return Err(Error::InvalidRule {
            rule: rule.name.clone(),
            reason: "rule body has no join clauses".to_string(),
        });
    }

    // Resolve and arity-check every clause once up front.
    let mut body_schemas = Vec::with_capacity(rule.body.len());
    for clause in &rule.body {
        let schema = schema_of(&clause.table)?;
        if clause.args.len() != schema.len() {
            return Err(Error::ArityMismatch {
                table: clause.table.clone(),
                expected: schema.len(),
                actual: clause.args.len(),
            });
        }
        body_schemas.push(schema);
    }
    let head_schema = schema_of(&rule.head.table)?;
    if rule.head.args.len() != head_schema.len() {
        return Err(Error::ArityMismatch {
            table: rule.head.table.clone(),
            expected: head_schema.len(),
            actual: rule.head.args.len(),
        });
    }

    let mut chains = Vec::with_capacity(rule.body.len());
    for delta_idx in 0..rule.body.len() {
        chains.push(make_op_chain(
            rule,
            &body_schemas,
            &head_schema,
            delta_idx,
        )?);
    }

    Ok(RulePlan {
        name: rule.name.clone(),
        chains,
        bootstrap: rule.body[0].table.clone(),
    })
}

/// Per-chain planning state: variable bindings into the accumulated bound
/// tuple plus the parallel column-type vector.
struct ChainState {
    bindings: HashMap<String, usize>,
    bound_types: Vec<DataType>,
}

impl ChainState {
    fn width(&self) -> usize {
        self.bound_types.len()
    }
}

fn make_op_chain(
    rule: &Rule,
    body_schemas: &[Schema],
    head_schema: &Schema,
    delta_idx: usize,
) -> Result<OpChain, Error> {
    let delta = &rule.body[delta_idx];
    let mut state = ChainState {
        bindings: HashMap::new(),
        bound_types: Vec::new(),
    };
    let mut ops = Vec::new();

    // Constants and repeated variables in the delta clause constrain the
    // triggering tuple itself: they become a leading filter.
    let mut lead_quals = Vec::new();
    state.bound_types.extend(body_schemas[delta_idx].types());
    for (col, term) in delta.args.iter().enumerate() {
        match term {
            Term::Const(value) => {
                check_col_ty(&delta.table, &body_schemas[delta_idx], col, value.ty())?;
                lead_quals.push(Expr::binop(
                    crate::ast::BinOp::Eq,
                    Expr::Column(col),
                    Expr::Literal(value.clone()),
                ));
            }
            Term::Var(var) => match state.bindings.get(var) {
                Some(&prev) => lead_quals.push(Expr::binop(
                    crate::ast::BinOp::Eq,
                    Expr::Column(prev),
                    Expr::Column(col),
                )),
                None => {
                    state.bindings.insert(var.clone(), col);
                }
            },
        }
    }

    // Qualifiers wait until all of their variables are bound, then attach at
    // the earliest such point.
    let mut pending_quals: Vec<(&RuleExpr, HashSet<&str>)> = rule
        .quals
        .iter()
        .map(|qual| (qual, expr_vars(qual)))
        .collect();
    lead_quals.extend(take_ready_quals(rule, &mut pending_quals, &state)?);
    if !lead_quals.is_empty() {
        ops.push(Op::Filter(FilterOp::new(lead_quals)));
    }

    let mut remaining: Vec<usize> = (0..rule.body.len()).filter(|&i| i != delta_idx).collect();
    while !remaining.is_empty() {
        let pos = remaining
            .iter()
            .position(|&i| {
                rule.body[i].args.iter().any(
                    |term| matches!(term, Term::Var(v) if state.bindings.contains_key(v)),
                )
            })
            .ok_or_else(|| Error::Infeasible {
                rule: rule.name.clone(),
                table: rule.body[remaining[0]].table.clone(),
            })?;
        let idx = remaining.remove(pos);
        ops.push(Op::Scan(compile_scan(
            &rule.body[idx],
            &body_schemas[idx],
            &mut state,
        )?));

        let ready = take_ready_quals(rule, &mut pending_quals, &state)?;
        if !ready.is_empty() {
            ops.push(Op::Filter(FilterOp::new(ready)));
        }
    }

    if let Some((qual, vars)) = pending_quals.first() {
        let variable = vars
            .iter()
            .find(|v| !state.bindings.contains_key(**v))
            .map(|v| v.to_string())
            .unwrap_or_else(|| format!("{qual:?}"));
        return Err(Error::UnboundVariable {
            rule: rule.name.clone(),
            variable,
        });
    }

    compile_head(rule, head_schema, &state, &mut ops)?;

    Ok(OpChain {
        rule: rule.name.clone(),
        delta_table: delta.table.clone(),
        head_table: rule.head.table.clone(),
        ops,
    })
}

fn compile_scan(
    clause: &JoinClause,
    schema: &Schema,
    state: &mut ChainState,
) -> Result<ScanOp, Error> {
    let base = state.width();
    let mut key = Vec::new();
    let mut row_eq = Vec::new();
    let mut consts = Vec::new();

    for (col, term) in clause.args.iter().enumerate() {
        match term {
            Term::Const(value) => {
                check_col_ty(&clause.table, schema, col, value.ty())?;
                consts.push((col, value.clone()));
            }
            Term::Var(var) => match state.bindings.get(var) {
                Some(&idx) => {
                    check_col_ty(&clause.table, schema, col, state.bound_types[idx])?;
                    if idx >= base {
                        // Bound earlier in this same clause.
                        row_eq.push((idx - base, col));
                    } else {
                        key.push((idx, col));
                    }
                }
                None => {
                    state.bindings.insert(var.clone(), base + col);
                }
            },
        }
    }
    state.bound_types.extend(schema.types());
    Ok(ScanOp::new(&clause.table, key, row_eq, consts))
}

fn compile_head(
    rule: &Rule,
    head_schema: &Schema,
    state: &ChainState,
    ops: &mut Vec<Op>,
) -> Result<(), Error> {
    let has_agg = rule
        .head
        .args
        .iter()
        .any(|arg| matches!(arg, RuleExpr::Agg { .. }));

    if has_agg {
        let mut cols = Vec::with_capacity(rule.head.args.len());
        for (col, arg) in rule.head.args.iter().enumerate() {
            match arg {
                RuleExpr::Agg { func, arg } => {
                    let (expr, ty) = compile_expr(rule, arg, state)?;
                    let out_ty = match func {
                        crate::ast::AggFunc::Count => DataType::Int,
                        crate::ast::AggFunc::Sum => {
                            if !ty.is_numeric() {
                                return Err(Error::InvalidRule {
                                    rule: rule.name.clone(),
                                    reason: format!("sum over non-numeric {ty}"),
                                });
                            }
                            ty
                        }
                        crate::ast::AggFunc::Min | crate::ast::AggFunc::Max => ty,
                    };
                    check_col_ty(&rule.head.table, head_schema, col, out_ty)?;
                    cols.push(AggExpr::Agg(*func, expr));
                }
                other => {
                    let (expr, ty) = compile_expr(rule, other, state)?;
                    check_col_ty(&rule.head.table, head_schema, col, ty)?;
                    cols.push(AggExpr::Group(expr));
                }
            }
        }
        ops.push(Op::Aggregate(AggregateOp::new(cols)));
        ops.push(Op::Insert(InsertOp::new(
            &rule.head.table,
            None,
            rule.is_delete,
        )));
    } else {
        let mut projection = Vec::with_capacity(rule.head.args.len());
        for (col, arg) in rule.head.args.iter().enumerate() {
            let (expr, ty) = compile_expr(rule, arg, state)?;
            check_col_ty(&rule.head.table, head_schema, col, ty)?;
            projection.push(expr);
        }
        ops.push(Op::Insert(InsertOp::new(
            &rule.head.table,
            Some(projection),
            rule.is_delete,
        )));
    }
    Ok(())
}

/// Compiles an AST expression against the current bindings and returns its
/// static type. Aggregates are rejected here; they are only legal directly
/// in head position.
fn compile_expr(
    rule: &Rule,
    expr: &RuleExpr,
    state: &ChainState,
) -> Result<(Expr, DataType), Error> {
    let compiled = compile_expr_inner(rule, expr, state)?;
    let ty = compiled.ty(&state.bound_types)?;
    Ok((compiled, ty))
}

fn compile_expr_inner(rule: &Rule, expr: &RuleExpr, state: &ChainState) -> Result<Expr, Error> {
    match expr {
        RuleExpr::Var(var) => state
            .bindings
            .get(var)
            .map(|&idx| Expr::Column(idx))
            .ok_or_else(|| Error::UnboundVariable {
                rule: rule.name.clone(),
                variable: var.clone(),
            }),
        RuleExpr::Const(value) => Ok(Expr::Literal(value.clone())),
        RuleExpr::BinOp { op, left, right } => Ok(Expr::binop(
            *op,
            compile_expr_inner(rule, left, state)?,
            compile_expr_inner(rule, right, state)?,
        )),
        RuleExpr::Agg { .. } => Err(Error::InvalidRule {
            rule: rule.name.clone(),
            reason: "aggregate outside of head position".to_string(),
        }),
    }
}

/// Removes and compiles every pending qualifier whose variables are all
/// bound. Compiled qualifiers must be boolean.
fn take_ready_quals<'a>(
    rule: &Rule,
    pending: &mut Vec<(&'a RuleExpr, HashSet<&'a str>)>,
    state: &ChainState,
) -> Result<Vec<Expr>, Error> {
    let mut ready = Vec::new();
    let mut i = 0;
    while i < pending.len() {
        if pending[i]
            .1
            .iter()
            .all(|v| state.bindings.contains_key(*v))
        {
            let (qual, _) = pending.remove(i);
            let (expr, ty) = compile_expr(rule, qual, state)?;
            if ty != DataType::Bool {
                return Err(Error::InvalidRule {
                    rule: rule.name.clone(),
                    reason: format!("qualifier has type {ty}, expected bool"),
                });
            }
            ready.push(expr);
        } else {
            i += 1;
        }
    }
    Ok(ready)
}

fn expr_vars(expr: &RuleExpr) -> HashSet<&str> {
    fn walk<'a>(expr: &'a RuleExpr, out: &mut HashSet<&'a str>) {
        match expr {
            RuleExpr::Var(var) => {
                out.insert(var.as_str());
            }
            RuleExpr::Const(_) => {}
            RuleExpr::BinOp { left, right, .. } => {
                walk(left, out);
                walk(right, out);
            }
            RuleExpr::Agg { arg, .. } => walk(arg, out),
        }
    }
    let mut out = HashSet::new();
    walk(expr, &mut out);
    out
}

fn check_col_ty(table: &str, schema: &Schema, col: usize, actual: DataType) -> Result<(), Error> {
    if schema.ty(col) != actual {
        return Err(Error::TypeMismatch {
            context: format!("column {col} of '{table}'"),
            expected: schema.ty(col),
            actual,
        });
    }
    Ok(())
}

//! Loop reordering (interchange of a nested chain).
//!
//! Example:
//! ```text
//! for i in 0..4:            for j in 0..8:
//!   z[i] = i                  for i in 0..4:
//!   for j in 0..8:      =>      if j == 0:
//!     y[i, j] = i + j             z[i] = i
//!                               y[i, j] = i + j
//! ```
//!
//! The chain is first made perfect: conditions between two chain loops move
//! into the inner body, and simple statements next to an inner loop move
//! into it under a guard that runs them on its first (or last) iteration.
//! Loop headers are then permuted across the chain slots while bodies stay
//! in place.

use crate::analysis::{const_extent, written_buffers, DependenceAnalysis};
use crate::ir::ast::{Ast, Node, NodeId, NodeKind};
use crate::ir::expr::{and, eq, var, Expr};
use crate::transform::{loop_body, loop_header, resolve_loop, set_loop_body, wrap_block, ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use log::debug;

const NAME: &str = "reorder";

/// Reorder a chain of nested loops.
#[derive(Debug, Clone)]
pub struct Reorder {
    /// Loop labels in the requested order, outermost first
    pub order: Vec<String>,
}

impl Reorder {
    pub fn new<S: AsRef<str>>(order: &[S]) -> Self {
        Self { order: order.iter().map(|s| s.as_ref().to_string()).collect() }
    }
}

fn all_of(conds: &[Expr], last: Expr) -> Expr {
    conds.iter().rev().fold(last, |acc, c| and(c.clone(), acc))
}

/// Statements that may be duplicated under a guard: no loops, calls or
/// declarations anywhere inside.
fn check_simple(ast: &Ast, stmt: NodeId, inner_iter: &str) -> ScheduleResult<()> {
    for n in ast.walk_from(stmt) {
        let kind = ast.kind(n);
        if matches!(kind, NodeKind::For { .. } | NodeKind::Call { .. } | NodeKind::VarDef { .. }) {
            return Err(InvalidSchedule::not_perfect_nest(
                NAME,
                format!("a {} sits between the loops to reorder", kind.kind_name()),
            ));
        }
        if kind.exprs().iter().any(|e| e.mentions_var(inner_iter)) {
            return Err(InvalidSchedule::not_perfect_nest(
                NAME,
                format!("a statement between the loops uses a variable named `{}`", inner_iter),
            ));
        }
    }
    Ok(())
}

/// Make `inner` the whole body of `outer`.
fn sink(ast: &mut Ast, outer: NodeId, inner: NodeId, nest_writes: &[String]) -> ScheduleResult<()> {
    let (iter, begin, end) = match loop_header(ast, inner) {
        Some(h) => h,
        None => return Err(InvalidSchedule::not_a_loop(NAME, &inner.to_string())),
    };
    let mut conds: Vec<Expr> = Vec::new();
    let mut before: Vec<NodeId> = Vec::new();
    let mut after: Vec<NodeId> = Vec::new();

    loop {
        let body = match loop_body(ast, outer) {
            Some(b) => b,
            None => return Err(InvalidSchedule::not_a_loop(NAME, &outer.to_string())),
        };
        if body == inner {
            break;
        }
        match ast.kind(body).clone() {
            NodeKind::Block(stmts) => {
                let pos = stmts
                    .iter()
                    .position(|&s| s == inner || ast.is_ancestor(s, inner))
                    .ok_or_else(|| InvalidSchedule::not_perfect_nest(NAME, "loops are not nested"))?;
                let mid = stmts[pos];
                if stmts.len() == 1 {
                    set_loop_body(ast, outer, mid);
                    continue;
                }
                if let NodeKind::Block(nested) = ast.kind(mid).clone() {
                    let mut flat = stmts[..pos].to_vec();
                    flat.extend(nested);
                    flat.extend_from_slice(&stmts[pos + 1..]);
                    ast.node_mut(body).kind = NodeKind::Block(flat);
                    continue;
                }
                if mid != inner {
                    return Err(InvalidSchedule::not_perfect_nest(
                        NAME,
                        "statements next to a branch between the loops",
                    ));
                }
                for &s in stmts[..pos].iter().chain(&stmts[pos + 1..]) {
                    check_simple(ast, s, &iter)?;
                }
                if const_extent(ast, inner).map_or(true, |n| n < 1) {
                    return Err(InvalidSchedule::not_perfect_nest(
                        NAME,
                        "cannot move statements into a loop that may run zero times",
                    ));
                }
                if pos > 0 {
                    let guard = all_of(&conds, eq(var(&iter), begin.clone()));
                    let then_case = wrap_block(ast, stmts[..pos].to_vec());
                    before.push(ast.alloc_kind(NodeKind::If { cond: guard, then_case, else_case: None }));
                }
                if pos + 1 < stmts.len() {
                    let last = crate::transform::fold_sub(end.clone(), Expr::Int(1));
                    let guard = all_of(&conds, eq(var(&iter), last));
                    let then_case = wrap_block(ast, stmts[pos + 1..].to_vec());
                    after.insert(0, ast.alloc_kind(NodeKind::If { cond: guard, then_case, else_case: None }));
                }
                set_loop_body(ast, outer, inner);
            }
            NodeKind::If { cond, then_case, else_case: None } => {
                if nest_writes.iter().any(|b| cond.reads_buffer(b)) {
                    return Err(InvalidSchedule::dependency(
                        NAME,
                        format!("condition `{}` reads a buffer written in the nest", cond),
                    ));
                }
                if cond.mentions_var(&iter) {
                    return Err(InvalidSchedule::not_perfect_nest(
                        NAME,
                        format!("condition `{}` uses a variable named `{}`", cond, iter),
                    ));
                }
                conds.push(cond);
                set_loop_body(ast, outer, then_case);
            }
            other => {
                return Err(InvalidSchedule::not_perfect_nest(
                    NAME,
                    format!("a {} sits between the loops to reorder", other.kind_name()),
                ));
            }
        }
    }

    if conds.is_empty() && before.is_empty() && after.is_empty() {
        return Ok(());
    }
    let old_body = match loop_body(ast, inner) {
        Some(b) => b,
        None => return Ok(()),
    };
    let guarded = match conds.split_last() {
        Some((last, rest)) => ast.alloc_kind(NodeKind::If {
            cond: all_of(rest, last.clone()),
            then_case: old_body,
            else_case: None,
        }),
        None => old_body,
    };
    let mut stmts = before;
    stmts.push(guarded);
    stmts.extend(after);
    let new_body = wrap_block(ast, stmts);
    set_loop_body(ast, inner, new_body);
    Ok(())
}

impl Transform for Reorder {
    type Output = ();

    fn apply(&self, ast: &mut Ast, analysis: &DependenceAnalysis) -> ScheduleResult<()> {
        if self.order.is_empty() {
            return Err(InvalidSchedule::malformed(NAME, "no loops given"));
        }
        let mut ids: Vec<NodeId> = Vec::with_capacity(self.order.len());
        for label in &self.order {
            let id = resolve_loop(ast, NAME, label)?;
            if ids.contains(&id) {
                return Err(InvalidSchedule::malformed(NAME, format!("{} listed twice", label)));
            }
            ids.push(id);
        }

        let mut chain = ids.clone();
        chain.sort_by_key(|&id| ast.ancestors(id).len());
        for pair in chain.windows(2) {
            if !ast.is_ancestor(pair[0], pair[1]) {
                return Err(InvalidSchedule::not_perfect_nest(
                    NAME,
                    "the loops do not form a nest",
                ));
            }
        }
        let perm: Vec<usize> = ids
            .iter()
            .map(|id| chain.iter().position(|c| c == id).unwrap_or(0))
            .collect();
        if perm.iter().enumerate().all(|(k, &p)| k == p) {
            return Ok(());
        }

        let nest_writes = written_buffers(ast, chain[0]);
        let iters: Vec<String> = chain
            .iter()
            .filter_map(|&id| loop_header(ast, id).map(|h| h.0))
            .collect();
        for &id in &chain {
            if let Some((iter, begin, end)) = loop_header(ast, id) {
                for bound in [&begin, &end] {
                    if let Some(other) = iters.iter().find(|v| **v != iter && bound.mentions_var(v)) {
                        return Err(InvalidSchedule::not_perfect_nest(
                            NAME,
                            format!("bound `{}` of loop over {} depends on {}", bound, iter, other),
                        ));
                    }
                    if nest_writes.iter().any(|b| bound.reads_buffer(b)) {
                        return Err(InvalidSchedule::dependency(
                            NAME,
                            format!("bound `{}` reads a buffer written in the nest", bound),
                        ));
                    }
                }
            }
        }

        for pair in chain.windows(2) {
            sink(ast, pair[0], pair[1], &nest_writes)?;
        }

        if let Err(dep) = analysis.check_reorder(ast, &chain, &perm) {
            return Err(InvalidSchedule::dependency(
                NAME,
                format!("unsolvable dependency: {}", dep.description()),
            ));
        }

        // Move headers (and labels) while every slot keeps its body.
        let headers: Vec<Node> = chain.iter().map(|&id| ast.node(id).clone()).collect();
        for (slot, &from) in chain.iter().zip(&perm) {
            let body = loop_body(ast, *slot);
            let mut node = headers[from].clone();
            if let (NodeKind::For { body: b, .. }, Some(body)) = (&mut node.kind, body) {
                *b = body;
            }
            *ast.node_mut(*slot) = node;
        }
        debug!("reordered {} loops to {}", chain.len(), self.order.join(", "));
        Ok(())
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::Reorder { order: self.order.clone() }
    }
}

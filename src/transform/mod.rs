//! Loop transformations.
//!
//! Every transformation is a small value implementing [`Transform`]. It edits
//! a candidate tree in place and either succeeds or reports why it cannot be
//! applied. [`Schedule`] runs transformations transactionally: the candidate
//! is a clone of the committed snapshot and is only kept on success.

pub mod command;
pub mod schedule;
pub mod reorder;
pub mod split;
pub mod parallelize;
pub mod fission;
pub mod var_reorder;
pub mod inline;

pub use command::ScheduleCommand;
pub use schedule::Schedule;
pub use reorder::Reorder;
pub use split::Split;
pub use parallelize::Parallelize;
pub use fission::Fission;
pub use var_reorder::VarReorder;
pub use inline::{inline_all, inline_call, InlineAll};

use crate::analysis::DependenceAnalysis;
use crate::ir::ast::{Ast, NodeId, NodeKind};
use crate::ir::expr::{BinaryOp, Expr};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};

/// Transformation pass trait.
pub trait Transform {
    /// Value handed back to the caller on success
    type Output;

    /// Apply the transformation to `ast`. On error `ast` may be left half
    /// rewritten; callers work on a candidate copy.
    fn apply(&self, ast: &mut Ast, analysis: &DependenceAnalysis) -> ScheduleResult<Self::Output>;

    /// Get transformation name.
    fn name(&self) -> &str;

    /// The command that replays this transformation.
    fn describe(&self) -> ScheduleCommand;
}

/// Resolve a label that must name a loop.
pub(crate) fn resolve_loop(ast: &Ast, transform: &str, label: &str) -> ScheduleResult<NodeId> {
    let id = ast
        .find(label)
        .ok_or_else(|| InvalidSchedule::not_found(transform, label))?;
    if ast.node(id).is_loop() {
        Ok(id)
    } else {
        Err(InvalidSchedule::not_a_loop(transform, label))
    }
}

/// `(iter, begin, end)` of a loop.
pub(crate) fn loop_header(ast: &Ast, id: NodeId) -> Option<(String, Expr, Expr)> {
    match ast.kind(id) {
        NodeKind::For { iter, begin, end, .. } => Some((iter.clone(), begin.clone(), end.clone())),
        _ => None,
    }
}

pub(crate) fn loop_body(ast: &Ast, id: NodeId) -> Option<NodeId> {
    match ast.kind(id) {
        NodeKind::For { body, .. } => Some(*body),
        _ => None,
    }
}

pub(crate) fn set_loop_body(ast: &mut Ast, id: NodeId, new_body: NodeId) {
    if let NodeKind::For { body, .. } = &mut ast.node_mut(id).kind {
        *body = new_body;
    }
}

/// A single statement as-is, several wrapped in a block.
pub(crate) fn wrap_block(ast: &mut Ast, mut stmts: Vec<NodeId>) -> NodeId {
    if stmts.len() == 1 {
        stmts.remove(0)
    } else {
        ast.alloc_kind(NodeKind::Block(stmts))
    }
}

pub(crate) fn fold_add(a: Expr, b: Expr) -> Expr {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) if x.checked_add(y).is_some() => Expr::Int(x + y),
        (Some(0), _) => b,
        (_, Some(0)) => a,
        _ => a + b,
    }
}

pub(crate) fn fold_sub(a: Expr, b: Expr) -> Expr {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) if x.checked_sub(y).is_some() => Expr::Int(x - y),
        (_, Some(0)) => a,
        _ => a - b,
    }
}

pub(crate) fn fold_ceil_div(a: Expr, b: Expr) -> Expr {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) if y > 0 => Expr::Int(num_integer::Integer::div_ceil(&x, &y)),
        (_, Some(1)) => a,
        _ => Expr::binary(BinaryOp::CeilDiv, a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, var};
    use crate::utils::errors::InvalidScheduleKind;

    #[test]
    fn test_resolve_loop() {
        let ast = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L1").body(|b| {
                let s = b.store("y", vec![var("i")], 0);
                b.set_label(s, "S0");
            });
        })
        .unwrap();
        assert!(resolve_loop(&ast, "t", "L1").is_ok());
        assert_eq!(resolve_loop(&ast, "t", "S0").unwrap_err().kind, InvalidScheduleKind::NotALoop);
        assert_eq!(resolve_loop(&ast, "t", "L9").unwrap_err().kind, InvalidScheduleKind::NotFound);
    }

    #[test]
    fn test_folding() {
        assert_eq!(fold_add(int(2), int(3)), int(5));
        assert_eq!(fold_add(int(0), var("n")), var("n"));
        assert_eq!(fold_sub(var("n"), int(0)), var("n"));
        assert_eq!(fold_ceil_div(int(10), int(4)), int(3));
        assert_eq!(fold_ceil_div(var("n"), int(1)), var("n"));
    }
}

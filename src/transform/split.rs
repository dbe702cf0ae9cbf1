//! Loop splitting (strip-mining).
//!
//! Example (factor 4, n = 10):
//! ```text
//! for i in 0..10:          for i.0 in 0..3:
//!   y[i] = i          =>     for i.1 in 0..4:
//!                              if (i.1 + 4 * i.0) < 10:
//!                                y[i.1 + 4 * i.0] = i.1 + 4 * i.0
//! ```

use crate::analysis::linear::{linearize, LinearExpr};
use crate::analysis::DependenceAnalysis;
use crate::ir::ast::{Ast, ForProperty, Node, NodeKind};
use crate::ir::expr::{lt, var, BinaryOp, Expr};
use crate::transform::{fold_add, fold_ceil_div, fold_sub, loop_body, resolve_loop, ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use crate::utils::names::NameGen;
use log::debug;

const NAME: &str = "split";

/// Split a loop into an outer and an inner loop.
///
/// A count that reduces to a constant must be positive. Any other symbolic
/// count is taken to be positive at run time; nothing guards it.
#[derive(Debug, Clone)]
pub struct Split {
    pub id: String,
    /// Trip count of the inner loop
    pub factor: Option<Expr>,
    /// Trip count of the outer loop
    pub nparts: Option<Expr>,
}

impl Split {
    pub fn factor(id: &str, factor: impl Into<Expr>) -> Self {
        Self { id: id.to_string(), factor: Some(factor.into()), nparts: None }
    }

    pub fn nparts(id: &str, nparts: impl Into<Expr>) -> Self {
        Self { id: id.to_string(), factor: None, nparts: Some(nparts.into()) }
    }
}

impl Transform for Split {
    /// Labels of the new outer and inner loops
    type Output = (String, String);

    fn apply(&self, ast: &mut Ast, _analysis: &DependenceAnalysis) -> ScheduleResult<(String, String)> {
        let lp = resolve_loop(ast, NAME, &self.id)?;
        let (count, by_factor) = match (&self.factor, &self.nparts) {
            (Some(f), None) => (f.clone(), true),
            (None, Some(p)) => (p.clone(), false),
            _ => {
                return Err(InvalidSchedule::malformed(
                    NAME,
                    "exactly one of factor and nparts must be given",
                ))
            }
        };
        let mut symbol = |name: &str| Some(LinearExpr::atom(name.to_string()));
        let count = match linearize(&count, &mut symbol).and_then(|l| l.as_constant()) {
            Some(c) => Expr::Int(c),
            None => count,
        };
        if let Some(c) = count.as_int() {
            if c <= 0 {
                return Err(InvalidSchedule::malformed(
                    NAME,
                    format!("split count must be positive, got {}", c),
                ));
            }
        }

        let (iter, begin, end, property) = match &ast.node(lp).kind {
            NodeKind::For { iter, begin, end, property, .. } => {
                (iter.clone(), begin.clone(), end.clone(), property.clone())
            }
            _ => return Err(InvalidSchedule::not_a_loop(NAME, &self.id)),
        };
        let body = match loop_body(ast, lp) {
            Some(b) => b,
            None => return Err(InvalidSchedule::not_a_loop(NAME, &self.id)),
        };

        let len = fold_sub(end.clone(), begin.clone());
        let (outer_n, inner_n) = if by_factor {
            (fold_ceil_div(len.clone(), count.clone()), count.clone())
        } else {
            (count.clone(), fold_ceil_div(len.clone(), count.clone()))
        };
        let exact = match (len.as_int(), count.as_int()) {
            (Some(n), Some(c)) => n % c == 0,
            _ => false,
        };

        let mut names = NameGen::new(ast.used_names());
        let outer_iter = names.fresh(&format!("{}.0", iter));
        let inner_iter = names.fresh(&format!("{}.1", iter));
        let mut labels = NameGen::new(ast.labels());
        let outer_label = labels.fresh(&format!("{}.0", self.id));
        let inner_label = labels.fresh(&format!("{}.1", self.id));

        // v = begin + inner + step * outer
        let stride = Expr::binary(BinaryOp::Mul, inner_n.clone(), var(&outer_iter));
        let value = fold_add(begin, var(&inner_iter) + stride);
        ast.substitute_var(body, &iter, &value);

        let inner_body = if exact {
            body
        } else {
            ast.alloc_kind(NodeKind::If { cond: lt(value, end), then_case: body, else_case: None })
        };
        let inner = ast.alloc(Node::labeled(
            inner_label.clone(),
            NodeKind::For {
                iter: inner_iter,
                begin: Expr::Int(0),
                end: inner_n,
                property: ForProperty::default(),
                body: inner_body,
            },
        ));
        *ast.node_mut(lp) = Node::labeled(
            outer_label.clone(),
            NodeKind::For { iter: outer_iter, begin: Expr::Int(0), end: outer_n, property, body: inner },
        );
        debug!("split {} into {} and {}{}", self.id, outer_label, inner_label, if exact { "" } else { " with guard" });
        Ok((outer_label, inner_label))
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::Split { id: self.id.clone(), factor: self.factor.clone(), nparts: self.nparts.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::utils::errors::InvalidScheduleKind;

    fn simple(n: i64) -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 0, n).id("L1").body(|b| {
                b.store("y", vec![var("i")], var("i"));
            });
        })
        .unwrap()
    }

    #[test]
    fn test_split_factor_exact() {
        let mut ast = simple(8);
        let labels = Split::factor("L1", 4).apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        assert_eq!(labels, ("L1.0".to_string(), "L1.1".to_string()));
        let text = ast.to_string();
        assert!(text.starts_with("L1.0: for i.0 in 0..2 {"), "{}", text);
        assert!(text.contains("L1.1: for i.1 in 0..4 {"), "{}", text);
        assert!(text.contains("y[(i.1 + (4 * i.0))] = (i.1 + (4 * i.0))"), "{}", text);
        assert!(!text.contains("if"));
    }

    #[test]
    fn test_split_guard() {
        let mut ast = simple(10);
        Split::factor("L1", 4).apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        let text = ast.to_string();
        assert!(text.contains("for i.0 in 0..3 {"), "{}", text);
        assert!(text.contains("if ((i.1 + (4 * i.0)) < 10) {"), "{}", text);
    }

    #[test]
    fn test_split_offset_and_symbolic() {
        let mut ast = AstBuilder::build(|b| {
            b.for_loop("i", 2, var("n")).id("L1").body(|b| {
                b.store("y", vec![var("i")], 0);
            });
        })
        .unwrap();
        Split::nparts("L1", 2).apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        let text = ast.to_string();
        assert!(text.contains("for i.1 in 0..ceildiv((n - 2), 2)"), "{}", text);
        assert!(text.contains("y[(2 + (i.1 + (ceildiv((n - 2), 2) * i.0)))]"), "{}", text);
    }

    #[test]
    fn test_split_bad_arguments() {
        let da = DependenceAnalysis::new();
        let mut ast = simple(8);
        let both = Split { id: "L1".to_string(), factor: Some(Expr::Int(2)), nparts: Some(Expr::Int(2)) };
        assert_eq!(both.apply(&mut ast, &da).unwrap_err().kind, InvalidScheduleKind::MalformedArguments);
        let zero = Split::factor("L1", 0);
        assert_eq!(zero.apply(&mut ast, &da).unwrap_err().kind, InvalidScheduleKind::MalformedArguments);
        let missing = Split::factor("L9", 2);
        assert_eq!(missing.apply(&mut ast, &da).unwrap_err().kind, InvalidScheduleKind::NotFound);
    }

    #[test]
    fn test_split_count_folded() {
        let da = DependenceAnalysis::new();
        let mut ast = simple(8);
        let vanishing = Split::factor("L1", var("n") - var("n"));
        assert_eq!(vanishing.apply(&mut ast, &da).unwrap_err().kind, InvalidScheduleKind::MalformedArguments);

        Split::factor("L1", var("n") - var("n") + 4).apply(&mut ast, &da).unwrap();
        let text = ast.to_string();
        assert!(text.starts_with("L1.0: for i.0 in 0..2 {"), "{}", text);
        assert!(text.contains("L1.1: for i.1 in 0..4 {"), "{}", text);
        assert!(!text.contains("if"), "{}", text);
    }
}

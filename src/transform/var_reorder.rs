//! Dimension permutation of a local buffer.

use crate::analysis::DependenceAnalysis;
use crate::ir::ast::{AccessType, Ast, CallArg, NodeId, NodeKind};
use crate::ir::expr::Expr;
use crate::transform::{ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, InvalidScheduleKind, ScheduleResult};
use log::debug;

const NAME: &str = "var_reorder";

/// Permute the dimensions of a `Cache` buffer: dimension `k` of the result
/// is dimension `order[k]` of the original.
#[derive(Debug, Clone)]
pub struct VarReorder {
    pub id: String,
    pub order: Vec<usize>,
}

impl VarReorder {
    pub fn new(id: &str, order: Vec<usize>) -> Self {
        Self { id: id.to_string(), order }
    }
}

fn permute<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&k| items[k].clone()).collect()
}

fn permute_expr(expr: &Expr, name: &str, order: &[usize]) -> Expr {
    expr.rewrite(&mut |e| match e {
        Expr::Load { var, indices } if var == name && indices.len() == order.len() => {
            let inner: Vec<Expr> = indices.iter().map(|i| permute_expr(i, name, order)).collect();
            Some(Expr::Load { var: var.clone(), indices: permute(&inner, order) })
        }
        _ => None,
    })
}

/// Rewrite every access to `name` under `id`, stopping below declarations
/// that shadow it.
fn permute_accesses(ast: &mut Ast, id: NodeId, name: &str, order: &[usize]) {
    let node = &mut ast.node_mut(id).kind;
    for e in node.exprs_mut() {
        *e = permute_expr(e, name, order);
    }
    match node {
        NodeKind::VarDef { name: n, .. } if n == name => return,
        NodeKind::Store { var, indices, .. } if var == name && indices.len() == order.len() => {
            *indices = permute(indices, order);
        }
        _ => {}
    }
    for child in ast.children(id) {
        permute_accesses(ast, child, name, order);
    }
}

impl Transform for VarReorder {
    type Output = ();

    fn apply(&self, ast: &mut Ast, _analysis: &DependenceAnalysis) -> ScheduleResult<()> {
        let vd = ast
            .find(&self.id)
            .ok_or_else(|| InvalidSchedule::not_found(NAME, &self.id))?;
        let (name, buffer, body) = match ast.kind(vd) {
            NodeKind::VarDef { name, buffer, body } => (name.clone(), buffer.clone(), *body),
            _ => {
                return Err(InvalidSchedule::new(
                    InvalidScheduleKind::NotAVarDef,
                    NAME,
                    format!("{} is not a variable definition", self.id),
                ))
            }
        };
        if buffer.atype != AccessType::Cache {
            return Err(InvalidSchedule::unsupported(
                NAME,
                format!("{} is an {} buffer; only cache buffers can be reordered", name, buffer.atype.name()),
            ));
        }
        let mut seen = vec![false; buffer.rank()];
        let valid = self.order.len() == buffer.rank()
            && self.order.iter().all(|&k| k < seen.len() && !std::mem::replace(&mut seen[k], true));
        if !valid {
            return Err(InvalidSchedule::malformed(
                NAME,
                format!("{:?} is not a permutation of {} dimensions", self.order, buffer.rank()),
            ));
        }
        let passed = ast.walk_from(body).into_iter().any(|n| {
            matches!(ast.kind(n), NodeKind::Call { args, .. }
                if args.iter().any(|a| matches!(a, CallArg::Buffer(b) if *b == name)))
        });
        if passed {
            return Err(InvalidSchedule::unsupported(
                NAME,
                format!("{} is passed to a call", name),
            ));
        }

        if let NodeKind::VarDef { buffer, .. } = &mut ast.node_mut(vd).kind {
            buffer.shape = permute(&buffer.shape, &self.order);
        }
        permute_accesses(ast, body, &name, &self.order);
        debug!("reordered dimensions of {} to {:?}", name, self.order);
        Ok(())
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::VarReorder { id: self.id.clone(), order: self.order.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, load, var, DataType};

    fn cached(atype: AccessType) -> Ast {
        AstBuilder::build(|b| {
            b.var_def("t", vec![int(4), int(8)], DataType::Float32, atype).id("V").body(|b| {
                b.for_loop("i", 0, 4).body(|b| {
                    b.for_loop("j", 0, 8).body(|b| {
                        b.store("t", vec![var("i"), var("j")], load("x", vec![var("j"), var("i")]));
                        b.store("y", vec![var("i")], load("t", vec![var("i"), var("j")]));
                    });
                });
            });
        })
        .unwrap()
    }

    #[test]
    fn test_var_reorder() {
        let mut ast = cached(AccessType::Cache);
        VarReorder::new("V", vec![1, 0]).apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        let text = ast.to_string();
        assert!(text.starts_with("V: vardef t: float32[8, 4] cache cpu {"), "{}", text);
        assert!(text.contains("t[j, i] = x[j, i]"), "{}", text);
        assert!(text.contains("y[i] = t[j, i]"), "{}", text);
    }

    #[test]
    fn test_var_reorder_rejections() {
        let da = DependenceAnalysis::new();
        let mut io = cached(AccessType::Output);
        let err = VarReorder::new("V", vec![1, 0]).apply(&mut io, &da).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::Unsupported);

        let mut ast = cached(AccessType::Cache);
        for bad in [vec![0], vec![0, 0], vec![0, 2]] {
            let err = VarReorder::new("V", bad).apply(&mut ast, &da).unwrap_err();
            assert_eq!(err.kind, InvalidScheduleKind::MalformedArguments);
        }
        let err = VarReorder::new("W", vec![1, 0]).apply(&mut ast, &da).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::NotFound);
    }
}

//! Parallel reductions.
//!
//! A reduction `y[r] = y[r] op e` under a parallel loop `for v in b..e` is
//! rewritten so every iteration accumulates into its own row of a workspace,
//! which a sequential loop folds back into `y` afterwards:
//!
//! ```text
//! vardef __reduce_L1_0: T[e - b, ...shape(y)] cache <target mem> {
//!   L1: for v in b..e @parallel {
//!     for r...: __reduce_L1_0[v - b, r...] = <neutral>
//!     ... __reduce_L1_0[v - b, idx...] = __reduce_L1_0[v - b, idx...] op e ...
//!   }
//!   for p in 0..e - b:
//!     for r...: y[r...] = y[r...] op __reduce_L1_0[p, r...]
//! }
//! ```

use crate::analysis::{match_reduction, DependenceAnalysis, ParallelVerdict, ReduceOp};
use crate::ir::ast::{AccessType, Ast, Buffer, ForProperty, Node, NodeId, NodeKind};
use crate::ir::expr::Expr;
use crate::lower::Target;
use crate::transform::{fold_sub, loop_body, set_loop_body};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use crate::utils::names::NameGen;
use log::debug;

const NAME: &str = "lower";

/// Check every parallel loop of `ast` and, when `rewrite` is set, move the
/// reductions they carry into workspaces. Loops are handled innermost first.
/// Returns the number of workspaces introduced.
pub fn lower_parallel_reductions(
    ast: &mut Ast,
    target: &Target,
    analysis: &DependenceAnalysis,
    rewrite: bool,
) -> ScheduleResult<usize> {
    let parallel: Vec<NodeId> = ast
        .loops()
        .into_iter()
        .filter(|&lp| matches!(ast.kind(lp), NodeKind::For { property, .. } if property.is_parallel()))
        .collect();
    let mut names = NameGen::new(ast.used_names());
    let mut count = 0;
    for lp in parallel.into_iter().rev() {
        let reductions = match analysis.check_parallelize(ast, lp) {
            ParallelVerdict::Safe { reductions } => reductions,
            ParallelVerdict::Unsafe(dep) => {
                return Err(InvalidSchedule::dependency(
                    NAME,
                    format!("unsolvable dependency: {}", dep.description()),
                ))
            }
        };
        if !rewrite || reductions.is_empty() {
            continue;
        }
        let mut seen: Vec<&str> = Vec::new();
        let mut k = 0;
        for (buffer, op) in &reductions {
            if seen.contains(&buffer.as_str()) {
                continue;
            }
            seen.push(buffer);
            workspace(ast, lp, buffer, *op, k, target, &mut names)?;
            k += 1;
            count += 1;
        }
    }
    Ok(count)
}

/// Nested sequential loops over `shape`, with `inner` built from the fresh
/// iterators.
fn nest_over(
    ast: &mut Ast,
    shape: &[Expr],
    names: &mut NameGen,
    inner: impl FnOnce(&mut Ast, Vec<Expr>) -> NodeId,
) -> NodeId {
    let iters: Vec<String> = shape.iter().map(|_| names.fresh("r")).collect();
    let mut stmt = inner(ast, iters.iter().map(|v| Expr::var(v.as_str())).collect());
    for (iter, extent) in iters.into_iter().zip(shape).rev() {
        stmt = ast.alloc_kind(NodeKind::For {
            iter,
            begin: Expr::Int(0),
            end: extent.clone(),
            property: ForProperty::default(),
            body: stmt,
        });
    }
    stmt
}

fn workspace(
    ast: &mut Ast,
    lp: NodeId,
    buffer: &str,
    op: ReduceOp,
    k: usize,
    target: &Target,
    names: &mut NameGen,
) -> ScheduleResult<()> {
    let (iter, begin, end) = match ast.kind(lp) {
        NodeKind::For { iter, begin, end, .. } => (iter.clone(), begin.clone(), end.clone()),
        _ => return Err(InvalidSchedule::not_a_loop(NAME, &lp.to_string())),
    };
    let host: Buffer = ast
        .lookup_buffer(buffer, lp)
        .and_then(|vd| match ast.kind(vd) {
            NodeKind::VarDef { buffer, .. } => Some(buffer.clone()),
            _ => None,
        })
        .ok_or_else(|| {
            InvalidSchedule::unsupported(NAME, format!("reduction into undeclared buffer {}", buffer))
        })?;
    let neutral = op.neutral(host.dtype).ok_or_else(|| {
        InvalidSchedule::unsupported(NAME, format!("{} reduction into {} buffer {}", op.symbol(), host.dtype, buffer))
    })?;
    let body = loop_body(ast, lp).ok_or_else(|| InvalidSchedule::not_a_loop(NAME, &iter))?;

    let stores: Vec<NodeId> = ast
        .walk_from(body)
        .into_iter()
        .filter(|&n| matches!(ast.kind(n), NodeKind::Store { var, .. } if var == buffer))
        .collect();
    let mut redirected = Vec::new();
    for s in stores {
        if let NodeKind::Store { var, indices, expr } = ast.kind(s) {
            match match_reduction(var, indices, expr) {
                Some((o, rhs)) if o == op => redirected.push((s, indices.clone(), rhs)),
                _ => {
                    return Err(InvalidSchedule::unsupported(
                        NAME,
                        format!("{} is both reduced and assigned inside a parallel loop", buffer),
                    ))
                }
            }
        }
    }

    let owner = ast.node(lp).label.clone().unwrap_or_else(|| iter.clone());
    let ws = names.fresh(&format!("__reduce_{}_{}", owner, k));
    let row = fold_sub(Expr::var(iter.as_str()), begin.clone());
    let rows = fold_sub(end, begin);

    for (s, indices, rhs) in redirected {
        let mut idx = vec![row.clone()];
        idx.extend(indices);
        let acc = Expr::load(ws.as_str(), idx.clone());
        ast.node_mut(s).kind = NodeKind::Store { var: ws.clone(), indices: idx, expr: op.combine(acc, rhs) };
    }

    let init = nest_over(ast, &host.shape, names, |ast, r| {
        let mut idx = vec![row.clone()];
        idx.extend(r);
        ast.alloc_kind(NodeKind::Store { var: ws.clone(), indices: idx, expr: neutral.clone() })
    });
    let new_body = ast.alloc_kind(NodeKind::Block(vec![init, body]));
    set_loop_body(ast, lp, new_body);

    let p = names.fresh(&iter);
    let fold = nest_over(ast, &host.shape, names, |ast, r| {
        let mut idx = vec![Expr::var(p.as_str())];
        idx.extend(r.iter().cloned());
        let value = op.combine(Expr::load(buffer, r.clone()), Expr::load(ws.as_str(), idx));
        ast.alloc_kind(NodeKind::Store { var: buffer.to_string(), indices: r, expr: value })
    });
    let combine = ast.alloc_kind(NodeKind::For {
        iter: p.clone(),
        begin: Expr::Int(0),
        end: rows.clone(),
        property: ForProperty::default(),
        body: fold,
    });

    let mut shape = vec![rows];
    shape.extend(host.shape.iter().cloned());
    let decl_body = ast.alloc_kind(NodeKind::Block(vec![lp, combine]));
    let decl = ast.alloc(Node::new(NodeKind::VarDef {
        name: ws.clone(),
        buffer: Buffer::new(shape, host.dtype, AccessType::Cache, target.default_mem),
        body: decl_body,
    }));
    if !ast.replace(lp, decl) {
        return Err(InvalidSchedule::malformed(NAME, format!("{} is detached from the tree", owner)));
    }
    debug!("reduction {} {} of {} moved into {}", buffer, op.symbol(), owner, ws);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, load, min, var, DataType};
    use crate::lower::simplify::simplify;

    fn summed(atype: AccessType) -> Ast {
        AstBuilder::build(|b| {
            b.var_def("y", vec![int(2)], DataType::Float32, atype).body(|b| {
                b.for_loop("i", 0, 8).id("L1").parallel("openmp").body(|b| {
                    b.for_loop("j", 0, 2).body(|b| {
                        b.store("y", vec![var("j")], load("y", vec![var("j")]) + load("x", vec![var("i"), var("j")]));
                    });
                });
            });
        })
        .unwrap()
    }

    #[test]
    fn test_workspace_inserted() {
        let mut ast = summed(AccessType::Output);
        let n = lower_parallel_reductions(&mut ast, &Target::cpu(), &DependenceAnalysis::new(), true).unwrap();
        assert_eq!(n, 1);
        simplify(&mut ast);
        ast.compact();
        ast.reindex().unwrap();
        let text = ast.to_string();
        assert!(text.contains("vardef __reduce_L1_0: float32[8, 2] cache cpu {"), "{}", text);
        assert!(text.contains("__reduce_L1_0[i, r] = 0.0"), "{}", text);
        assert!(text.contains("__reduce_L1_0[i, j] = (__reduce_L1_0[i, j] + x[i, j])"), "{}", text);
        assert!(text.contains("y[r.1] = (y[r.1] + __reduce_L1_0[i.1, r.1])"), "{}", text);

        // the rewritten loop no longer carries anything
        let lp = ast.find("L1").unwrap();
        assert!(matches!(
            DependenceAnalysis::new().check_parallelize(&ast, lp),
            ParallelVerdict::Safe { reductions } if reductions.is_empty()
        ));
    }

    #[test]
    fn test_check_only() {
        let mut ast = summed(AccessType::Output);
        let before = ast.clone();
        let n = lower_parallel_reductions(&mut ast, &Target::cpu(), &DependenceAnalysis::new(), false).unwrap();
        assert_eq!(n, 0);
        assert!(ast.matches(&before));
    }

    #[test]
    fn test_undeclared_buffer() {
        let mut ast = AstBuilder::build(|b| {
            b.for_loop("i", 0, 8).parallel("openmp").body(|b| {
                b.store("s", vec![], load("s", vec![]) + load("x", vec![var("i")]));
            });
        })
        .unwrap();
        let err = lower_parallel_reductions(&mut ast, &Target::cpu(), &DependenceAnalysis::new(), true).unwrap_err();
        assert_eq!(err.kind, crate::utils::errors::InvalidScheduleKind::Unsupported);
    }

    fn min_into(dtype: DataType) -> Ast {
        AstBuilder::build(|b| {
            b.var_def("y", vec![int(1)], dtype, AccessType::Output).body(|b| {
                b.for_loop("i", 0, 8).id("L1").parallel("openmp").body(|b| {
                    b.store("y", vec![int(0)], min(load("y", vec![int(0)]), load("x", vec![var("i")])));
                });
            });
        })
        .unwrap()
    }

    #[test]
    fn test_int32_min_workspace() {
        let mut ast = min_into(DataType::Int32);
        lower_parallel_reductions(&mut ast, &Target::cpu(), &DependenceAnalysis::new(), true).unwrap();
        simplify(&mut ast);
        let text = ast.to_string();
        assert!(text.contains("vardef __reduce_L1_0: int32[8, 1] cache cpu {"), "{}", text);
        assert!(text.contains("__reduce_L1_0[i, 0] = 2147483647"), "{}", text);
        assert!(!text.contains("9223372036854775807"), "{}", text);
    }

    #[test]
    fn test_bool_reduction_rejected() {
        let mut ast = min_into(DataType::Bool);
        let err = lower_parallel_reductions(&mut ast, &Target::cpu(), &DependenceAnalysis::new(), true).unwrap_err();
        assert_eq!(err.kind, crate::utils::errors::InvalidScheduleKind::Unsupported);
        assert!(err.message.contains("bool"));
    }
}

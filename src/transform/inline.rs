//! Call expansion.
//!
//! A `Call` node is replaced by a private copy of the callee body:
//! - buffer parameters are renamed to the buffers passed at the call site;
//! - scalar value parameters are replaced by the argument expression;
//! - every iterator and buffer declared inside the body gets a fresh name,
//!   so two expansions of the same function never share identifiers;
//! - labels become `<call label or callee>.<label>`.
//!
//! Calls inside the expanded body are expanded in turn.

use crate::analysis::{written_buffers, DependenceAnalysis};
use crate::ir::ast::{Ast, Buffer, CallArg, NodeId, NodeKind};
use crate::ir::expr::Expr;
use crate::ir::func::{Function, FunctionRegistry, Param};
use crate::transform::{ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, InvalidScheduleKind, ScheduleResult};
use crate::utils::names::NameGen;
use log::debug;
use std::collections::HashMap;

const NAME: &str = "inline";

/// Expand every call of the tree.
#[derive(Debug, Clone, Copy)]
pub struct InlineAll<'a> {
    pub registry: &'a FunctionRegistry,
}

impl<'a> Transform for InlineAll<'a> {
    /// Number of expanded calls
    type Output = usize;

    fn apply(&self, ast: &mut Ast, _analysis: &DependenceAnalysis) -> ScheduleResult<usize> {
        inline_all(ast, self.registry)
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::Inline
    }
}

fn calls_in(ast: &Ast, id: NodeId) -> Vec<NodeId> {
    ast.walk_from(id)
        .into_iter()
        .filter(|&n| matches!(ast.kind(n), NodeKind::Call { .. }))
        .collect()
}

/// Expand every call reachable in `ast`. Returns the number of expanded
/// calls, nested ones included.
pub fn inline_all(ast: &mut Ast, registry: &FunctionRegistry) -> ScheduleResult<usize> {
    let mut count = 0;
    for call in calls_in(ast, ast.root()) {
        count += expand(ast, call, registry, &mut Vec::new())?;
    }
    Ok(count)
}

/// Expand one call node (and the calls it brings in).
pub fn inline_call(ast: &mut Ast, call: NodeId, registry: &FunctionRegistry) -> ScheduleResult<usize> {
    expand(ast, call, registry, &mut Vec::new())
}

fn mismatch(callee: &str, message: String) -> InvalidSchedule {
    InvalidSchedule::mismatch(NAME, format!("call to {}: {}", callee, message))
}

fn check_buffer_arg(
    ast: &Ast,
    call: NodeId,
    func: &Function,
    param: &Param,
    arg: &str,
    writes: &[String],
) -> ScheduleResult<()> {
    let host: Buffer = ast
        .lookup_buffer(arg, call)
        .and_then(|vd| match ast.kind(vd) {
            NodeKind::VarDef { buffer, .. } => Some(buffer.clone()),
            _ => None,
        })
        .ok_or_else(|| mismatch(&func.name, format!("buffer {} is not declared at the call site", arg)))?;
    let expected = &param.buffer;
    if host.rank() != expected.rank() {
        return Err(mismatch(
            &func.name,
            format!("{} has rank {}, parameter {} expects {}", arg, host.rank(), param.name, expected.rank()),
        ));
    }
    if host.dtype != expected.dtype {
        return Err(mismatch(
            &func.name,
            format!("{} is {}, parameter {} expects {}", arg, host.dtype, param.name, expected.dtype),
        ));
    }
    for (k, (h, p)) in host.shape.iter().zip(&expected.shape).enumerate() {
        if let (Some(h), Some(p)) = (h.as_int(), p.as_int()) {
            if h != p {
                return Err(mismatch(
                    &func.name,
                    format!("dimension {} of {} is {}, parameter {} expects {}", k, arg, h, param.name, p),
                ));
            }
        }
    }
    if writes.contains(&param.name) && (!expected.atype.is_writable() || !host.atype.is_writable()) {
        return Err(mismatch(
            &func.name,
            format!("{} is written through input parameter {}", arg, param.name),
        ));
    }
    Ok(())
}

fn expand(
    ast: &mut Ast,
    call: NodeId,
    registry: &FunctionRegistry,
    stack: &mut Vec<String>,
) -> ScheduleResult<usize> {
    let (callee, args) = match ast.kind(call) {
        NodeKind::Call { callee, args } => (callee.clone(), args.clone()),
        other => {
            return Err(InvalidSchedule::malformed(NAME, format!("{} is a {}, not a call", call, other.kind_name())))
        }
    };
    if stack.contains(&callee) {
        return Err(InvalidSchedule::new(
            InvalidScheduleKind::RecursiveCall,
            NAME,
            format!("{} calls itself through {}", callee, stack.join(" -> ")),
        ));
    }
    let func = registry.get(&callee).ok_or_else(|| {
        InvalidSchedule::new(
            InvalidScheduleKind::FunctionNotRegistered,
            NAME,
            format!("function {} is not registered", callee),
        )
    })?;
    if args.len() != func.params.len() {
        return Err(mismatch(
            &callee,
            format!("{} arguments given, {} expected", args.len(), func.params.len()),
        ));
    }

    let writes = written_buffers(&func.body, func.body.root());
    let mut buffers: HashMap<String, String> = HashMap::new();
    let mut values: Vec<(String, Expr)> = Vec::new();
    for (param, arg) in func.params.iter().zip(&args) {
        match arg {
            CallArg::Buffer(name) => {
                check_buffer_arg(ast, call, func, param, name, &writes)?;
                buffers.insert(param.name.clone(), name.clone());
            }
            CallArg::Value(expr) => {
                if param.buffer.rank() != 0 || param.buffer.atype.is_writable() || writes.contains(&param.name) {
                    return Err(mismatch(
                        &callee,
                        format!("value passed to parameter {}, which is not a scalar input", param.name),
                    ));
                }
                values.push((param.name.clone(), expr.clone()));
            }
        }
    }

    let root = func.body.deep_copy(func.body.root(), ast);

    // Fresh names for everything the body declares.
    let mut names = NameGen::new(ast.used_names());
    for p in &func.params {
        names.reserve(p.name.clone());
    }
    let mut vars: HashMap<String, String> = HashMap::new();
    for n in ast.walk_from(root) {
        match ast.kind(n) {
            NodeKind::For { iter, .. } if !vars.contains_key(iter) => {
                let fresh = names.fresh(iter);
                vars.insert(iter.clone(), fresh);
            }
            NodeKind::VarDef { name, .. } if !buffers.contains_key(name) => {
                let fresh = names.fresh(name);
                buffers.insert(name.clone(), fresh);
            }
            _ => {}
        }
    }
    ast.rename(root, &vars, &buffers);

    for (param, value) in &values {
        ast.substitute_var(root, param, value);
        ast.for_each_expr_mut(root, &mut |e| {
            *e = e.rewrite(&mut |x| match x {
                Expr::Load { var, indices } if var == param && indices.is_empty() => Some(value.clone()),
                _ => None,
            });
        });
    }

    let prefix = ast.node(call).label.clone().unwrap_or_else(|| callee.clone());
    let mut labels = NameGen::new(ast.labels());
    for n in ast.walk_from(root) {
        if let Some(label) = ast.node(n).label.clone() {
            let fresh = labels.fresh(&format!("{}.{}", prefix, label));
            ast.node_mut(n).label = Some(fresh);
        }
    }

    ast.replace(call, root);
    debug!("inlined call to {}", callee);

    stack.push(callee);
    let mut count = 1;
    for nested in calls_in(ast, root) {
        count += expand(ast, nested, registry, stack)?;
    }
    stack.pop();
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{AccessType, MemType};
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, load, var, DataType};
    use crate::ir::func::RegistryBuilder;
    use std::sync::Arc;

    fn buf(n: i64, atype: AccessType) -> Buffer {
        Buffer::new(vec![int(n)], DataType::Int32, atype, MemType::Cpu)
    }

    fn registry() -> Arc<FunctionRegistry> {
        let body = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L").body(|b| {
                b.store("y", vec![var("i")], load("x", vec![var("i")]) * var("k"));
            });
        })
        .unwrap();
        let scalar = Buffer::new(vec![], DataType::Int32, AccessType::Input, MemType::ByValue);
        let scale = Function::new(
            "scale",
            vec![
                Param::new("x", buf(4, AccessType::Input)),
                Param::new("y", buf(4, AccessType::Output)),
                Param::new("k", scalar),
            ],
            body,
        );
        let looped = Function::new(
            "looped",
            vec![],
            AstBuilder::build(|b| {
                b.call("looped", vec![]);
            })
            .unwrap(),
        );
        let mut builder = RegistryBuilder::new();
        builder.register(scale).unwrap();
        builder.register(looped).unwrap();
        builder.build()
    }

    fn host(args: Vec<CallArg>, a_type: AccessType) -> Ast {
        AstBuilder::build(|b| {
            b.var_def("a", vec![int(4)], DataType::Int32, AccessType::Input).body(|b| {
                b.var_def("b", vec![int(4)], DataType::Int32, a_type).body(|b| {
                    let c = b.call("scale", args);
                    b.set_label(c, "C");
                });
            });
        })
        .unwrap()
    }

    fn args() -> Vec<CallArg> {
        vec![
            CallArg::Buffer("a".to_string()),
            CallArg::Buffer("b".to_string()),
            CallArg::Value(int(3)),
        ]
    }

    #[test]
    fn test_inline_basic() {
        let reg = registry();
        let mut ast = host(args(), AccessType::Output);
        assert_eq!(inline_all(&mut ast, &reg).unwrap(), 1);
        ast.compact();
        ast.reindex().unwrap();
        let text = ast.to_string();
        assert!(text.contains("C.L: for i in 0..4 {"), "{}", text);
        assert!(text.contains("b[i] = (a[i] * 3)"), "{}", text);
    }

    #[test]
    fn test_inline_errors() {
        let reg = registry();
        let mut wrong_arity = host(vec![CallArg::Buffer("a".to_string())], AccessType::Output);
        let err = inline_all(&mut wrong_arity, &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::ArgumentMismatch);

        let mut through_input = host(args(), AccessType::Input);
        let err = inline_all(&mut through_input, &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::ArgumentMismatch);

        let mut unknown = AstBuilder::build(|b| {
            b.call("missing", vec![]);
        })
        .unwrap();
        let err = inline_all(&mut unknown, &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::FunctionNotRegistered);

        let mut recursive = AstBuilder::build(|b| {
            b.call("looped", vec![]);
        })
        .unwrap();
        let err = inline_all(&mut recursive, &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::RecursiveCall);
    }
}

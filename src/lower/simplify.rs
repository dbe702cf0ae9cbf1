//! Tree simplification.
//!
//! Expressions are constant-folded and stripped of algebraic identities.
//! Integer comparisons are decided from the ranges of the enclosing loop
//! iterators when possible, which removes guards made redundant by the
//! schedule. Statements that can no longer run (dead branches, empty loops,
//! empty local buffers) are dropped and blocks are flattened.

use crate::analysis::{const_extent, Interval, LinearExpr};
use crate::analysis::linear::linearize;
use crate::ir::ast::{AccessType, Ast, NodeId, NodeKind};
use crate::ir::expr::{BinaryOp, Expr, UnaryOp};
use num_integer::Integer;

/// Simplify `ast` in place. Unreachable arena slots are left behind; call
/// [`Ast::compact`] afterwards.
pub fn simplify(ast: &mut Ast) {
    let root = ast.root();
    let root = match Simplifier::default().stmt(ast, root) {
        Some(r) => r,
        None => ast.alloc_kind(NodeKind::Block(Vec::new())),
    };
    ast.set_root(root);
}

/// Fold one expression without any knowledge of loop ranges.
pub fn simplify_expr(expr: &Expr) -> Expr {
    Simplifier::default().expr(expr)
}

#[derive(Debug, Default)]
struct Simplifier {
    /// Ranges of the enclosing iterators, innermost last
    bounds: Vec<(String, Interval)>,
}

impl Simplifier {
    fn bound(&self, name: &str) -> Interval {
        self.bounds
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, r)| *r)
            .unwrap_or_else(Interval::unbounded)
    }

    fn range(&self, e: &Expr) -> Option<Interval> {
        let lin: LinearExpr<String> = linearize(e, &mut |n| Some(LinearExpr::atom(n.to_string())))?;
        Some(lin.range(|k| self.bound(k)))
    }

    /// Decide `a op b` over the current ranges.
    fn compare(&self, op: BinaryOp, a: &Expr, b: &Expr) -> Option<bool> {
        let d = self.range(&Expr::binary(BinaryOp::Sub, a.clone(), b.clone()))?;
        let neg = d.hi.map_or(false, |h| h < 0);
        let pos = d.lo.map_or(false, |l| l > 0);
        let non_neg = d.lo.map_or(false, |l| l >= 0);
        let non_pos = d.hi.map_or(false, |h| h <= 0);
        let decide = |yes: bool, no: bool| if yes { Some(true) } else if no { Some(false) } else { None };
        match op {
            BinaryOp::Lt => decide(neg, non_neg),
            BinaryOp::Le => decide(non_pos, pos),
            BinaryOp::Gt => decide(pos, non_pos),
            BinaryOp::Ge => decide(non_neg, neg),
            BinaryOp::Eq => decide(non_neg && non_pos, neg || pos),
            BinaryOp::Ne => decide(neg || pos, non_neg && non_pos),
            _ => None,
        }
    }

    fn expr(&self, e: &Expr) -> Expr {
        match e {
            Expr::Load { var, indices } => Expr::Load {
                var: var.clone(),
                indices: indices.iter().map(|i| self.expr(i)).collect(),
            },
            Expr::Unary { op, operand } => {
                let a = self.expr(operand);
                match (op, a) {
                    (UnaryOp::Neg, Expr::Int(v)) if v != i64::MIN => Expr::Int(-v),
                    (UnaryOp::Neg, Expr::Float(v)) => Expr::Float(-v),
                    (UnaryOp::Not, Expr::Bool(v)) => Expr::Bool(!v),
                    (UnaryOp::Not, Expr::Unary { op: UnaryOp::Not, operand }) => *operand,
                    (op, a) => Expr::unary(*op, a),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, self.expr(lhs), self.expr(rhs)),
            other => other.clone(),
        }
    }

    fn binary(&self, op: BinaryOp, a: Expr, b: Expr) -> Expr {
        let folded = match (&a, &b) {
            (Expr::Int(x), Expr::Int(y)) => fold_ints(op, *x, *y),
            (Expr::Float(x), Expr::Float(y)) => fold_floats(op, *x, *y),
            (Expr::Bool(x), Expr::Bool(y)) => fold_bools(op, *x, *y),
            _ => None,
        };
        if let Some(v) = folded {
            return v;
        }
        if op.is_comparison() {
            if let Some(v) = self.compare(op, &a, &b) {
                return Expr::Bool(v);
            }
        }
        let integral = |e: &Expr| self.range(e).is_some();
        match (op, &a, &b) {
            (BinaryOp::Add, Expr::Int(0), _) => b,
            (BinaryOp::Add, _, Expr::Int(0)) | (BinaryOp::Sub, _, Expr::Int(0)) => a,
            (BinaryOp::Sub, _, _) if a == b && integral(&a) => Expr::Int(0),
            (BinaryOp::Mul, Expr::Int(1), _) => b,
            (BinaryOp::Mul, _, Expr::Int(1)) => a,
            (BinaryOp::Mul, Expr::Int(0), _) if integral(&b) => Expr::Int(0),
            (BinaryOp::Mul, _, Expr::Int(0)) if integral(&a) => Expr::Int(0),
            (BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::CeilDiv, _, Expr::Int(1)) => a,
            (BinaryOp::And, Expr::Bool(true), _) | (BinaryOp::Or, Expr::Bool(false), _) => b,
            (BinaryOp::And, _, Expr::Bool(true)) | (BinaryOp::Or, _, Expr::Bool(false)) => a,
            (BinaryOp::And, Expr::Bool(false), _) | (BinaryOp::And, _, Expr::Bool(false)) => Expr::Bool(false),
            (BinaryOp::Or, Expr::Bool(true), _) | (BinaryOp::Or, _, Expr::Bool(true)) => Expr::Bool(true),
            (BinaryOp::Min, _, _) => match self.compare(BinaryOp::Le, &a, &b) {
                Some(true) => a,
                Some(false) => b,
                None => Expr::binary(op, a, b),
            },
            (BinaryOp::Max, _, _) => match self.compare(BinaryOp::Ge, &a, &b) {
                Some(true) => a,
                Some(false) => b,
                None => Expr::binary(op, a, b),
            },
            _ => Expr::binary(op, a, b),
        }
    }

    fn fold_exprs(&self, ast: &mut Ast, id: NodeId) {
        for e in ast.node_mut(id).kind.exprs_mut() {
            *e = self.expr(e);
        }
    }

    /// Simplify the statement `id`; `None` when nothing of it remains.
    fn stmt(&mut self, ast: &mut Ast, id: NodeId) -> Option<NodeId> {
        self.fold_exprs(ast, id);
        match ast.kind(id).clone() {
            NodeKind::VarDef { buffer, body, .. } => {
                let body = match self.stmt(ast, body) {
                    Some(b) => b,
                    None if buffer.atype == AccessType::Cache => return None,
                    None => ast.alloc_kind(NodeKind::Block(Vec::new())),
                };
                if let NodeKind::VarDef { body: slot, .. } = &mut ast.node_mut(id).kind {
                    *slot = body;
                }
                Some(id)
            }
            NodeKind::For { iter, begin, end, property, body } => {
                match const_extent(ast, id) {
                    Some(n) if n <= 0 => return None,
                    Some(1) if !property.is_parallel() => {
                        ast.substitute_var(body, &iter, &begin);
                        return self.stmt(ast, body);
                    }
                    _ => {}
                }
                let lo = self.range(&begin).and_then(|r| r.lo);
                let hi = self.range(&end).and_then(|r| r.hi).and_then(|h| h.checked_sub(1));
                self.bounds.push((iter, Interval { lo, hi }));
                let body = self.stmt(ast, body);
                self.bounds.pop();
                let body = body?;
                if let NodeKind::For { body: slot, .. } = &mut ast.node_mut(id).kind {
                    *slot = body;
                }
                Some(id)
            }
            NodeKind::If { cond, then_case, else_case } => {
                match cond {
                    Expr::Bool(true) => return self.stmt(ast, then_case),
                    Expr::Bool(false) => return else_case.and_then(|e| self.stmt(ast, e)),
                    _ => {}
                }
                let then_case = self.stmt(ast, then_case);
                let else_case = else_case.and_then(|e| self.stmt(ast, e));
                let kind = match (then_case, else_case) {
                    (None, None) => return None,
                    (Some(t), e) => NodeKind::If { cond, then_case: t, else_case: e },
                    (None, Some(e)) => NodeKind::If {
                        cond: self.expr(&Expr::unary(UnaryOp::Not, cond)),
                        then_case: e,
                        else_case: None,
                    },
                };
                ast.node_mut(id).kind = kind;
                Some(id)
            }
            NodeKind::Block(stmts) => {
                let mut flat = Vec::with_capacity(stmts.len());
                for s in stmts {
                    if let Some(n) = self.stmt(ast, s) {
                        match ast.kind(n) {
                            NodeKind::Block(inner) if ast.node(n).label.is_none() => flat.extend(inner.iter().copied()),
                            _ => flat.push(n),
                        }
                    }
                }
                let labeled = ast.node(id).label.is_some();
                if flat.is_empty() && !labeled {
                    return None;
                }
                if flat.len() == 1 && !labeled {
                    return Some(flat[0]);
                }
                ast.node_mut(id).kind = NodeKind::Block(flat);
                Some(id)
            }
            NodeKind::Store { .. } | NodeKind::Call { .. } | NodeKind::Any => Some(id),
        }
    }
}

fn fold_ints(op: BinaryOp, x: i64, y: i64) -> Option<Expr> {
    let v = match op {
        BinaryOp::Add => Expr::Int(x.checked_add(y)?),
        BinaryOp::Sub => Expr::Int(x.checked_sub(y)?),
        BinaryOp::Mul => Expr::Int(x.checked_mul(y)?),
        BinaryOp::Div if y != 0 && x % y == 0 => Expr::Int(x / y),
        BinaryOp::FloorDiv if y != 0 => Expr::Int(Integer::div_floor(&x, &y)),
        BinaryOp::CeilDiv if y != 0 => Expr::Int(Integer::div_ceil(&x, &y)),
        BinaryOp::Mod if y != 0 => Expr::Int(Integer::mod_floor(&x, &y)),
        BinaryOp::Min => Expr::Int(x.min(y)),
        BinaryOp::Max => Expr::Int(x.max(y)),
        BinaryOp::Lt => Expr::Bool(x < y),
        BinaryOp::Le => Expr::Bool(x <= y),
        BinaryOp::Gt => Expr::Bool(x > y),
        BinaryOp::Ge => Expr::Bool(x >= y),
        BinaryOp::Eq => Expr::Bool(x == y),
        BinaryOp::Ne => Expr::Bool(x != y),
        _ => return None,
    };
    Some(v)
}

fn fold_floats(op: BinaryOp, x: f64, y: f64) -> Option<Expr> {
    let v = match op {
        BinaryOp::Add => Expr::Float(x + y),
        BinaryOp::Sub => Expr::Float(x - y),
        BinaryOp::Mul => Expr::Float(x * y),
        BinaryOp::Div => Expr::Float(x / y),
        BinaryOp::Min => Expr::Float(x.min(y)),
        BinaryOp::Max => Expr::Float(x.max(y)),
        BinaryOp::Lt => Expr::Bool(x < y),
        BinaryOp::Le => Expr::Bool(x <= y),
        BinaryOp::Gt => Expr::Bool(x > y),
        BinaryOp::Ge => Expr::Bool(x >= y),
        _ => return None,
    };
    Some(v)
}

fn fold_bools(op: BinaryOp, x: bool, y: bool) -> Option<Expr> {
    match op {
        BinaryOp::And => Some(Expr::Bool(x && y)),
        BinaryOp::Or => Some(Expr::Bool(x || y)),
        BinaryOp::Eq => Some(Expr::Bool(x == y)),
        BinaryOp::Ne => Some(Expr::Bool(x != y)),
        _ => None,
    }
}

//! Structural equivalence of trees.
//!
//! Two trees match when they are isomorphic under one consistent, bijective
//! renaming of bound names (loop iterators and buffers declared inside the
//! tree). Free names must be identical. An `Any` node on either side matches
//! one whole subtree. Labels are ignored and block nesting is flattened, so
//! `{a; {b; c}}` matches `{a; b; c}`.

use crate::ir::ast::{Ast, CallArg, Node, NodeId, NodeKind};
use crate::ir::expr::Expr;
use std::collections::HashMap;

/// Whether `a` and `b` are structurally equivalent.
pub fn match_ast(a: &Ast, b: &Ast) -> bool {
    Matcher::new(a, b).nodes(a.root(), b.root())
}

impl Ast {
    /// Structural equivalence, see [`match_ast`].
    pub fn matches(&self, other: &Ast) -> bool {
        match_ast(self, other)
    }
}

struct Matcher<'a> {
    a: &'a Ast,
    b: &'a Ast,
    forward: HashMap<String, String>,
    backward: HashMap<String, String>,
}

impl<'a> Matcher<'a> {
    fn new(a: &'a Ast, b: &'a Ast) -> Self {
        Self { a, b, forward: HashMap::new(), backward: HashMap::new() }
    }

    fn names(&self, x: &str, y: &str) -> bool {
        match (self.forward.get(x), self.backward.get(y)) {
            (Some(fy), Some(bx)) => fy == y && bx == x,
            (None, None) => x == y,
            _ => false,
        }
    }

    /// Match `f` with `x` (in a) bound to `y` (in b); restores the previous
    /// bindings afterwards.
    fn bind(&mut self, x: &str, y: &str, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let old_fwd = self.forward.insert(x.to_string(), y.to_string());
        let old_bwd = self.backward.insert(y.to_string(), x.to_string());
        let result = f(self);
        match old_fwd {
            Some(v) => self.forward.insert(x.to_string(), v),
            None => self.forward.remove(x),
        };
        match old_bwd {
            Some(v) => self.backward.insert(y.to_string(), v),
            None => self.backward.remove(y),
        };
        result
    }

    fn flatten(ast: &Ast, id: NodeId, out: &mut Vec<NodeId>) {
        match ast.kind(id) {
            NodeKind::Block(stmts) => {
                for s in stmts {
                    Self::flatten(ast, *s, out);
                }
            }
            _ => out.push(id),
        }
    }

    fn nodes(&mut self, x: NodeId, y: NodeId) -> bool {
        let (a, b) = (self.a, self.b);
        let na = a.node(x);
        let nb = b.node(y);
        if matches!(na.kind, NodeKind::Any) || matches!(nb.kind, NodeKind::Any) {
            return true;
        }
        if matches!(na.kind, NodeKind::Block(_)) || matches!(nb.kind, NodeKind::Block(_)) {
            let (mut xs, mut ys) = (Vec::new(), Vec::new());
            Self::flatten(a, x, &mut xs);
            Self::flatten(b, y, &mut ys);
            return self.sequences(&xs, &ys);
        }
        self.stmts(na, nb)
    }

    /// Sequences of non-block nodes. Statements that come after a binding
    /// node are not in its scope, so each pair is matched independently.
    fn sequences(&mut self, xs: &[NodeId], ys: &[NodeId]) -> bool {
        xs.len() == ys.len() && xs.iter().zip(ys).all(|(&x, &y)| self.nodes(x, y))
    }

    fn stmts(&mut self, na: &Node, nb: &Node) -> bool {
        match (&na.kind, &nb.kind) {
            (
                NodeKind::VarDef { name: n1, buffer: b1, body: body1 },
                NodeKind::VarDef { name: n2, buffer: b2, body: body2 },
            ) => {
                b1.dtype == b2.dtype
                    && b1.atype == b2.atype
                    && b1.mtype == b2.mtype
                    && self.expr_lists(&b1.shape, &b2.shape)
                    && self.bind(n1, n2, |m| m.nodes(*body1, *body2))
            }
            (
                NodeKind::For { iter: i1, begin: s1, end: e1, property: p1, body: body1 },
                NodeKind::For { iter: i2, begin: s2, end: e2, property: p2, body: body2 },
            ) => {
                p1.mode == p2.mode
                    && p1.no_deps.len() == p2.no_deps.len()
                    && p1.no_deps.iter().zip(&p2.no_deps).all(|(x, y)| self.names(x, y))
                    && self.exprs(s1, s2)
                    && self.exprs(e1, e2)
                    && self.bind(i1, i2, |m| m.nodes(*body1, *body2))
            }
            (
                NodeKind::If { cond: c1, then_case: t1, else_case: f1 },
                NodeKind::If { cond: c2, then_case: t2, else_case: f2 },
            ) => {
                self.exprs(c1, c2)
                    && self.nodes(*t1, *t2)
                    && match (f1, f2) {
                        (Some(f1), Some(f2)) => self.nodes(*f1, *f2),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (
                NodeKind::Store { var: v1, indices: i1, expr: e1 },
                NodeKind::Store { var: v2, indices: i2, expr: e2 },
            ) => self.names(v1, v2) && self.expr_lists(i1, i2) && self.exprs(e1, e2),
            (
                NodeKind::Call { callee: c1, args: a1 },
                NodeKind::Call { callee: c2, args: a2 },
            ) => {
                c1 == c2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|pair| match pair {
                        (CallArg::Buffer(x), CallArg::Buffer(y)) => self.names(x, y),
                        (CallArg::Value(x), CallArg::Value(y)) => self.exprs(x, y),
                        _ => false,
                    })
            }
            _ => false,
        }
    }

    fn expr_lists(&self, xs: &[Expr], ys: &[Expr]) -> bool {
        xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.exprs(x, y))
    }

    fn exprs(&self, x: &Expr, y: &Expr) -> bool {
        match (x, y) {
            (Expr::Int(a), Expr::Int(b)) => a == b,
            (Expr::Float(a), Expr::Float(b)) => a.to_bits() == b.to_bits(),
            (Expr::Bool(a), Expr::Bool(b)) => a == b,
            (Expr::Var(a), Expr::Var(b)) => self.names(a, b),
            (Expr::Load { var: a, indices: ia }, Expr::Load { var: b, indices: ib }) => {
                self.names(a, b) && self.expr_lists(ia, ib)
            }
            (Expr::Unary { op: o1, operand: x1 }, Expr::Unary { op: o2, operand: x2 }) => {
                o1 == o2 && self.exprs(x1, x2)
            }
            (
                Expr::Binary { op: o1, lhs: l1, rhs: r1 },
                Expr::Binary { op: o2, lhs: l2, rhs: r2 },
            ) => o1 == o2 && self.exprs(l1, l2) && self.exprs(r1, r2),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::AccessType;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, var, load, DataType};

    fn nest(outer: &str, inner: &str, label: Option<&str>) -> Ast {
        AstBuilder::build(|b| {
            b.var_def("y", vec![int(4), int(8)], DataType::Int32, AccessType::Output).body(|b| {
                let mut lp = b.for_loop(outer, 0, 4);
                if let Some(l) = label {
                    lp = lp.id(l);
                }
                lp.body(|b| {
                    b.for_loop(inner, 0, 8).body(|b| {
                        b.store("y", vec![var(outer), var(inner)], var(outer) + var(inner));
                    });
                });
            });
        })
        .unwrap()
    }

    #[test]
    fn test_rename_bound_names() {
        assert!(match_ast(&nest("i", "j", Some("L1")), &nest("p", "q", None)));
    }

    #[test]
    fn test_bijection_required() {
        // both iterators mapped to the same name on the other side
        let a = nest("i", "j", None);
        let b = AstBuilder::build(|b| {
            b.var_def("y", vec![int(4), int(8)], DataType::Int32, AccessType::Output).body(|b| {
                b.for_loop("i", 0, 4).body(|b| {
                    b.for_loop("i", 0, 8).body(|b| {
                        b.store("y", vec![var("i"), var("i")], var("i") + var("i"));
                    });
                });
            });
        })
        .unwrap();
        assert!(!match_ast(&a, &b));
    }

    #[test]
    fn test_free_names_must_agree() {
        let a = AstBuilder::build(|b| {
            b.store("y", vec![int(0)], load("x", vec![int(0)]));
        })
        .unwrap();
        let b = AstBuilder::build(|b| {
            b.store("y", vec![int(0)], load("z", vec![int(0)]));
        })
        .unwrap();
        assert!(!match_ast(&a, &b));
        assert!(match_ast(&a, &a.clone()));
    }

    #[test]
    fn test_any_and_block_flattening() {
        let a = AstBuilder::build(|b| {
            b.store("y", vec![int(0)], 1);
            b.if_then(var("n"), |b| {
                b.store("y", vec![int(1)], 2);
                b.store("y", vec![int(2)], 3);
            });
        })
        .unwrap();
        let b = AstBuilder::build(|b| {
            b.store("y", vec![int(0)], 1);
            b.any();
        })
        .unwrap();
        assert!(match_ast(&a, &b));
        assert!(match_ast(&b, &a));

        let flat = AstBuilder::build(|b| {
            b.store("y", vec![int(0)], 1);
            b.store("y", vec![int(1)], 2);
        })
        .unwrap();
        let mut nested = flat.clone();
        let root = nested.root();
        let inner = nested.alloc_kind(NodeKind::Block(nested.children(root)));
        let outer = nested.alloc_kind(NodeKind::Block(vec![inner]));
        nested.replace(root, outer);
        assert!(match_ast(&flat, &nested));
    }

    #[test]
    fn test_constants_and_modes_must_agree() {
        let a = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).body(|b| {
                b.store("y", vec![var("i")], 1);
            });
        })
        .unwrap();
        let b = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).parallel("openmp").body(|b| {
                b.store("y", vec![var("i")], 1);
            });
        })
        .unwrap();
        let c = AstBuilder::build(|b| {
            b.for_loop("i", 0, 5).body(|b| {
                b.store("y", vec![var("i")], 1);
            });
        })
        .unwrap();
        assert!(!match_ast(&a, &b));
        assert!(!match_ast(&a, &c));
    }
}

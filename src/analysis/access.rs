//! Buffer accesses of a subtree.
//!
//! Accesses are derived on demand rather than stored in the tree. Each one
//! remembers its owning statement, its syntactic position, the loops that
//! enclose it inside the analysed scope and whether it is part of a
//! recognized reduction.

use crate::ir::ast::{Ast, NodeId, NodeKind};
use crate::ir::expr::{BinaryOp, DataType, Expr};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

/// Commutative and associative combine operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    Add,
    Mul,
    Min,
    Max,
}

impl ReduceOp {
    pub fn from_binary(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Add => Some(ReduceOp::Add),
            BinaryOp::Mul => Some(ReduceOp::Mul),
            BinaryOp::Min => Some(ReduceOp::Min),
            BinaryOp::Max => Some(ReduceOp::Max),
            _ => None,
        }
    }

    pub fn binary(&self) -> BinaryOp {
        match self {
            ReduceOp::Add => BinaryOp::Add,
            ReduceOp::Mul => BinaryOp::Mul,
            ReduceOp::Min => BinaryOp::Min,
            ReduceOp::Max => BinaryOp::Max,
        }
    }

    /// Identity element in the value range of `dtype`. `None` for `Bool`,
    /// which has no arithmetic reductions.
    pub fn neutral(&self, dtype: DataType) -> Option<Expr> {
        let (lo, hi) = match dtype {
            DataType::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            DataType::Int64 => (i64::MIN, i64::MAX),
            DataType::Float32 | DataType::Float64 => {
                return Some(Expr::Float(match self {
                    ReduceOp::Add => 0.0,
                    ReduceOp::Mul => 1.0,
                    ReduceOp::Min => f64::INFINITY,
                    ReduceOp::Max => f64::NEG_INFINITY,
                }))
            }
            DataType::Bool => return None,
        };
        Some(Expr::Int(match self {
            ReduceOp::Add => 0,
            ReduceOp::Mul => 1,
            ReduceOp::Min => hi,
            ReduceOp::Max => lo,
        }))
    }

    /// `acc op value`
    pub fn combine(&self, acc: Expr, value: Expr) -> Expr {
        Expr::binary(self.binary(), acc, value)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ReduceOp::Add => "+",
            ReduceOp::Mul => "*",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
        }
    }
}

/// One read or write of a buffer element.
#[derive(Debug, Clone)]
pub struct Access {
    pub buffer: String,
    pub indices: Vec<Expr>,
    pub kind: AccessKind,
    /// Statement (or loop / branch header) performing the access
    pub stmt: NodeId,
    /// Syntactic order inside the scope
    pub position: usize,
    /// Enclosing loops inside the scope, outermost first
    pub loops: Vec<NodeId>,
    /// Set when the access belongs to `b[i] = b[i] op rhs`
    pub reduction: Option<ReduceOp>,
    /// Number of `loops` enclosing the buffer's declaration, when it is
    /// declared inside the scope
    pub decl_depth: Option<usize>,
}

/// Accesses of a scope plus the calls that make it opaque.
#[derive(Debug, Clone, Default)]
pub struct AccessSet {
    pub accesses: Vec<Access>,
    pub calls: Vec<NodeId>,
}

/// Recognize `buf[idx] = buf[idx] op rhs` (or `rhs op buf[idx]`) where `op`
/// is commutative and associative and `rhs` does not touch `buf`.
pub fn match_reduction(var: &str, indices: &[Expr], expr: &Expr) -> Option<(ReduceOp, Expr)> {
    let (op, lhs, rhs) = match expr {
        Expr::Binary { op, lhs, rhs } => (ReduceOp::from_binary(*op)?, lhs, rhs),
        _ => return None,
    };
    let is_self = |e: &Expr| matches!(e, Expr::Load { var: v, indices: idx } if v == var && idx == indices);
    if is_self(lhs) && !rhs.reads_buffer(var) {
        Some((op, (**rhs).clone()))
    } else if is_self(rhs) && !lhs.reads_buffer(var) {
        Some((op, (**lhs).clone()))
    } else {
        None
    }
}

struct Collector<'a> {
    ast: &'a Ast,
    loops: Vec<NodeId>,
    decls: HashMap<String, Vec<usize>>,
    out: AccessSet,
}

impl<'a> Collector<'a> {
    fn push(&mut self, buffer: &str, indices: &[Expr], kind: AccessKind, stmt: NodeId, reduction: Option<ReduceOp>) {
        let position = self.out.accesses.len();
        self.out.accesses.push(Access {
            buffer: buffer.to_string(),
            indices: indices.to_vec(),
            kind,
            stmt,
            position,
            loops: self.loops.clone(),
            reduction,
            decl_depth: self.decls.get(buffer).and_then(|d| d.last().copied()),
        });
    }

    /// Every load inside `expr`, in evaluation order.
    fn reads(&mut self, expr: &Expr, stmt: NodeId, reduction: Option<(&str, ReduceOp)>) {
        let mut loads = Vec::new();
        expr.visit(&mut |e| {
            if let Expr::Load { var, indices } = e {
                loads.push((var.clone(), indices.clone()));
            }
        });
        for (var, indices) in loads {
            let red = reduction.and_then(|(b, op)| (b == var).then_some(op));
            self.push(&var, &indices, AccessKind::Read, stmt, red);
        }
    }

    fn visit(&mut self, id: NodeId) {
        let ast = self.ast;
        match ast.kind(id) {
            NodeKind::VarDef { name, body, .. } => {
                self.decls.entry(name.clone()).or_default().push(self.loops.len());
                self.visit(*body);
                if let Some(stack) = self.decls.get_mut(name) {
                    stack.pop();
                }
            }
            NodeKind::For { begin, end, body, .. } => {
                self.reads(begin, id, None);
                self.reads(end, id, None);
                self.loops.push(id);
                self.visit(*body);
                self.loops.pop();
            }
            NodeKind::If { cond, then_case, else_case } => {
                self.reads(cond, id, None);
                self.visit(*then_case);
                if let Some(e) = else_case {
                    self.visit(*e);
                }
            }
            NodeKind::Store { var, indices, expr } => {
                let reduction = match_reduction(var, indices, expr).map(|(op, _)| op);
                for idx in indices {
                    self.reads(idx, id, None);
                }
                self.reads(expr, id, reduction.map(|op| (var.as_str(), op)));
                self.push(var, indices, AccessKind::Write, id, reduction);
            }
            NodeKind::Call { .. } => self.out.calls.push(id),
            NodeKind::Block(stmts) => {
                for s in stmts {
                    self.visit(*s);
                }
            }
            NodeKind::Any => {}
        }
    }
}

/// Collect the accesses of the subtree rooted at `scope`. Reads of a
/// statement are recorded before its write.
pub fn collect_accesses(ast: &Ast, scope: NodeId) -> AccessSet {
    let mut collector = Collector {
        ast,
        loops: Vec::new(),
        decls: HashMap::new(),
        out: AccessSet::default(),
    };
    collector.visit(scope);
    collector.out
}

/// Buffers written anywhere in the subtree.
pub fn written_buffers(ast: &Ast, scope: NodeId) -> Vec<String> {
    let mut written: Vec<String> = collect_accesses(ast, scope)
        .accesses
        .into_iter()
        .filter(|a| a.kind == AccessKind::Write)
        .map(|a| a.buffer)
        .collect();
    written.sort();
    written.dedup();
    written
}

//! Closure-based tree construction.
//!
//! ```rust,ignore
//! let ast = AstBuilder::build(|b| {
//!     b.var_def("y", vec![int(4)], DataType::Int32, AccessType::Output).body(|b| {
//!         b.for_loop("i", 0, 4).id("L1").body(|b| {
//!             b.store("y", vec![var("i")], var("i") * 2);
//!         });
//!     });
//! })?;
//! ```
//!
//! Scopes holding a single statement get no `Block` wrapper.

use crate::ir::ast::{AccessType, Ast, Buffer, CallArg, ExecMode, ForProperty, MemType, Node, NodeId, NodeKind};
use crate::ir::expr::{DataType, Expr};
use crate::utils::errors::IrError;

/// Builds an [`Ast`] through nested closures.
#[derive(Debug)]
pub struct AstBuilder {
    ast: Ast,
    scopes: Vec<Vec<NodeId>>,
}

impl AstBuilder {
    fn new() -> Self {
        Self { ast: Ast::new(), scopes: vec![Vec::new()] }
    }

    /// Run `f` against a fresh builder and return the finished tree.
    pub fn build(f: impl FnOnce(&mut AstBuilder)) -> Result<Ast, IrError> {
        let mut b = AstBuilder::new();
        f(&mut b);
        let stmts = b.scopes.pop().unwrap_or_default();
        let root = b.wrap(stmts);
        let mut ast = b.ast;
        ast.set_root(root);
        ast.compact();
        ast.reindex()?;
        Ok(ast)
    }

    fn wrap(&mut self, mut stmts: Vec<NodeId>) -> NodeId {
        if stmts.len() == 1 {
            stmts.remove(0)
        } else {
            self.ast.alloc_kind(NodeKind::Block(stmts))
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = self.ast.alloc(node);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(id);
        }
        id
    }

    fn scope(&mut self, f: impl FnOnce(&mut AstBuilder)) -> NodeId {
        self.scopes.push(Vec::new());
        f(self);
        let stmts = self.scopes.pop().unwrap_or_default();
        self.wrap(stmts)
    }

    /// Declare a buffer in host memory; chain `.mem()` to change the space.
    pub fn var_def(
        &mut self,
        name: &str,
        shape: Vec<Expr>,
        dtype: DataType,
        atype: AccessType,
    ) -> VarDefBuilder<'_> {
        VarDefBuilder {
            b: self,
            name: name.to_string(),
            buffer: Buffer::new(shape, dtype, atype, MemType::Cpu),
            label: None,
        }
    }

    pub fn for_loop(&mut self, iter: &str, begin: impl Into<Expr>, end: impl Into<Expr>) -> ForBuilder<'_> {
        ForBuilder {
            b: self,
            iter: iter.to_string(),
            begin: begin.into(),
            end: end.into(),
            label: None,
            property: ForProperty::default(),
        }
    }

    pub fn if_then(&mut self, cond: Expr, then: impl FnOnce(&mut AstBuilder)) -> NodeId {
        let then_case = self.scope(then);
        self.push(Node::new(NodeKind::If { cond, then_case, else_case: None }))
    }

    pub fn if_then_else(
        &mut self,
        cond: Expr,
        then: impl FnOnce(&mut AstBuilder),
        otherwise: impl FnOnce(&mut AstBuilder),
    ) -> NodeId {
        let then_case = self.scope(then);
        let else_case = Some(self.scope(otherwise));
        self.push(Node::new(NodeKind::If { cond, then_case, else_case }))
    }

    pub fn store(&mut self, var: &str, indices: Vec<Expr>, expr: impl Into<Expr>) -> NodeId {
        self.push(Node::new(NodeKind::Store {
            var: var.to_string(),
            indices,
            expr: expr.into(),
        }))
    }

    pub fn call(&mut self, callee: &str, args: Vec<CallArg>) -> NodeId {
        self.push(Node::new(NodeKind::Call { callee: callee.to_string(), args }))
    }

    /// Wildcard, for expected trees in equivalence checks.
    pub fn any(&mut self) -> NodeId {
        self.push(Node::new(NodeKind::Any))
    }

    /// Attach a label to an already built node.
    pub fn set_label(&mut self, id: NodeId, label: &str) -> NodeId {
        self.ast.node_mut(id).label = Some(label.to_string());
        id
    }
}

/// Pending `VarDef`; finished by [`VarDefBuilder::body`].
pub struct VarDefBuilder<'a> {
    b: &'a mut AstBuilder,
    name: String,
    buffer: Buffer,
    label: Option<String>,
}

impl<'a> VarDefBuilder<'a> {
    pub fn mem(mut self, mtype: MemType) -> Self {
        self.buffer.mtype = mtype;
        self
    }

    pub fn id(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn body(self, f: impl FnOnce(&mut AstBuilder)) -> NodeId {
        let body = self.b.scope(f);
        self.b.push(Node {
            label: self.label,
            kind: NodeKind::VarDef { name: self.name, buffer: self.buffer, body },
        })
    }
}

/// Pending `For`; finished by [`ForBuilder::body`].
pub struct ForBuilder<'a> {
    b: &'a mut AstBuilder,
    iter: String,
    begin: Expr,
    end: Expr,
    label: Option<String>,
    property: ForProperty,
}

impl<'a> ForBuilder<'a> {
    pub fn id(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn parallel(mut self, tag: &str) -> Self {
        self.property.mode = ExecMode::Parallel(tag.to_string());
        self
    }

    pub fn no_deps<I, S>(mut self, buffers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property.no_deps.extend(buffers.into_iter().map(Into::into));
        self
    }

    pub fn body(self, f: impl FnOnce(&mut AstBuilder)) -> NodeId {
        let body = self.b.scope(f);
        self.b.push(Node {
            label: self.label,
            kind: NodeKind::For {
                iter: self.iter,
                begin: self.begin,
                end: self.end,
                property: self.property,
                body,
            },
        })
    }
}

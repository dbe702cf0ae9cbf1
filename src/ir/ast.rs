//! Arena-backed program tree.
//!
//! A program is a strict tree of [`Node`]s stored in an [`Ast`] arena and
//! addressed through [`NodeId`] handles. Nodes may carry a string label; the
//! label index is rebuilt by [`Ast::reindex`] whenever a snapshot is
//! committed, so handles stay valid across clones and in-place rewrites.

use crate::ir::expr::{DataType, Expr};
use crate::utils::errors::{IrError, IrErrorKind};
use crate::utils::pretty::{format_list, CodeFormatter};
use serde::{Serialize, Deserialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use std::str::FromStr;

/// Handle of a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Access class of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Input,
    Output,
    InOut,
    Cache,
}

impl AccessType {
    /// Whether statements may write the buffer.
    pub fn is_writable(&self) -> bool {
        !matches!(self, AccessType::Input)
    }

    /// Whether the buffer is visible outside the program.
    pub fn is_io(&self) -> bool {
        !matches!(self, AccessType::Cache)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccessType::Input => "input",
            AccessType::Output => "output",
            AccessType::InOut => "inout",
            AccessType::Cache => "cache",
        }
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(AccessType::Input),
            "output" => Ok(AccessType::Output),
            "inout" => Ok(AccessType::InOut),
            "cache" => Ok(AccessType::Cache),
            _ => Err(format!("unknown access type `{}`", s)),
        }
    }
}

/// Memory space of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemType {
    #[serde(rename = "cpu")]
    Cpu,
    #[serde(rename = "gpu/global")]
    GpuGlobal,
    #[serde(rename = "gpu/shared")]
    GpuShared,
    #[serde(rename = "gpu/local")]
    GpuLocal,
    #[serde(rename = "byvalue")]
    ByValue,
}

impl MemType {
    pub fn name(&self) -> &'static str {
        match self {
            MemType::Cpu => "cpu",
            MemType::GpuGlobal => "gpu/global",
            MemType::GpuShared => "gpu/shared",
            MemType::GpuLocal => "gpu/local",
            MemType::ByValue => "byvalue",
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, MemType::GpuGlobal | MemType::GpuShared | MemType::GpuLocal)
    }
}

impl FromStr for MemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(MemType::Cpu),
            "gpu/global" => Ok(MemType::GpuGlobal),
            "gpu/shared" => Ok(MemType::GpuShared),
            "gpu/local" => Ok(MemType::GpuLocal),
            "byvalue" => Ok(MemType::ByValue),
            _ => Err(format!("unknown memory type `{}`", s)),
        }
    }
}

/// Buffer metadata carried by a `VarDef`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    /// Extent of each dimension
    pub shape: Vec<Expr>,
    /// Element type
    pub dtype: DataType,
    /// Access class
    pub atype: AccessType,
    /// Memory space
    pub mtype: MemType,
}

impl Buffer {
    pub fn new(shape: Vec<Expr>, dtype: DataType, atype: AccessType, mtype: MemType) -> Self {
        Self { shape, dtype, atype, mtype }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Execution mode of a loop.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    #[default]
    Sequential,
    /// Iterations run concurrently, bound to the given implementation tag
    Parallel(String),
}

/// Loop annotations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForProperty {
    #[serde(default)]
    pub mode: ExecMode,
    /// Buffers asserted to carry no dependence across iterations of this loop
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_deps: Vec<String>,
}

impl ForProperty {
    pub fn parallel_tag(&self) -> Option<&str> {
        match &self.mode {
            ExecMode::Parallel(tag) => Some(tag),
            ExecMode::Sequential => None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel_tag().is_some()
    }
}

/// Argument at a call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallArg {
    /// Pass a buffer visible at the call site
    Buffer(String),
    /// Pass a scalar value
    Value(Expr),
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Buffer(name) => write!(f, "{}", name),
            CallArg::Value(e) => write!(f, "{}", e),
        }
    }
}

/// Node variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Buffer declaration, visible in `body`
    VarDef { name: String, buffer: Buffer, body: NodeId },
    /// Loop over `begin..end`
    For {
        iter: String,
        begin: Expr,
        end: Expr,
        #[serde(default)]
        property: ForProperty,
        body: NodeId,
    },
    /// Conditional
    If {
        cond: Expr,
        then_case: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_case: Option<NodeId>,
    },
    /// Element write
    Store { var: String, indices: Vec<Expr>, expr: Expr },
    /// Invocation of a registered function
    Call { callee: String, args: Vec<CallArg> },
    /// Statement sequence
    Block(Vec<NodeId>),
    /// Wildcard that matches any one subtree
    Any,
}

impl NodeKind {
    /// Child handles in execution order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::VarDef { body, .. } | NodeKind::For { body, .. } => vec![*body],
            NodeKind::If { then_case, else_case, .. } => {
                let mut v = vec![*then_case];
                v.extend(else_case.iter().copied());
                v
            }
            NodeKind::Block(stmts) => stmts.clone(),
            NodeKind::Store { .. } | NodeKind::Call { .. } | NodeKind::Any => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            NodeKind::VarDef { body, .. } | NodeKind::For { body, .. } => vec![body],
            NodeKind::If { then_case, else_case, .. } => {
                let mut v = vec![then_case];
                v.extend(else_case.as_mut());
                v
            }
            NodeKind::Block(stmts) => stmts.iter_mut().collect(),
            NodeKind::Store { .. } | NodeKind::Call { .. } | NodeKind::Any => Vec::new(),
        }
    }

    /// Expressions owned directly by this node.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            NodeKind::VarDef { buffer, .. } => buffer.shape.iter_mut().collect(),
            NodeKind::For { begin, end, .. } => vec![begin, end],
            NodeKind::If { cond, .. } => vec![cond],
            NodeKind::Store { indices, expr, .. } => {
                let mut v: Vec<&mut Expr> = indices.iter_mut().collect();
                v.push(expr);
                v
            }
            NodeKind::Call { args, .. } => args
                .iter_mut()
                .filter_map(|a| match a {
                    CallArg::Value(e) => Some(e),
                    CallArg::Buffer(_) => None,
                })
                .collect(),
            NodeKind::Block(_) | NodeKind::Any => Vec::new(),
        }
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            NodeKind::VarDef { buffer, .. } => buffer.shape.iter().collect(),
            NodeKind::For { begin, end, .. } => vec![begin, end],
            NodeKind::If { cond, .. } => vec![cond],
            NodeKind::Store { indices, expr, .. } => indices.iter().chain(Some(expr)).collect(),
            NodeKind::Call { args, .. } => args
                .iter()
                .filter_map(|a| match a {
                    CallArg::Value(e) => Some(e),
                    CallArg::Buffer(_) => None,
                })
                .collect(),
            NodeKind::Block(_) | NodeKind::Any => Vec::new(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::VarDef { .. } => "VarDef",
            NodeKind::For { .. } => "For",
            NodeKind::If { .. } => "If",
            NodeKind::Store { .. } => "Store",
            NodeKind::Call { .. } => "Call",
            NodeKind::Block(_) => "Block",
            NodeKind::Any => "Any",
        }
    }
}

/// A tree node: a variant plus an optional label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { label: None, kind }
    }

    pub fn labeled(label: impl Into<String>, kind: NodeKind) -> Self {
        Self { label: Some(label.into()), kind }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self.kind, NodeKind::For { .. })
    }
}

/// Program tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawAst")]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    #[serde(skip)]
    index: HashMap<String, NodeId>,
    /// Parent links of the reachable tree, dropped on every structural edit
    #[serde(skip)]
    parent_links: OnceLock<HashMap<NodeId, NodeId>>,
}

#[derive(Deserialize)]
struct RawAst {
    nodes: Vec<Node>,
    root: NodeId,
}

impl TryFrom<RawAst> for Ast {
    type Error = IrError;

    fn try_from(raw: RawAst) -> Result<Self, Self::Error> {
        Ast::from_parts(raw.nodes, raw.root)
    }
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    /// An empty program (a root block with no statements).
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Block(Vec::new()))],
            root: NodeId(0),
            index: HashMap::new(),
            parent_links: OnceLock::new(),
        }
    }

    /// Build a tree from raw arena contents, checking that it is a strict
    /// tree with unique labels.
    pub fn from_parts(nodes: Vec<Node>, root: NodeId) -> Result<Self, IrError> {
        if root.index() >= nodes.len() {
            return Err(IrError::new(
                IrErrorKind::DanglingNode,
                format!("root {} outside arena of {} nodes", root, nodes.len()),
            ));
        }
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(IrError::new(
                    IrErrorKind::SharedNode,
                    format!("node {} reachable from more than one parent", id),
                ));
            }
            for child in nodes[id.index()].kind.children() {
                if child.index() >= nodes.len() {
                    return Err(IrError::new(
                        IrErrorKind::DanglingNode,
                        format!("node {} refers to missing child {}", id, child),
                    ));
                }
                stack.push(child);
            }
        }
        let mut ast = Self { nodes, root, index: HashMap::new(), parent_links: OnceLock::new() };
        ast.compact();
        ast.reindex()?;
        Ok(ast)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.parent_links.take();
        self.root = root;
    }

    /// Number of arena slots, reachable or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.node(self.root).kind, NodeKind::Block(v) if v.is_empty())
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn alloc_kind(&mut self, kind: NodeKind) -> NodeId {
        self.alloc(Node::new(kind))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.parent_links.take();
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// Look up a node by label in the committed index.
    pub fn find(&self, label: &str) -> Option<NodeId> {
        self.index.get(label).copied()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).kind.children()
    }

    /// Reachable nodes in pre-order.
    pub fn walk(&self) -> Vec<NodeId> {
        self.walk_from(self.root)
    }

    /// Nodes of the subtree rooted at `id`, in pre-order.
    pub fn walk_from(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            order.push(id);
            let children = self.children(id);
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Parent of every reachable non-root node.
    pub fn parents(&self) -> HashMap<NodeId, NodeId> {
        let mut parents = HashMap::new();
        for id in self.walk() {
            for child in self.children(id) {
                parents.insert(child, id);
            }
        }
        parents
    }

    fn parent_map(&self) -> &HashMap<NodeId, NodeId> {
        self.parent_links.get_or_init(|| self.parents())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent_map().get(&id).copied()
    }

    /// Ancestors of `id`, innermost first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let parents = self.parent_map();
        let mut chain = Vec::new();
        let mut cur = id;
        while let Some(&p) = parents.get(&cur) {
            chain.push(p);
            cur = p;
        }
        chain
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let parents = self.parent_map();
        let mut cur = id;
        while let Some(&p) = parents.get(&cur) {
            if p == ancestor {
                return true;
            }
            cur = p;
        }
        false
    }

    /// Loops in pre-order.
    pub fn loops(&self) -> Vec<NodeId> {
        self.walk().into_iter().filter(|&id| self.node(id).is_loop()).collect()
    }

    /// Make the parent of `old` point to `new` instead. `old` becomes
    /// unreachable. Returns false if `old` is not part of the tree.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        if old == self.root {
            self.parent_links.take();
            self.root = new;
            return true;
        }
        let parent = match self.parent(old) {
            Some(p) => p,
            None => return false,
        };
        self.parent_links.take();
        for slot in self.nodes[parent.index()].kind.children_mut() {
            if *slot == old {
                *slot = new;
            }
        }
        true
    }

    /// Copy the subtree rooted at `id` into `dest`, labels included.
    pub fn deep_copy(&self, id: NodeId, dest: &mut Ast) -> NodeId {
        let mut node = self.node(id).clone();
        for child in node.kind.children_mut() {
            *child = self.deep_copy(*child, dest);
        }
        dest.alloc(node)
    }

    /// Apply `f` to every expression in the subtree rooted at `id`.
    pub fn for_each_expr_mut(&mut self, id: NodeId, f: &mut impl FnMut(&mut Expr)) {
        for n in self.walk_from(id) {
            for e in self.nodes[n.index()].kind.exprs_mut() {
                f(e);
            }
        }
    }

    /// Replace the scalar `name` by `value` in the subtree, respecting loops
    /// that rebind `name`.
    pub fn substitute_var(&mut self, id: NodeId, name: &str, value: &Expr) {
        let map = HashMap::from([(name.to_string(), value.clone())]);
        let rebinds = matches!(&self.node(id).kind, NodeKind::For { iter, .. } if iter == name);
        for e in self.nodes[id.index()].kind.exprs_mut() {
            *e = e.substitute(&map);
        }
        if rebinds {
            return;
        }
        for child in self.children(id) {
            self.substitute_var(child, name, value);
        }
    }

    /// Rename iterators and buffers throughout the subtree.
    pub fn rename(
        &mut self,
        id: NodeId,
        vars: &HashMap<String, String>,
        buffers: &HashMap<String, String>,
    ) {
        for n in self.walk_from(id) {
            let kind = &mut self.nodes[n.index()].kind;
            for e in kind.exprs_mut() {
                *e = e.rename(vars, buffers);
            }
            match kind {
                NodeKind::VarDef { name, .. } | NodeKind::Store { var: name, .. } => {
                    if let Some(to) = buffers.get(name.as_str()) {
                        *name = to.clone();
                    }
                }
                NodeKind::For { iter, property, .. } => {
                    if let Some(to) = vars.get(iter.as_str()) {
                        *iter = to.clone();
                    }
                    for b in property.no_deps.iter_mut() {
                        if let Some(to) = buffers.get(b.as_str()) {
                            *b = to.clone();
                        }
                    }
                }
                NodeKind::Call { args, .. } => {
                    for arg in args.iter_mut() {
                        if let CallArg::Buffer(b) = arg {
                            if let Some(to) = buffers.get(b.as_str()) {
                                *b = to.clone();
                            }
                        }
                    }
                }
                NodeKind::If { .. } | NodeKind::Block(_) | NodeKind::Any => {}
            }
        }
    }

    /// The `VarDef` declaring `name` as seen from `at`.
    pub fn lookup_buffer(&self, name: &str, at: NodeId) -> Option<NodeId> {
        self.ancestors(at).into_iter().find(
            |&a| matches!(&self.node(a).kind, NodeKind::VarDef { name: n, .. } if n == name),
        )
    }

    /// Every name used in the reachable tree: iterators, buffers, scalar
    /// variables and callees.
    pub fn used_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for id in self.walk() {
            let node = self.node(id);
            match &node.kind {
                NodeKind::VarDef { name, .. } | NodeKind::Store { var: name, .. } => {
                    names.insert(name.clone());
                }
                NodeKind::For { iter, .. } => {
                    names.insert(iter.clone());
                }
                NodeKind::Call { callee, args } => {
                    names.insert(callee.clone());
                    for arg in args {
                        if let CallArg::Buffer(b) = arg {
                            names.insert(b.clone());
                        }
                    }
                }
                NodeKind::If { .. } | NodeKind::Block(_) | NodeKind::Any => {}
            }
            for e in node.kind.exprs() {
                names.extend(e.free_vars());
                names.extend(e.buffers_read());
            }
        }
        names
    }

    /// Labels present in the reachable tree, whether or not indexed yet.
    pub fn labels(&self) -> HashSet<String> {
        self.walk()
            .into_iter()
            .filter_map(|id| self.node(id).label.clone())
            .collect()
    }

    /// Drop unreachable arena slots and renumber in pre-order.
    pub fn compact(&mut self) {
        self.parent_links.take();
        let order = self.walk();
        let remap: HashMap<NodeId, NodeId> = order
            .iter()
            .enumerate()
            .map(|(i, &old)| (old, NodeId(i as u32)))
            .collect();
        let mut nodes = Vec::with_capacity(order.len());
        for old in &order {
            let mut node = std::mem::replace(
                &mut self.nodes[old.index()],
                Node::new(NodeKind::Any),
            );
            for child in node.kind.children_mut() {
                *child = remap[&*child];
            }
            nodes.push(node);
        }
        self.nodes = nodes;
        self.root = NodeId(0);
        self.index = self
            .index
            .iter()
            .filter_map(|(label, id)| remap.get(id).map(|&n| (label.clone(), n)))
            .collect();
    }

    /// Rebuild the label index, rejecting duplicate labels.
    pub fn reindex(&mut self) -> Result<(), IrError> {
        let mut index = HashMap::new();
        for id in self.walk() {
            if let Some(label) = &self.node(id).label {
                if index.insert(label.clone(), id).is_some() {
                    return Err(IrError::new(
                        IrErrorKind::DuplicateIdentifier,
                        format!("label `{}` used more than once", label),
                    ));
                }
            }
        }
        self.index = index;
        Ok(())
    }

    fn render(&self, id: NodeId, out: &mut CodeFormatter) {
        let node = self.node(id);
        let prefix = node.label.as_ref().map(|l| format!("{}: ", l)).unwrap_or_default();
        match &node.kind {
            NodeKind::VarDef { name, buffer, body } => {
                let header = format!(
                    "{}vardef {}: {}[{}] {} {}",
                    prefix,
                    name,
                    buffer.dtype,
                    format_list(&buffer.shape, ", "),
                    buffer.atype.name(),
                    buffer.mtype.name()
                );
                out.block(&header, |f| self.render(*body, f));
            }
            NodeKind::For { iter, begin, end, property, body } => {
                let mut header = format!("{}for {} in {}..{}", prefix, iter, begin, end);
                if let Some(tag) = property.parallel_tag() {
                    header.push_str(&format!(" @parallel({})", tag));
                }
                if !property.no_deps.is_empty() {
                    header.push_str(&format!(" @no_deps({})", property.no_deps.join(", ")));
                }
                out.block(&header, |f| self.render(*body, f));
            }
            NodeKind::If { cond, then_case, else_case } => {
                out.writeln(&format!("{}if {} {{", prefix, cond));
                out.indent();
                self.render(*then_case, out);
                out.dedent();
                if let Some(else_case) = else_case {
                    out.writeln("} else {");
                    out.indent();
                    self.render(*else_case, out);
                    out.dedent();
                }
                out.writeln("}");
            }
            NodeKind::Store { var, indices, expr } => {
                out.writeln(&format!(
                    "{}{}[{}] = {}",
                    prefix,
                    var,
                    format_list(indices, ", "),
                    expr
                ));
            }
            NodeKind::Call { callee, args } => {
                out.writeln(&format!("{}{}({})", prefix, callee, format_list(args, ", ")));
            }
            NodeKind::Block(stmts) => {
                if let Some(label) = &node.label {
                    out.writeln(&format!("{}:", label));
                }
                for s in stmts {
                    self.render(*s, out);
                }
            }
            NodeKind::Any => out.writeln(&format!("{}...", prefix)),
        }
    }
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = CodeFormatter::default_indent();
        self.render(self.root, &mut out);
        f.write_str(out.output())
    }
}

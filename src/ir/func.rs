//! Callable sub-programs and the registry the inliner resolves them from.
//!
//! The registry is filled once through a [`RegistryBuilder`] and then frozen
//! behind an `Arc`, so scheduling sessions can share it freely.

use crate::ir::ast::{Ast, Buffer, Node, NodeKind};
use crate::utils::errors::{IrError, IrErrorKind};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(flatten)]
    pub buffer: Buffer,
}

impl Param {
    pub fn new(name: &str, buffer: Buffer) -> Self {
        Self { name: name.to_string(), buffer }
    }
}

/// A named sub-program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Ast,
}

impl Function {
    pub fn new(name: &str, params: Vec<Param>, body: Ast) -> Self {
        Self { name: name.to_string(), params, body }
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The body wrapped in one `VarDef` per parameter, first parameter
    /// outermost.
    pub fn to_ast(&self) -> Result<Ast, IrError> {
        let mut ast = Ast::new();
        let mut inner = self.body.deep_copy(self.body.root(), &mut ast);
        for p in self.params.iter().rev() {
            inner = ast.alloc(Node::new(NodeKind::VarDef {
                name: p.name.clone(),
                buffer: p.buffer.clone(),
                body: inner,
            }));
        }
        ast.set_root(inner);
        ast.compact();
        ast.reindex()?;
        Ok(ast)
    }
}

/// Frozen set of functions, keyed by name.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    /// A registry with no functions.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects functions before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    functions: HashMap<String, Function>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, func: Function) -> Result<&mut Self, IrError> {
        if self.functions.contains_key(&func.name) {
            return Err(IrError::new(
                IrErrorKind::DuplicateFunction,
                format!("function `{}` registered twice", func.name),
            ));
        }
        log::debug!("registered function {} ({} params)", func.name, func.params.len());
        self.functions.insert(func.name.clone(), func);
        Ok(self)
    }

    pub fn build(self) -> Arc<FunctionRegistry> {
        Arc::new(FunctionRegistry { functions: self.functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{AccessType, MemType};
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, var, DataType};

    fn scale() -> Function {
        let body = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).body(|b| {
                b.store("y", vec![var("i")], var("i") * 2);
            });
        })
        .unwrap();
        let y = Buffer::new(vec![int(4)], DataType::Int32, AccessType::Output, MemType::Cpu);
        Function::new("scale", vec![Param::new("y", y)], body)
    }

    #[test]
    fn test_registry() {
        let mut builder = RegistryBuilder::new();
        builder.register(scale()).unwrap();
        assert!(builder.register(scale()).is_err());
        let registry = builder.build();
        assert!(registry.contains("scale"));
        assert_eq!(registry.names(), vec!["scale"]);
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_to_ast_wraps_params() {
        let ast = scale().to_ast().unwrap();
        match ast.kind(ast.root()) {
            NodeKind::VarDef { name, body, .. } => {
                assert_eq!(name, "y");
                assert!(matches!(ast.kind(*body), NodeKind::For { .. }));
            }
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>(_: &T) {}
        let registry = RegistryBuilder::new().build();
        assert_send_sync(&registry);
        assert!(registry.is_empty());
    }
}

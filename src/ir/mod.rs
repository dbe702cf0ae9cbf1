//! Tree model of loop-nest programs.
//!
//! - `expr`: owned expression trees (bounds, subscripts, values)
//! - `ast`: the node arena with stable handles and labels
//! - `builder`: closure-based construction
//! - `func`: callable sub-programs and their registry
//! - `matcher`: structural equivalence up to renaming

pub mod expr;
pub mod ast;
pub mod builder;
pub mod func;
pub mod matcher;

pub use expr::{DataType, Expr, BinaryOp, UnaryOp};
pub use ast::{AccessType, Ast, Buffer, CallArg, ExecMode, ForProperty, MemType, Node, NodeId, NodeKind};
pub use builder::AstBuilder;
pub use func::{Function, FunctionRegistry, Param, RegistryBuilder};
pub use matcher::match_ast;

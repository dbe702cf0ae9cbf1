//! Analysis passes over loop-nest trees.
//!
//! - `linear`: affine forms, GCD and interval tests
//! - `access`: buffer reads and writes of a subtree, reduction recognition
//! - `dependence`: direction-vector dependence analysis and legality queries

pub mod linear;
pub mod access;
pub mod dependence;

pub use access::{collect_accesses, match_reduction, written_buffers, Access, AccessKind, AccessSet, ReduceOp};
pub use dependence::{
    const_extent, Dependence, DependenceAnalysis, DependenceKind, Direction, ParallelVerdict,
};
pub use linear::{Interval, LinearExpr};

use crate::ir::ast::{Ast, NodeId};

/// Analyze the dependences carried by one loop.
pub fn analyze_dependencies(ast: &Ast, lp: NodeId) -> Vec<Dependence> {
    let analyzer = DependenceAnalysis::new();
    analyzer.analyze(ast, lp)
}

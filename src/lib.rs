//! # loopsched - Transactional Loop-Nest Scheduling
//!
//! A library for rewriting loop-nest programs under dependence checks:
//! - Arena-based program trees with labels and structural matching
//! - Direction-vector dependence analysis with reduction recognition
//! - Transactional schedules (reorder, split, parallelize, fission,
//!   buffer dimension reorder, inlining)
//! - Lowering: call expansion, parallel reductions, simplification
//!
//! ## Architecture
//!
//! ```text
//! Ast (+ FunctionRegistry) → Schedule (transforms, checked by analysis) → lower → Ast
//! ```
//!
//! ## Example
//!
//! ```rust
//! use loopsched::prelude::*;
//! use loopsched::ir::expr::{load, var};
//!
//! let ast = AstBuilder::build(|b| {
//!     b.for_loop("i", 0, 8).id("L1").body(|b| {
//!         b.for_loop("j", 0, 8).id("L2").body(|b| {
//!             b.store("y", vec![var("i"), var("j")], load("x", vec![var("j"), var("i")]));
//!         });
//!     });
//! })?;
//!
//! let mut schedule = Schedule::new(ast);
//! schedule.reorder(&["L2", "L1"])?;
//! schedule.split_factor("L1", 4)?;
//! schedule.parallelize("L2", "openmp")?;
//!
//! let lowered = lower(schedule.ast(), &Target::cpu(), &FunctionRegistry::empty())?;
//! assert!(lowered.to_string().starts_with("L2: for j in 0..8 @parallel(openmp) {"));
//! # Ok::<(), loopsched::utils::errors::LoopSchedError>(())
//! ```

#![warn(clippy::all)]

pub mod ir;
pub mod analysis;
pub mod transform;
pub mod lower;
pub mod config;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ir::ast::*;
    pub use crate::ir::builder::AstBuilder;
    pub use crate::ir::expr::{DataType, Expr};
    pub use crate::ir::func::{Function, FunctionRegistry, Param, RegistryBuilder};
    pub use crate::ir::match_ast;
    pub use crate::analysis::{Dependence, DependenceAnalysis, DependenceKind, Direction, ParallelVerdict};
    pub use crate::transform::{Schedule, ScheduleCommand, Transform};
    pub use crate::lower::{lower, lower_function, lower_with, Device, Target};
    pub use crate::config::{LowerConfig, ScheduleConfig};
    pub use crate::session::Session;
    pub use crate::utils::errors::*;
}

use crate::config::ScheduleConfig;
use crate::ir::ast::Ast;
use crate::ir::func::FunctionRegistry;
use crate::transform::{Schedule, ScheduleCommand};
use crate::utils::errors::SchedResult;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Replay `commands` on a fresh schedule over `ast`, stopping at the first
/// rejected command.
pub fn apply_commands(
    ast: Ast,
    commands: &[ScheduleCommand],
    registry: &FunctionRegistry,
    config: ScheduleConfig,
) -> SchedResult<Schedule> {
    let mut schedule = Schedule::with_config(ast, config);
    for command in commands {
        command.run(&mut schedule, registry)?;
    }
    Ok(schedule)
}

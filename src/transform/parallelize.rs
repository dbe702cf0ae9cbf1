//! Parallel loop annotation.

use crate::analysis::{DependenceAnalysis, ParallelVerdict};
use crate::ir::ast::{Ast, ExecMode, NodeKind};
use crate::transform::{resolve_loop, ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use log::debug;

const NAME: &str = "parallelize";

/// Mark a loop for concurrent execution, bound to an implementation tag
/// such as `openmp` or `threadIdx.x`.
#[derive(Debug, Clone)]
pub struct Parallelize {
    pub id: String,
    pub tag: String,
}

impl Parallelize {
    pub fn new(id: &str, tag: &str) -> Self {
        Self { id: id.to_string(), tag: tag.to_string() }
    }
}

impl Transform for Parallelize {
    type Output = ();

    fn apply(&self, ast: &mut Ast, analysis: &DependenceAnalysis) -> ScheduleResult<()> {
        if self.tag.trim().is_empty() {
            return Err(InvalidSchedule::malformed(NAME, "empty parallel tag"));
        }
        let lp = resolve_loop(ast, NAME, &self.id)?;
        match analysis.check_parallelize(ast, lp) {
            ParallelVerdict::Unsafe(dep) => {
                return Err(InvalidSchedule::dependency(
                    NAME,
                    format!("unsolvable dependency: {}", dep.description()),
                ));
            }
            ParallelVerdict::Safe { reductions } => {
                for (buffer, op) in &reductions {
                    debug!("{} reduces {} with {}", self.id, buffer, op.symbol());
                }
            }
        }
        if let NodeKind::For { property, .. } = &mut ast.node_mut(lp).kind {
            property.mode = ExecMode::Parallel(self.tag.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::Parallelize { id: self.id.clone(), tag: self.tag.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{load, var};
    use crate::utils::errors::InvalidScheduleKind;

    #[test]
    fn test_parallelize_sets_mode() {
        let mut ast = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L1").body(|b| {
                b.store("y", vec![var("i")], load("x", vec![var("i")]));
            });
        })
        .unwrap();
        Parallelize::new("L1", "openmp").apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        assert!(ast.to_string().starts_with("L1: for i in 0..4 @parallel(openmp) {"));
    }

    #[test]
    fn test_parallelize_rejects_carried_dependence() {
        let mut ast = AstBuilder::build(|b| {
            b.for_loop("i", 1, 4).id("L1").body(|b| {
                b.store("y", vec![var("i")], load("y", vec![var("i") - 1]));
            });
        })
        .unwrap();
        let err = Parallelize::new("L1", "openmp")
            .apply(&mut ast, &DependenceAnalysis::new())
            .unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::UnsolvableDependency);
        assert!(err.to_string().contains("unsolvable dependency"));
        let err = Parallelize::new("L1", " ").apply(&mut ast, &DependenceAnalysis::new()).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::MalformedArguments);
    }
}

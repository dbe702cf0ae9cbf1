//! Transactional schedule sessions.
//!
//! A [`Schedule`] owns one committed tree. Each operation clones it, applies
//! one [`Transform`] to the clone, re-validates the result and commits it
//! only when everything succeeded. A rejected operation leaves the committed
//! tree exactly as it was.

use crate::analysis::{DependenceAnalysis, ParallelVerdict};
use crate::config::ScheduleConfig;
use crate::ir::ast::{Ast, NodeKind};
use crate::ir::expr::Expr;
use crate::ir::func::FunctionRegistry;
use crate::transform::{
    Fission, InlineAll, Parallelize, Reorder, ScheduleCommand, Split, Transform, VarReorder,
};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use log::debug;

/// A scheduling session over one program tree.
#[derive(Debug, Clone)]
pub struct Schedule {
    ast: Ast,
    history: Vec<ScheduleCommand>,
    config: ScheduleConfig,
    analysis: DependenceAnalysis,
}

impl Schedule {
    /// Start a session with the default configuration.
    pub fn new(ast: Ast) -> Self {
        Self::with_config(ast, ScheduleConfig::default())
    }

    pub fn with_config(ast: Ast, config: ScheduleConfig) -> Self {
        let analysis = DependenceAnalysis::with_max_levels(config.max_levels);
        Self { ast, history: Vec::new(), config, analysis }
    }

    /// Run one transformation transactionally.
    pub fn apply<T: Transform>(&mut self, transform: &T) -> ScheduleResult<T::Output> {
        let before = self.config.verify_rollback.then(|| self.ast.clone());
        let mut candidate = self.ast.clone();
        let result = transform.apply(&mut candidate, &self.analysis).and_then(|out| {
            candidate.compact();
            candidate
                .reindex()
                .map_err(|e| InvalidSchedule::malformed(transform.name(), e.message))?;
            if self.config.recheck_parallel {
                self.recheck_parallel(&candidate, transform.name())?;
            }
            Ok(out)
        });
        match result {
            Ok(out) => {
                let command = transform.describe();
                debug!("committed {}", command);
                self.ast = candidate;
                self.history.push(command);
                Ok(out)
            }
            Err(err) => {
                debug!("rejected {}: {}", transform.describe(), err);
                if let Some(before) = before {
                    debug_assert!(before.matches(&self.ast), "rejected {} changed the tree", transform.name());
                }
                Err(err)
            }
        }
    }

    /// Every loop already marked parallel must still be safe.
    fn recheck_parallel(&self, ast: &Ast, transform: &str) -> ScheduleResult<()> {
        for lp in ast.loops() {
            let node = ast.node(lp);
            let parallel = matches!(&node.kind, NodeKind::For { property, .. } if property.is_parallel());
            if !parallel {
                continue;
            }
            if let ParallelVerdict::Unsafe(dep) = self.analysis.check_parallelize(ast, lp) {
                let name = node.label.clone().unwrap_or_else(|| lp.to_string());
                return Err(InvalidSchedule::dependency(
                    transform,
                    format!("unsolvable dependency: parallel loop {} would carry {}", name, dep.description()),
                ));
            }
        }
        Ok(())
    }

    /// Reorder a nested chain of loops; `order` lists labels outermost first.
    pub fn reorder<S: AsRef<str>>(&mut self, order: &[S]) -> ScheduleResult<()> {
        self.apply(&Reorder::new(order))
    }

    /// Split a loop by inner trip count (`factor`) or outer trip count
    /// (`nparts`). Exactly one must be given. Returns the labels of the new
    /// outer and inner loops.
    pub fn split(
        &mut self,
        id: &str,
        factor: Option<Expr>,
        nparts: Option<Expr>,
    ) -> ScheduleResult<(String, String)> {
        self.apply(&Split { id: id.to_string(), factor, nparts })
    }

    pub fn split_factor(&mut self, id: &str, factor: impl Into<Expr>) -> ScheduleResult<(String, String)> {
        self.apply(&Split::factor(id, factor))
    }

    pub fn split_nparts(&mut self, id: &str, nparts: impl Into<Expr>) -> ScheduleResult<(String, String)> {
        self.apply(&Split::nparts(id, nparts))
    }

    pub fn parallelize(&mut self, id: &str, tag: &str) -> ScheduleResult<()> {
        self.apply(&Parallelize::new(id, tag))
    }

    /// Distribute a loop after statement `after`. Returns the labels of the
    /// two new loops.
    pub fn fission(&mut self, id: &str, after: &str) -> ScheduleResult<(String, String)> {
        self.apply(&Fission::new(id, after))
    }

    pub fn var_reorder(&mut self, id: &str, order: &[usize]) -> ScheduleResult<()> {
        self.apply(&VarReorder::new(id, order.to_vec()))
    }

    /// Expand every call now, so the expansions can be scheduled.
    pub fn inline(&mut self, registry: &FunctionRegistry) -> ScheduleResult<usize> {
        self.apply(&InlineAll { registry })
    }

    /// The committed tree.
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn into_ast(self) -> Ast {
        self.ast
    }

    /// Committed operations, oldest first.
    pub fn history(&self) -> &[ScheduleCommand] {
        &self.history
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// An independent session starting from the current state.
    pub fn fork(&self) -> Schedule {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{load, var};
    use crate::utils::errors::InvalidScheduleKind;

    fn nest() -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L1").body(|b| {
                b.for_loop("j", 0, 8).id("L2").body(|b| {
                    b.store("y", vec![var("i"), var("j")], load("x", vec![var("j"), var("i")]));
                });
            });
        })
        .unwrap()
    }

    #[test]
    fn test_history_and_fork() {
        let mut s = Schedule::new(nest());
        s.reorder(&["L2", "L1"]).unwrap();
        let mut branch = s.fork();
        branch.parallelize("L1", "openmp").unwrap();
        assert_eq!(s.history().len(), 1);
        assert_eq!(branch.history().len(), 2);
        assert_eq!(branch.history()[1].to_string(), "parallelize L1 openmp");
        assert!(!s.ast().matches(branch.ast()));
    }

    #[test]
    fn test_rejection_keeps_tree() {
        let mut s = Schedule::new(nest());
        let before = s.ast().clone();
        let err = s.split("L1", None, None).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::MalformedArguments);
        assert!(s.ast().matches(&before));
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_recheck_after_commit() {
        // parallel outer loop over i, then a split that is fine on its own
        let ast = AstBuilder::build(|b| {
            b.for_loop("i", 0, 8).id("L1").body(|b| {
                b.store("y", vec![var("i")], load("x", vec![var("i")]));
            });
        })
        .unwrap();
        let mut s = Schedule::new(ast);
        s.parallelize("L1", "openmp").unwrap();
        let (outer, inner) = s.split_factor("L1", 4).unwrap();
        assert_eq!((outer.as_str(), inner.as_str()), ("L1.0", "L1.1"));
        assert!(s.ast().to_string().starts_with("L1.0: for i.0 in 0..2 @parallel(openmp) {"));
    }
}

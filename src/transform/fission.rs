//! Loop fission (distribution).
//!
//! Example (`fission(L1, S0)`):
//! ```text
//! L1: for i in 0..n:          L1.a: for i in 0..n:
//!   S0: a[i] = x[i]      =>       a[i] = x[i]
//!   b[i] = a[i] * 2           L1.b: for i in 0..n:
//!                                 b[i] = a[i] * 2
//! ```

use crate::analysis::{written_buffers, DependenceAnalysis};
use crate::ir::ast::{Ast, Node, NodeKind};
use crate::transform::{loop_body, resolve_loop, wrap_block, ScheduleCommand, Transform};
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use crate::utils::names::NameGen;
use log::debug;

const NAME: &str = "fission";

/// Split a loop into two consecutive loops after one of its statements.
#[derive(Debug, Clone)]
pub struct Fission {
    pub id: String,
    /// Last statement of the first loop; must be a direct child of the body
    pub after: String,
}

impl Fission {
    pub fn new(id: &str, after: &str) -> Self {
        Self { id: id.to_string(), after: after.to_string() }
    }
}

impl Transform for Fission {
    /// Labels of the two new loops
    type Output = (String, String);

    fn apply(&self, ast: &mut Ast, analysis: &DependenceAnalysis) -> ScheduleResult<(String, String)> {
        let lp = resolve_loop(ast, NAME, &self.id)?;
        let at = ast
            .find(&self.after)
            .ok_or_else(|| InvalidSchedule::not_found(NAME, &self.after))?;
        let body = loop_body(ast, lp).ok_or_else(|| InvalidSchedule::not_a_loop(NAME, &self.id))?;
        let stmts = match ast.kind(body) {
            NodeKind::Block(stmts) => stmts.clone(),
            _ => {
                return Err(InvalidSchedule::malformed(
                    NAME,
                    format!("body of {} is a single statement", self.id),
                ))
            }
        };
        let pos = stmts.iter().position(|&s| s == at).ok_or_else(|| {
            InvalidSchedule::malformed(
                NAME,
                format!("{} is not a statement directly inside {}", self.after, self.id),
            )
        })?;
        if pos + 1 == stmts.len() {
            return Err(InvalidSchedule::malformed(NAME, format!("nothing follows {}", self.after)));
        }
        let (part0, part1) = stmts.split_at(pos + 1);

        let (iter, begin, end, property) = match ast.kind(lp) {
            NodeKind::For { iter, begin, end, property, .. } => {
                (iter.clone(), begin.clone(), end.clone(), property.clone())
            }
            _ => return Err(InvalidSchedule::not_a_loop(NAME, &self.id)),
        };
        let writes = written_buffers(ast, body);
        if let Some(b) = writes.iter().find(|b| begin.reads_buffer(b) || end.reads_buffer(b)) {
            return Err(InvalidSchedule::dependency(
                NAME,
                format!("loop bounds read {}, which the body writes", b),
            ));
        }
        if let Err(dep) = analysis.check_fission(ast, lp, part0, part1) {
            return Err(InvalidSchedule::dependency(
                NAME,
                format!("unsolvable dependency: {}", dep.description()),
            ));
        }

        let mut labels = NameGen::new(ast.labels());
        let label_a = labels.fresh(&format!("{}.a", self.id));
        let label_b = labels.fresh(&format!("{}.b", self.id));
        let body_a = wrap_block(ast, part0.to_vec());
        let body_b = wrap_block(ast, part1.to_vec());
        let first = ast.alloc(Node::labeled(
            label_a.clone(),
            NodeKind::For {
                iter: iter.clone(),
                begin: begin.clone(),
                end: end.clone(),
                property: property.clone(),
                body: body_a,
            },
        ));
        let second = ast.alloc(Node::labeled(
            label_b.clone(),
            NodeKind::For { iter, begin, end, property, body: body_b },
        ));
        *ast.node_mut(lp) = Node::new(NodeKind::Block(vec![first, second]));
        debug!("fission of {} after {}", self.id, self.after);
        Ok((label_a, label_b))
    }

    fn name(&self) -> &str {
        NAME
    }

    fn describe(&self) -> ScheduleCommand {
        ScheduleCommand::Fission { id: self.id.clone(), after: self.after.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{load, var};
    use crate::utils::errors::InvalidScheduleKind;

    fn two_stmts(read_offset: i64) -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 1, 8).id("L1").body(|b| {
                let s = b.store("a", vec![var("i")], load("x", vec![var("i")]));
                b.set_label(s, "S0");
                b.store("b", vec![var("i")], load("a", vec![var("i") + read_offset]));
            });
        })
        .unwrap()
    }

    #[test]
    fn test_fission_forward_flow() {
        let mut ast = two_stmts(-1);
        let labels = Fission::new("L1", "S0").apply(&mut ast, &DependenceAnalysis::new()).unwrap();
        assert_eq!(labels, ("L1.a".to_string(), "L1.b".to_string()));
        ast.compact();
        ast.reindex().unwrap();
        assert!(ast.find("L1").is_none());
        assert!(ast.find("L1.a").is_some() && ast.find("L1.b").is_some());
    }

    #[test]
    fn test_fission_backward_rejected() {
        // b reads a[i + 1], written by a later iteration of the first part;
        // that is an anti dependence from the second part to the first
        let mut ast = two_stmts(1);
        let err = Fission::new("L1", "S0").apply(&mut ast, &DependenceAnalysis::new()).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::UnsolvableDependency);
    }

    #[test]
    fn test_fission_bad_split_point() {
        let mut ast = two_stmts(0);
        let last = ast.children(ast.children(ast.root())[0])[1];
        let mut labeled = ast.clone();
        labeled.node_mut(last).label = Some("S1".to_string());
        labeled.reindex().unwrap();
        let err = Fission::new("L1", "S1").apply(&mut labeled, &DependenceAnalysis::new()).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::MalformedArguments);
        let err = Fission::new("L1", "S9").apply(&mut ast, &DependenceAnalysis::new()).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::NotFound);
    }
}

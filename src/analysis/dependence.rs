//! Data dependence analysis over loop nests.
//!
//! For a chain of nested loops (the *levels*) every pair of accesses to the
//! same buffer, at least one of them a write, is tested for a conflict under
//! hierarchically refined direction vectors:
//! - each loop variable is rewritten as `begin + offset`, with the offset
//!   bounded by the loop extent;
//! - on a level constrained to `<` or `>` the second instance is written as
//!   the first one plus or minus a distance `δ ≥ 1`;
//! - the subscript difference in every dimension is put through the GCD
//!   test and a Banerjee-style interval test.
//!
//! A vector is dropped as soon as one dimension is proven to differ.
//! Non-affine subscripts or bounds can never be disproven, so the analysis
//! stays conservative: it never reports independence it cannot show.

use crate::analysis::access::{collect_accesses, Access, AccessKind, ReduceOp};
use crate::analysis::linear::{banerjee_test, gcd_test, linearize, Interval, LinearExpr};
use crate::ir::ast::{Ast, NodeId, NodeKind};
use crate::ir::expr::Expr;
use log::trace;
use serde::{Serialize, Deserialize};
use std::collections::HashSet;

/// A data dependence between two statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependence {
    /// Statement executed first
    pub source: NodeId,
    /// Statement executed later
    pub target: NodeId,
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Direction per analysed level, outermost first
    pub direction: Vec<Direction>,
    /// Buffer involved in this dependence
    pub array: String,
    /// Set when both ends belong to a reduction with the same operator
    pub reduction: Option<ReduceOp>,
    /// Outermost level carrying the dependence
    pub level: Option<usize>,
    /// Whether the dependence stays within one iteration of every level
    pub is_loop_independent: bool,
}

impl Dependence {
    /// Whether the dependence crosses iterations of level `level`.
    pub fn is_carried_at(&self, level: usize) -> bool {
        self.direction.get(level).map_or(false, |d| *d != Direction::Eq)
    }

    pub fn is_loop_carried(&self) -> bool {
        !self.is_loop_independent
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        let dir_str: String = self.direction.iter().map(|d| d.to_char()).collect();
        let reduction = self
            .reduction
            .map(|op| format!(" (reduction {})", op.symbol()))
            .unwrap_or_default();
        format!(
            "{} {} -> {} on {} dir=<{}>{}",
            self.kind.short_name(),
            self.source,
            self.target,
            self.array,
            dir_str,
            reduction
        )
    }
}

/// Kind of data dependence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependenceKind {
    /// Read-after-write (true/flow dependence)
    Flow,
    /// Write-after-read (anti dependence)
    Anti,
    /// Write-after-write (output dependence)
    Output,
}

impl DependenceKind {
    fn between(first: AccessKind, second: AccessKind) -> Option<Self> {
        match (first, second) {
            (AccessKind::Write, AccessKind::Read) => Some(DependenceKind::Flow),
            (AccessKind::Read, AccessKind::Write) => Some(DependenceKind::Anti),
            (AccessKind::Write, AccessKind::Write) => Some(DependenceKind::Output),
            (AccessKind::Read, AccessKind::Read) => None,
        }
    }

    /// Get short name for the dependence kind.
    pub fn short_name(&self) -> &'static str {
        match self {
            DependenceKind::Flow => "RAW",
            DependenceKind::Anti => "WAR",
            DependenceKind::Output => "WAW",
        }
    }
}

/// Direction of a dependence in one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// < (forward dependence, positive distance)
    Lt,
    /// = (same iteration, zero distance)
    Eq,
    /// > (backward dependence, negative distance)
    Gt,
    /// * (unknown/any direction)
    Star,
}

impl Direction {
    /// Get the character representation.
    pub fn to_char(&self) -> char {
        match self {
            Direction::Lt => '<',
            Direction::Eq => '=',
            Direction::Gt => '>',
            Direction::Star => '*',
        }
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Lt => Direction::Gt,
            Direction::Gt => Direction::Lt,
            other => *other,
        }
    }
}

/// Whether the first non-`=` entry is `<`. Unknown entries fail the check.
pub fn is_lexicographically_non_negative(dir: &[Direction]) -> bool {
    for d in dir {
        match d {
            Direction::Lt => return true,
            Direction::Eq => continue,
            Direction::Gt | Direction::Star => return false,
        }
    }
    true
}

/// Outcome of a parallelization query.
#[derive(Debug, Clone, PartialEq)]
pub enum ParallelVerdict {
    /// No carried dependence except reductions, listed per buffer
    Safe { reductions: Vec<(String, ReduceOp)> },
    /// The first dependence that forbids parallel execution
    Unsafe(Dependence),
}

impl ParallelVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, ParallelVerdict::Safe { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Side {
    A,
    B,
}

/// Unknowns of a subscript difference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    /// Iteration offset of a loop, `0..extent`
    Offset(Side, NodeId),
    /// Distance between the two instances on a level, `≥ 1`
    Delta(usize),
    /// Loop-invariant scalar, equal on both sides
    Symbol(String),
    /// Loop value with a non-affine lower bound
    Opaque(Side, NodeId),
}

struct Level {
    id: NodeId,
    iter: String,
    extent: Option<i64>,
    no_deps: Vec<String>,
}

struct Pair<'a> {
    a: &'a Access,
    b: &'a Access,
    dirs: Vec<Direction>,
    common: usize,
}

impl<'a> Pair<'a> {
    fn access(&self, side: Side) -> &'a Access {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

fn loop_header(ast: &Ast, id: NodeId) -> Option<(&str, &Expr, &Expr)> {
    match ast.kind(id) {
        NodeKind::For { iter, begin, end, .. } => Some((iter.as_str(), begin, end)),
        _ => None,
    }
}

/// Trip count of a loop when it is a constant, treating every scalar as an
/// opaque symbol (so `i..i + 2` has extent 2).
pub fn const_extent(ast: &Ast, id: NodeId) -> Option<i64> {
    let (_, begin, end) = loop_header(ast, id)?;
    let mut symbol = |name: &str| Some(LinearExpr::atom(name.to_string()));
    let b = linearize(begin, &mut symbol)?;
    let e = linearize(end, &mut symbol)?;
    e.checked_sub(&b)?.as_constant()
}

struct Nest<'a> {
    ast: &'a Ast,
    levels: Vec<Level>,
    max_levels: usize,
}

impl<'a> Nest<'a> {
    fn new(ast: &'a Ast, levels: &[NodeId], max_levels: usize) -> Self {
        let levels = levels
            .iter()
            .map(|&id| {
                let (iter, no_deps) = match ast.kind(id) {
                    NodeKind::For { iter, property, .. } => (iter.clone(), property.no_deps.clone()),
                    _ => (String::new(), Vec::new()),
                };
                Level { id, iter, extent: const_extent(ast, id), no_deps }
            })
            .collect();
        Self { ast, levels, max_levels }
    }

    fn level_of(&self, id: NodeId) -> Option<usize> {
        self.levels.iter().position(|l| l.id == id)
    }

    fn iter_name(&self, id: NodeId) -> Option<&'a str> {
        loop_header(self.ast, id).map(|(iter, _, _)| iter)
    }

    /// Value of the loop variable at `pos` in the access' loop list.
    fn iter_value(&self, pair: &Pair, side: Side, pos: usize) -> Option<LinearExpr<Atom>> {
        let id = pair.access(side).loops[pos];
        if side == Side::B {
            if let Some(k) = self.level_of(id).filter(|&k| k < pair.common) {
                if pair.dirs[k] != Direction::Star {
                    let pos_a = pair.a.loops.iter().position(|&l| l == id)?;
                    let base = self.iter_value(pair, Side::A, pos_a)?;
                    let delta = LinearExpr::atom(Atom::Delta(k));
                    return match pair.dirs[k] {
                        Direction::Lt => base.checked_add(&delta),
                        Direction::Gt => base.checked_sub(&delta),
                        _ => Some(base),
                    };
                }
            }
        }
        let (_, begin, _) = loop_header(self.ast, id)?;
        match self.linear(pair, side, pos, begin) {
            Some(b) => b.checked_add(&LinearExpr::atom(Atom::Offset(side, id))),
            None => Some(LinearExpr::atom(Atom::Opaque(side, id))),
        }
    }

    /// Affine form of `expr` as seen by one side, with only the first `upto`
    /// enclosing loops in scope.
    fn linear(&self, pair: &Pair, side: Side, upto: usize, expr: &Expr) -> Option<LinearExpr<Atom>> {
        let loops = &pair.access(side).loops[..upto];
        linearize(expr, &mut |name| {
            match loops.iter().rposition(|&l| self.iter_name(l) == Some(name)) {
                Some(p) => self.iter_value(pair, side, p),
                None => Some(LinearExpr::atom(Atom::Symbol(name.to_string()))),
            }
        })
    }

    fn atom_range(&self, atom: &Atom) -> Interval {
        match atom {
            Atom::Offset(_, id) => match const_extent(self.ast, *id) {
                Some(n) => Interval::new(0, n.saturating_sub(1).max(0)),
                None => Interval::at_least(0),
            },
            Atom::Delta(k) => match self.levels[*k].extent {
                Some(n) => Interval::new(1, n.saturating_sub(1)),
                None => Interval::at_least(1),
            },
            Atom::Symbol(_) | Atom::Opaque(..) => Interval::unbounded(),
        }
    }

    /// False when the current (partial) vector is proven infeasible.
    fn may_depend(&self, pair: &Pair) -> bool {
        for k in 0..pair.common {
            if matches!(pair.dirs[k], Direction::Lt | Direction::Gt)
                && self.atom_range(&Atom::Delta(k)).is_empty()
            {
                return false;
            }
        }
        if pair.a.indices.len() != pair.b.indices.len() {
            return true;
        }
        for (sa, sb) in pair.a.indices.iter().zip(&pair.b.indices) {
            let la = self.linear(pair, Side::A, pair.a.loops.len(), sa);
            let lb = self.linear(pair, Side::B, pair.b.loops.len(), sb);
            let diff = match (la, lb) {
                (Some(la), Some(lb)) => match la.checked_sub(&lb) {
                    Some(d) => d,
                    None => continue,
                },
                _ => continue,
            };
            let rhs = match diff.constant.checked_neg() {
                Some(r) => r,
                None => continue,
            };
            let coeffs: Vec<i64> = diff.terms.values().copied().collect();
            let bounds: Vec<Interval> = diff.terms.keys().map(|k| self.atom_range(k)).collect();
            if !gcd_test(&coeffs, rhs) || !banerjee_test(&coeffs, diff.constant, &bounds) {
                return false;
            }
        }
        true
    }

    fn refine(&self, pair: &mut Pair, k: usize, forced: &[bool], out: &mut Vec<Vec<Direction>>) {
        if !self.may_depend(pair) {
            return;
        }
        if k >= pair.common.min(self.max_levels) {
            out.push(pair.dirs.clone());
            return;
        }
        let choices: &[Direction] = if forced[k] {
            &[Direction::Eq]
        } else {
            &[Direction::Lt, Direction::Eq, Direction::Gt]
        };
        for &d in choices {
            pair.dirs[k] = d;
            self.refine(pair, k + 1, forced, out);
        }
        pair.dirs[k] = Direction::Star;
    }

    fn common_levels(&self, a: &Access, b: &Access) -> usize {
        self.levels
            .iter()
            .take_while(|l| a.loops.contains(&l.id) && b.loops.contains(&l.id))
            .count()
    }

    /// Levels on which the two accesses cannot touch the same instance of
    /// the buffer: it is declared inside the level, or the level lists it as
    /// dependence-free.
    fn forced_eq(&self, a: &Access, b: &Access, common: usize) -> Vec<bool> {
        let inside_decl = |acc: &Access, id: NodeId| {
            acc.decl_depth.map_or(false, |d| acc.loops[..d.min(acc.loops.len())].contains(&id))
        };
        (0..common)
            .map(|k| {
                let level = &self.levels[k];
                level.no_deps.iter().any(|n| *n == a.buffer)
                    || (inside_decl(a, level.id) && inside_decl(b, level.id))
            })
            .collect()
    }

    fn is_reduction_pair(&self, a: &Access, b: &Access) -> Option<ReduceOp> {
        let op = a.reduction?;
        if b.reduction != Some(op) {
            return None;
        }
        let mentions_level = |acc: &Access| {
            acc.indices
                .iter()
                .any(|e| self.levels.iter().any(|l| e.mentions_var(&l.iter)))
        };
        if mentions_level(a) || mentions_level(b) {
            None
        } else {
            Some(op)
        }
    }

    fn edges(&self, x: &Access, y: &Access, out: &mut Vec<Dependence>) {
        let n = self.levels.len();
        let common = self.common_levels(x, y);
        let mut dirs = vec![Direction::Star; common];
        dirs.resize(n, Direction::Eq);
        let mut pair = Pair { a: x, b: y, dirs, common };
        let forced = self.forced_eq(x, y, common);
        let mut vectors = Vec::new();
        self.refine(&mut pair, 0, &forced, &mut vectors);

        let same = x.position == y.position;
        for vec in vectors {
            let first = vec.iter().copied().find(|d| *d != Direction::Eq);
            let (src, tgt, direction) = match first {
                Some(Direction::Gt) if same => continue,
                Some(Direction::Gt) => (y, x, vec.iter().map(|d| d.reverse()).collect()),
                None if same => continue,
                _ => (x, y, vec),
            };
            let kind = match DependenceKind::between(src.kind, tgt.kind) {
                Some(k) => k,
                None => continue,
            };
            let level = direction.iter().position(|d| *d != Direction::Eq);
            let dep = Dependence {
                source: src.stmt,
                target: tgt.stmt,
                kind,
                direction,
                array: x.buffer.clone(),
                reduction: self.is_reduction_pair(x, y),
                level,
                is_loop_independent: level.is_none(),
            };
            trace!("dependence {}", dep.description());
            out.push(dep);
        }
    }
}

/// Dependence analyzer.
#[derive(Debug, Clone)]
pub struct DependenceAnalysis {
    /// Deepest level refined into `<`, `=`, `>`; deeper levels stay `*`
    pub max_levels: usize,
}

impl Default for DependenceAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl DependenceAnalysis {
    /// Create a new dependence analyzer.
    pub fn new() -> Self {
        Self { max_levels: 8 }
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self { max_levels }
    }

    /// Dependences across iterations of one loop.
    pub fn analyze(&self, ast: &Ast, lp: NodeId) -> Vec<Dependence> {
        self.analyze_nest(ast, &[lp])
    }

    /// Dependences inside `levels[0]`, with direction vectors over the
    /// chain `levels` (outermost first).
    pub fn analyze_nest(&self, ast: &Ast, levels: &[NodeId]) -> Vec<Dependence> {
        let scope = match levels.first() {
            Some(&s) => s,
            None => return Vec::new(),
        };
        let set = collect_accesses(ast, scope);
        let mut deps = Vec::new();

        for &call in &set.calls {
            let callee = match ast.kind(call) {
                NodeKind::Call { callee, .. } => callee.clone(),
                _ => String::new(),
            };
            deps.push(Dependence {
                source: call,
                target: call,
                kind: DependenceKind::Output,
                direction: vec![Direction::Star; levels.len()],
                array: callee,
                reduction: None,
                level: Some(0),
                is_loop_independent: false,
            });
        }

        let nest = Nest::new(ast, levels, self.max_levels);
        let accesses = &set.accesses;
        for i in 0..accesses.len() {
            for j in i..accesses.len() {
                let (x, y) = (&accesses[i], &accesses[j]);
                if x.buffer != y.buffer || (x.kind == AccessKind::Read && y.kind == AccessKind::Read) {
                    continue;
                }
                nest.edges(x, y, &mut deps);
            }
        }
        trace!("{} dependences over {} levels", deps.len(), levels.len());
        deps
    }

    /// Whether iterations of `lp` may run concurrently.
    pub fn check_parallelize(&self, ast: &Ast, lp: NodeId) -> ParallelVerdict {
        let mut reductions: Vec<(String, ReduceOp)> = Vec::new();
        for dep in self.analyze(ast, lp) {
            if !dep.is_carried_at(0) {
                continue;
            }
            match dep.reduction {
                Some(op) => {
                    if !reductions.iter().any(|(b, o)| *b == dep.array && *o == op) {
                        reductions.push((dep.array.clone(), op));
                    }
                }
                None => return ParallelVerdict::Unsafe(dep),
            }
        }
        ParallelVerdict::Safe { reductions }
    }

    pub fn can_parallelize(&self, ast: &Ast, lp: NodeId) -> bool {
        self.check_parallelize(ast, lp).is_safe()
    }

    /// Whether the perfect nest `chain` may be permuted so that position `k`
    /// holds `chain[perm[k]]`. Returns the first violated dependence.
    pub fn check_reorder(&self, ast: &Ast, chain: &[NodeId], perm: &[usize]) -> Result<(), Dependence> {
        for dep in self.analyze_nest(ast, chain) {
            if dep.reduction.is_some() {
                continue;
            }
            let permuted: Vec<Direction> = perm
                .iter()
                .map(|&p| dep.direction.get(p).copied().unwrap_or(Direction::Star))
                .collect();
            if !is_lexicographically_non_negative(&permuted) {
                return Err(dep);
            }
        }
        Ok(())
    }

    pub fn can_reorder(&self, ast: &Ast, chain: &[NodeId], perm: &[usize]) -> bool {
        self.check_reorder(ast, chain, perm).is_ok()
    }

    /// Whether the body of `lp` may be distributed into two loops, the first
    /// running the statements of `part0` and the second those of `part1`.
    pub fn check_fission(
        &self,
        ast: &Ast,
        lp: NodeId,
        part0: &[NodeId],
        part1: &[NodeId],
    ) -> Result<(), Dependence> {
        let subtree = |part: &[NodeId]| -> HashSet<NodeId> {
            part.iter().flat_map(|&s| ast.walk_from(s)).collect()
        };
        let (first, second) = (subtree(part0), subtree(part1));
        for dep in self.analyze(ast, lp) {
            if dep.reduction.is_some() || !dep.is_carried_at(0) {
                continue;
            }
            let backwards = second.contains(&dep.source) && first.contains(&dep.target);
            if backwards || dep.direction[0] == Direction::Star {
                return Err(dep);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{AccessType, CallArg};
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, var, load, DataType};

    fn one_loop(body: impl FnOnce(&mut AstBuilder)) -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 0, 8).id("L1").body(body);
        })
        .unwrap()
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(Direction::Lt.reverse(), Direction::Gt);
        assert_eq!(Direction::Eq.reverse(), Direction::Eq);
        assert!(is_lexicographically_non_negative(&[Direction::Eq, Direction::Lt, Direction::Gt]));
        assert!(!is_lexicographically_non_negative(&[Direction::Eq, Direction::Gt]));
        assert!(!is_lexicographically_non_negative(&[Direction::Star]));
    }

    #[test]
    fn test_independent_loop() {
        let ast = one_loop(|b| {
            b.store("y", vec![var("i")], load("x", vec![var("i")]) * 2);
        });
        let l1 = ast.find("L1").unwrap();
        let da = DependenceAnalysis::new();
        assert!(da.can_parallelize(&ast, l1));
        assert!(da.analyze(&ast, l1).iter().all(|d| d.is_loop_independent));
    }

    #[test]
    fn test_carried_flow() {
        let ast = one_loop(|b| {
            b.store("y", vec![var("i") + 1], load("y", vec![var("i")]));
        });
        let l1 = ast.find("L1").unwrap();
        match DependenceAnalysis::new().check_parallelize(&ast, l1) {
            ParallelVerdict::Unsafe(dep) => {
                assert_eq!(dep.kind, DependenceKind::Flow);
                assert_eq!(dep.direction, vec![Direction::Lt]);
                assert_eq!(dep.level, Some(0));
            }
            other => panic!("expected a carried dependence, got {:?}", other),
        }
    }

    #[test]
    fn test_even_odd_is_independent() {
        // writes even elements, reads odd ones
        let ast = one_loop(|b| {
            b.store("y", vec![var("i") * 2], load("y", vec![var("i") * 2 + 1]));
        });
        let l1 = ast.find("L1").unwrap();
        assert!(DependenceAnalysis::new().can_parallelize(&ast, l1));
    }

    #[test]
    fn test_reduction() {
        let ast = one_loop(|b| {
            b.store("y", vec![int(0)], load("y", vec![int(0)]) + load("x", vec![var("i")]));
        });
        let l1 = ast.find("L1").unwrap();
        assert_eq!(
            DependenceAnalysis::new().check_parallelize(&ast, l1),
            ParallelVerdict::Safe { reductions: vec![("y".to_string(), ReduceOp::Add)] }
        );
    }

    #[test]
    fn test_private_buffer() {
        let ast = one_loop(|b| {
            b.var_def("t", vec![int(1)], DataType::Int32, AccessType::Cache).body(|b| {
                b.store("t", vec![int(0)], load("x", vec![var("i")]));
                b.store("y", vec![var("i")], load("t", vec![int(0)]));
            });
        });
        let l1 = ast.find("L1").unwrap();
        assert!(DependenceAnalysis::new().can_parallelize(&ast, l1));
    }

    #[test]
    fn test_affine_sub_ranges() {
        let build = |scale: i64| {
            AstBuilder::build(|b| {
                b.for_loop("i", 0, 4).id("L1").body(|b| {
                    b.for_loop("j", var("i") * scale, var("i") * scale + 2).body(|b| {
                        b.store("y", vec![var("j")], var("i"));
                    });
                });
            })
            .unwrap()
        };
        let da = DependenceAnalysis::new();
        let disjoint = build(2);
        assert!(da.can_parallelize(&disjoint, disjoint.find("L1").unwrap()));
        let overlapping = build(1);
        assert!(!da.can_parallelize(&overlapping, overlapping.find("L1").unwrap()));
    }

    #[test]
    fn test_extreme_extents() {
        // extents of i64::MIN must not overflow the interval bounds
        for end in [i64::MIN, i64::MAX] {
            let ast = AstBuilder::build(|b| {
                b.for_loop("i", 0, end).id("L1").body(|b| {
                    b.for_loop("j", 0, end).id("L2").body(|b| {
                        b.store("y", vec![var("j")], load("y", vec![var("j")]) * var("i"));
                    });
                });
            })
            .unwrap();
            let da = DependenceAnalysis::new();
            for label in ["L1", "L2"] {
                let _ = da.check_parallelize(&ast, ast.find(label).unwrap());
            }
        }
    }

    #[test]
    fn test_non_affine_is_conservative() {
        let ast = one_loop(|b| {
            b.store("y", vec![var("i") * var("i")], var("i"));
        });
        let l1 = ast.find("L1").unwrap();
        assert!(!DependenceAnalysis::new().can_parallelize(&ast, l1));
    }

    #[test]
    fn test_call_is_opaque() {
        let ast = one_loop(|b| {
            b.call("f", vec![CallArg::Buffer("y".to_string()), CallArg::Value(var("i"))]);
        });
        let l1 = ast.find("L1").unwrap();
        let da = DependenceAnalysis::new();
        assert!(!da.can_parallelize(&ast, l1));
        assert!(!da.can_reorder(&ast, &[l1], &[0]));
    }

    #[test]
    fn test_reorder_legality() {
        let build = |read: Vec<crate::ir::expr::Expr>| {
            AstBuilder::build(|b| {
                b.for_loop("i", 1, 4).id("L1").body(|b| {
                    b.for_loop("j", 0, 4).id("L2").body(|b| {
                        b.store("y", vec![var("i"), var("j")], load("y", read));
                    });
                });
            })
            .unwrap()
        };
        let da = DependenceAnalysis::new();

        // (<, >) becomes (>, <) when swapped
        let skewed = build(vec![var("i") - 1, var("j") + 1]);
        let chain = [skewed.find("L1").unwrap(), skewed.find("L2").unwrap()];
        assert!(da.can_reorder(&skewed, &chain, &[0, 1]));
        assert!(!da.can_reorder(&skewed, &chain, &[1, 0]));

        // (<, =) becomes (=, <)
        let straight = build(vec![var("i") - 1, var("j")]);
        let chain = [straight.find("L1").unwrap(), straight.find("L2").unwrap()];
        assert!(da.can_reorder(&straight, &chain, &[1, 0]));
    }

    #[test]
    fn test_fission_legality() {
        let build = |offset: i64| {
            AstBuilder::build(|b| {
                b.for_loop("i", 1, 8).id("L1").body(|b| {
                    b.store("a", vec![var("i")], load("b", vec![var("i") + offset]));
                    b.store("b", vec![var("i")], var("i"));
                });
            })
            .unwrap()
        };
        let da = DependenceAnalysis::new();

        // a[i] = b[i - 1]; b[i] = i : the second statement feeds the first
        let backward = build(-1);
        let l1 = backward.find("L1").unwrap();
        let parts = backward.children(backward.children(l1)[0]);
        assert!(da.check_fission(&backward, l1, &parts[..1], &parts[1..]).is_err());

        // a[i] = b[i + 1]; b[i] = i : only an anti dependence, kept in order
        let forward = build(1);
        let l1 = forward.find("L1").unwrap();
        let parts = forward.children(forward.children(l1)[0]);
        assert!(da.check_fission(&forward, l1, &parts[..1], &parts[1..]).is_ok());
    }
}

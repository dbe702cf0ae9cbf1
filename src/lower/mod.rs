//! Lowering of a scheduled tree towards code generation.
//!
//! The pipeline runs in a fixed order:
//! 1. expand every call ([`crate::transform::inline_all`]);
//! 2. validate parallel tags against the [`Target`];
//! 3. re-check every parallel loop and move parallel reductions into
//!    per-iteration workspaces ([`reduction`]);
//! 4. simplify ([`simplify`]).
//!
//! The input tree is never modified.

pub mod reduction;
pub mod simplify;

use crate::analysis::DependenceAnalysis;
use crate::config::LowerConfig;
use crate::ir::ast::{Ast, MemType, NodeKind};
use crate::ir::func::{Function, FunctionRegistry};
use crate::transform::inline_all;
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use log::info;
use std::fmt;
use std::str::FromStr;

pub use reduction::lower_parallel_reductions;
pub use simplify::simplify;

const NAME: &str = "lower";

/// Kind of hardware the tree is lowered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Gpu,
}

/// Code generation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub device: Device,
    /// Memory space of buffers the lowering introduces
    pub default_mem: MemType,
}

const GPU_TAGS: [&str; 6] = [
    "threadIdx.x",
    "threadIdx.y",
    "threadIdx.z",
    "blockIdx.x",
    "blockIdx.y",
    "blockIdx.z",
];

impl Target {
    pub fn cpu() -> Self {
        Self { device: Device::Cpu, default_mem: MemType::Cpu }
    }

    pub fn gpu() -> Self {
        Self { device: Device::Gpu, default_mem: MemType::GpuGlobal }
    }

    /// Whether loops tagged `tag` can run in parallel on this target.
    pub fn accepts_tag(&self, tag: &str) -> bool {
        match self.device {
            Device::Cpu => tag == "openmp",
            Device::Gpu => GPU_TAGS.contains(&tag),
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Target::cpu()),
            "gpu" => Ok(Target::gpu()),
            _ => Err(format!("unknown target `{}`", s)),
        }
    }
}

/// Lower with the default configuration.
pub fn lower(ast: &Ast, target: &Target, registry: &FunctionRegistry) -> ScheduleResult<Ast> {
    lower_with(ast, target, registry, &LowerConfig::default())
}

pub fn lower_with(
    ast: &Ast,
    target: &Target,
    registry: &FunctionRegistry,
    config: &LowerConfig,
) -> ScheduleResult<Ast> {
    let mut ast = ast.clone();
    if config.inline {
        let n = inline_all(&mut ast, registry)?;
        info!("inlined {} calls", n);
    }
    check_tags(&ast, target)?;

    let analysis = DependenceAnalysis::new();
    let lowered = lower_parallel_reductions(&mut ast, target, &analysis, config.lower_reductions)?;
    info!("lowered {} parallel reductions", lowered);

    if config.simplify {
        simplify(&mut ast);
        info!("simplified tree");
    }
    ast.compact();
    ast.reindex().map_err(|e| InvalidSchedule::malformed(NAME, e.message))?;
    Ok(ast)
}

/// Lower a function body with its parameters declared around it.
pub fn lower_function(
    func: &Function,
    target: &Target,
    registry: &FunctionRegistry,
) -> ScheduleResult<Ast> {
    let ast = func
        .to_ast()
        .map_err(|e| InvalidSchedule::malformed(NAME, format!("function {}: {}", func.name, e)))?;
    lower(&ast, target, registry)
}

fn check_tags(ast: &Ast, target: &Target) -> ScheduleResult<()> {
    for lp in ast.loops() {
        if let NodeKind::For { iter, property, .. } = ast.kind(lp) {
            if let Some(tag) = property.parallel_tag() {
                if !target.accepts_tag(tag) {
                    let name = ast.node(lp).label.clone().unwrap_or_else(|| iter.clone());
                    return Err(InvalidSchedule::unsupported(
                        NAME,
                        format!("parallel tag {} of {} is not available on {}", tag, name, target),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{AccessType, Buffer};
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, load, var, DataType};
    use crate::ir::func::Param;
    use crate::utils::errors::InvalidScheduleKind;

    fn tagged(tag: &str) -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L1").parallel(tag).body(|b| {
                b.store("y", vec![var("i")], load("x", vec![var("i")]));
            });
        })
        .unwrap()
    }

    #[test]
    fn test_tag_validation() {
        let reg = FunctionRegistry::empty();
        assert!(lower(&tagged("openmp"), &Target::cpu(), &reg).is_ok());
        assert!(lower(&tagged("threadIdx.x"), &Target::gpu(), &reg).is_ok());

        let err = lower(&tagged("threadIdx.x"), &Target::cpu(), &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::Unsupported);
        let err = lower(&tagged("openmp"), &Target::gpu(), &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::Unsupported);
        let err = lower(&tagged("warp.x"), &Target::gpu(), &reg).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::Unsupported);
    }

    #[test]
    fn test_unsafe_parallel_rejected() {
        let ast = AstBuilder::build(|b| {
            b.for_loop("i", 1, 4).id("L1").parallel("openmp").body(|b| {
                b.store("y", vec![var("i")], load("y", vec![var("i") - 1]));
            });
        })
        .unwrap();
        let err = lower(&ast, &Target::cpu(), &FunctionRegistry::empty()).unwrap_err();
        assert_eq!(err.kind, InvalidScheduleKind::UnsolvableDependency);
    }

    #[test]
    fn test_lower_function() {
        let body = AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).body(|b| {
                b.if_then(crate::ir::expr::lt(var("i"), int(4)), |b| {
                    b.store("y", vec![var("i")], load("x", vec![var("i")]));
                });
            });
        })
        .unwrap();
        let buf = |atype| Buffer::new(vec![int(4)], DataType::Float32, atype, MemType::Cpu);
        let func = Function::new(
            "copy",
            vec![Param::new("x", buf(AccessType::Input)), Param::new("y", buf(AccessType::Output))],
            body,
        );
        let ast = lower_function(&func, &Target::cpu(), &FunctionRegistry::empty()).unwrap();
        let text = ast.to_string();
        assert!(text.starts_with("vardef x: float32[4] input cpu {"), "{}", text);
        assert!(!text.contains("if"), "{}", text);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!("GPU".parse::<Target>().unwrap(), Target::gpu());
        assert!("tpu".parse::<Target>().is_err());
    }
}

//! Textual schedule commands.
//!
//! ```text
//! reorder L2,L1
//! split L1 factor=4
//! split L1 nparts=n
//! parallelize L1 openmp
//! fission L1 S0
//! var_reorder V 1,0
//! inline
//! ```

use crate::ir::expr::Expr;
use crate::ir::func::FunctionRegistry;
use crate::transform::Schedule;
use crate::utils::errors::{InvalidSchedule, ScheduleResult};
use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// One recorded or requested schedule operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScheduleCommand {
    Reorder { order: Vec<String> },
    Split {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        factor: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nparts: Option<Expr>,
    },
    Parallelize { id: String, tag: String },
    Fission { id: String, after: String },
    VarReorder { id: String, order: Vec<usize> },
    Inline,
}

impl ScheduleCommand {
    /// Run the command against a schedule.
    pub fn run(&self, schedule: &mut Schedule, registry: &FunctionRegistry) -> ScheduleResult<()> {
        match self {
            ScheduleCommand::Reorder { order } => schedule.reorder(order.as_slice()),
            ScheduleCommand::Split { id, factor, nparts } => {
                schedule.split(id, factor.clone(), nparts.clone()).map(|_| ())
            }
            ScheduleCommand::Parallelize { id, tag } => schedule.parallelize(id, tag),
            ScheduleCommand::Fission { id, after } => schedule.fission(id, after).map(|_| ()),
            ScheduleCommand::VarReorder { id, order } => schedule.var_reorder(id, order),
            ScheduleCommand::Inline => schedule.inline(registry).map(|_| ()),
        }
    }
}

fn bad(message: impl Into<String>) -> InvalidSchedule {
    InvalidSchedule::malformed("command", message)
}

fn list(w: &str) -> Vec<String> {
    w.split(',').filter(|p| !p.is_empty()).map(str::to_string).collect()
}

fn parse_count(s: &str) -> Expr {
    match s.parse::<i64>() {
        Ok(v) => Expr::Int(v),
        Err(_) => Expr::var(s),
    }
}

impl FromStr for ScheduleCommand {
    type Err = InvalidSchedule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        match words.as_slice() {
            ["reorder", ids] => Ok(ScheduleCommand::Reorder { order: list(ids) }),
            ["split", id, arg] => {
                let (key, value) = arg
                    .split_once('=')
                    .ok_or_else(|| bad(format!("expected factor=N or nparts=N, got `{}`", arg)))?;
                let count = parse_count(value);
                match key {
                    "factor" => Ok(ScheduleCommand::Split { id: id.to_string(), factor: Some(count), nparts: None }),
                    "nparts" => Ok(ScheduleCommand::Split { id: id.to_string(), factor: None, nparts: Some(count) }),
                    _ => Err(bad(format!("unknown split argument `{}`", key))),
                }
            }
            ["parallelize", id, tag] => Ok(ScheduleCommand::Parallelize { id: id.to_string(), tag: tag.to_string() }),
            ["fission", id, after] => Ok(ScheduleCommand::Fission { id: id.to_string(), after: after.to_string() }),
            ["var_reorder", id, order] => {
                let order = list(order)
                    .iter()
                    .map(|k| k.parse::<usize>().map_err(|_| bad(format!("bad dimension `{}`", k))))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ScheduleCommand::VarReorder { id: id.to_string(), order })
            }
            ["inline"] => Ok(ScheduleCommand::Inline),
            [] => Err(bad("empty command")),
            [op, ..] => Err(bad(format!("cannot parse `{}` command `{}`", op, s.trim()))),
        }
    }
}

impl fmt::Display for ScheduleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleCommand::Reorder { order } => write!(f, "reorder {}", order.join(",")),
            ScheduleCommand::Split { id, factor: Some(c), .. } => write!(f, "split {} factor={}", id, c),
            ScheduleCommand::Split { id, nparts: Some(c), .. } => write!(f, "split {} nparts={}", id, c),
            ScheduleCommand::Split { id, .. } => write!(f, "split {}", id),
            ScheduleCommand::Parallelize { id, tag } => write!(f, "parallelize {} {}", id, tag),
            ScheduleCommand::Fission { id, after } => write!(f, "fission {} {}", id, after),
            ScheduleCommand::VarReorder { id, order } => {
                let dims: Vec<String> = order.iter().map(|k| k.to_string()).collect();
                write!(f, "var_reorder {} {}", id, dims.join(","))
            }
            ScheduleCommand::Inline => write!(f, "inline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::InvalidScheduleKind;

    #[test]
    fn test_parse_commands() {
        let cmd: ScheduleCommand = "reorder L2,L1".parse().unwrap();
        assert_eq!(cmd, ScheduleCommand::Reorder { order: vec!["L2".to_string(), "L1".to_string()] });

        let cmd: ScheduleCommand = "split L1 nparts=n".parse().unwrap();
        assert_eq!(
            cmd,
            ScheduleCommand::Split { id: "L1".to_string(), factor: None, nparts: Some(Expr::var("n")) }
        );
        assert_eq!(cmd.to_string(), "split L1 nparts=n");

        let cmd: ScheduleCommand = "  var_reorder V 1,0 ".parse().unwrap();
        assert_eq!(cmd.to_string(), "var_reorder V 1,0");
        assert_eq!("inline".parse::<ScheduleCommand>().unwrap(), ScheduleCommand::Inline);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "split L1 4", "split L1 step=4", "var_reorder V a,b", "tile L1 4"] {
            let err = bad.parse::<ScheduleCommand>().unwrap_err();
            assert_eq!(err.kind, InvalidScheduleKind::MalformedArguments, "{}", bad);
        }
    }

    #[test]
    fn test_json_form() {
        let cmd = ScheduleCommand::Parallelize { id: "L1".to_string(), tag: "openmp".to_string() };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"op":"parallelize","id":"L1","tag":"openmp"}"#);
        let back: ScheduleCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}

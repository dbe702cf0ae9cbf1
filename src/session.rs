//! JSON session files.
//!
//! A session bundles a program tree, the functions it may call and an
//! optional list of schedule commands:
//!
//! ```json
//! { "functions": [...], "program": { "nodes": [...], "root": 0 }, "schedule": [...] }
//! ```

use crate::ir::ast::Ast;
use crate::ir::func::{Function, FunctionRegistry, RegistryBuilder};
use crate::transform::ScheduleCommand;
use crate::utils::errors::SchedResult;
use serde::{Serialize, Deserialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub functions: Vec<Function>,
    pub program: Ast,
    /// Commands applied before any given on the command line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule: Vec<ScheduleCommand>,
}

impl Session {
    pub fn new(program: Ast) -> Self {
        Self { functions: Vec::new(), program, schedule: Vec::new() }
    }

    pub fn from_json(text: &str) -> SchedResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> SchedResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Freeze the session's functions into a registry.
    pub fn registry(&self) -> SchedResult<Arc<FunctionRegistry>> {
        let mut builder = RegistryBuilder::new();
        for func in &self.functions {
            builder.register(func.clone())?;
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{AccessType, Buffer, MemType};
    use crate::ir::builder::AstBuilder;
    use crate::ir::expr::{int, load, var, DataType};
    use crate::ir::func::Param;
    use crate::utils::errors::LoopSchedError;

    fn program() -> Ast {
        AstBuilder::build(|b| {
            b.for_loop("i", 0, 4).id("L1").body(|b| {
                b.store("y", vec![var("i")], load("x", vec![var("i")]) + 1);
            });
        })
        .unwrap()
    }

    #[test]
    fn test_session_json() {
        let mut session = Session::new(program());
        session.schedule.push("parallelize L1 openmp".parse().unwrap());
        let buf = Buffer::new(vec![int(4)], DataType::Int32, AccessType::InOut, MemType::Cpu);
        session.functions.push(Function::new("f", vec![Param::new("y", buf)], program()));

        let text = session.to_json().unwrap();
        let back = Session::from_json(&text).unwrap();
        assert!(back.program.matches(&session.program));
        assert_eq!(back.schedule, session.schedule);
        assert!(back.program.find("L1").is_some());
        assert_eq!(back.registry().unwrap().names(), vec!["f"]);
    }

    #[test]
    fn test_duplicate_function() {
        let mut session = Session::new(program());
        session.functions.push(Function::new("f", vec![], program()));
        session.functions.push(Function::new("f", vec![], program()));
        assert!(matches!(session.registry().unwrap_err(), LoopSchedError::Ir(_)));
    }

    #[test]
    fn test_shared_node_rejected() {
        let text = r#"{
            "program": {
                "nodes": [
                    { "kind": { "Block": [1, 1] } },
                    { "kind": "Any" }
                ],
                "root": 0
            }
        }"#;
        assert!(matches!(Session::from_json(text).unwrap_err(), LoopSchedError::Json(_)));
    }
}

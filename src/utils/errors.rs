//! Error types for the loop scheduler.
//!
//! This module defines all error types used throughout the crate,
//! organized by the layer that produces them.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the scheduler.
#[derive(Error, Debug)]
pub enum LoopSchedError {
    /// A rejected schedule request
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] InvalidSchedule),

    /// A malformed tree or registry
    #[error("IR error: {0}")]
    Ir(#[from] IrError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON session file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A rejected transformation or lowering request.
///
/// Every schedule operation that returns this error leaves the tree it was
/// applied to untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct InvalidSchedule {
    /// The error message
    pub message: String,
    /// The kind of schedule error
    pub kind: InvalidScheduleKind,
    /// The transformation that failed
    pub transform: String,
}

impl fmt::Display for InvalidSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.message, self.transform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidScheduleKind {
    /// Identifier not found in the current tree
    NotFound,
    /// Identifier names something other than a loop
    NotALoop,
    /// Identifier names something other than a buffer declaration
    NotAVarDef,
    /// Loops do not form a perfect nest
    NotPerfectNest,
    /// The rewrite would violate (or cannot be proven not to violate) a dependence
    UnsolvableDependency,
    /// Malformed arguments (split factor/nparts, permutations, ...)
    MalformedArguments,
    /// Called function is not in the registry
    FunctionNotRegistered,
    /// Call arguments do not fit the declared parameters
    ArgumentMismatch,
    /// A function (transitively) calls itself
    RecursiveCall,
    /// Request is well-formed but not supported for this tree or target
    Unsupported,
}

impl InvalidScheduleKind {
    /// Short human-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            InvalidScheduleKind::NotFound => "identifier not found",
            InvalidScheduleKind::NotALoop => "not a loop",
            InvalidScheduleKind::NotAVarDef => "not a variable definition",
            InvalidScheduleKind::NotPerfectNest => "not a perfect nest",
            InvalidScheduleKind::UnsolvableDependency => "unsolvable dependency",
            InvalidScheduleKind::MalformedArguments => "malformed arguments",
            InvalidScheduleKind::FunctionNotRegistered => "function not registered",
            InvalidScheduleKind::ArgumentMismatch => "argument/parameter mismatch",
            InvalidScheduleKind::RecursiveCall => "recursive call",
            InvalidScheduleKind::Unsupported => "unsupported",
        }
    }
}

impl InvalidSchedule {
    /// Create a new schedule error.
    pub fn new(
        kind: InvalidScheduleKind,
        transform: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            transform: transform.into(),
        }
    }

    /// An identifier named by the request does not exist.
    pub fn not_found(transform: impl Into<String>, id: &str) -> Self {
        Self::new(
            InvalidScheduleKind::NotFound,
            transform,
            format!("{} not found", id),
        )
    }

    /// An identifier exists but does not name a loop.
    pub fn not_a_loop(transform: impl Into<String>, id: &str) -> Self {
        Self::new(
            InvalidScheduleKind::NotALoop,
            transform,
            format!("{} is not a loop", id),
        )
    }

    pub fn not_perfect_nest(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(InvalidScheduleKind::NotPerfectNest, transform, message)
    }

    pub fn dependency(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(InvalidScheduleKind::UnsolvableDependency, transform, message)
    }

    pub fn malformed(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(InvalidScheduleKind::MalformedArguments, transform, message)
    }

    pub fn mismatch(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(InvalidScheduleKind::ArgumentMismatch, transform, message)
    }

    pub fn unsupported(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(InvalidScheduleKind::Unsupported, transform, message)
    }
}

/// Error while building or validating a tree or a function registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct IrError {
    /// The error message
    pub message: String,
    /// The kind of IR error
    pub kind: IrErrorKind,
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrErrorKind {
    /// Two nodes carry the same identifier
    DuplicateIdentifier,
    /// A child handle points outside the arena
    DanglingNode,
    /// A node is reachable from two parents
    SharedNode,
    /// Two functions registered under one name
    DuplicateFunction,
}

impl IrError {
    pub fn new(kind: IrErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Result type using LoopSchedError.
pub type SchedResult<T> = Result<T, LoopSchedError>;

/// Result type of schedule operations.
pub type ScheduleResult<T> = Result<T, InvalidSchedule>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InvalidSchedule::not_found("parallelize", "L1");
        let s = format!("{}", err);
        assert!(s.contains("L1 not found"));
        assert!(s.contains("parallelize"));
        assert_eq!(err.kind.reason(), "identifier not found");
    }

    #[test]
    fn test_top_level_conversion() {
        let err: LoopSchedError = InvalidSchedule::dependency("reorder", "cycle").into();
        assert!(matches!(err, LoopSchedError::Schedule(_)));
        assert!(err.to_string().contains("cycle"));
    }
}

//! Utility modules shared across the scheduler:
//! - Error types
//! - Fresh-name generation
//! - Text rendering

pub mod errors;
pub mod names;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use names::NameGen;

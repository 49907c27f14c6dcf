//! Error types for takeoff-edit.
//!
//! This module defines error types that distinguish between:
//! - Configuration errors (exit code 2): malformed filters or field paths in a rule
//! - Runtime errors (exit code 1): serialization and I/O failures

use takeoff_domain::ConfigError;
use thiserror::Error;

/// The top-level error type for repair operations.
#[derive(Debug, Error)]
pub enum RepairError {
    /// A rule could not be compiled (exit code 2).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A runtime/tool error occurred (exit code 1).
    #[error("runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}

impl RepairError {
    pub fn is_config(&self) -> bool {
        matches!(self, RepairError::Config(_))
    }

    /// Returns the recommended exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RepairError::Config(_) => 2,
            RepairError::Runtime(_) => 1,
        }
    }
}

/// Result type alias using RepairError.
pub type RepairResult<T> = Result<T, RepairError>;

//! Configuration errors.
//!
//! Every variant is fatal and raised while compiling configuration, before any
//! element is evaluated.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("empty field name")]
    EmptyField,

    #[error("malformed field path `{path}`: at most one `.` separator is allowed")]
    MalformedPath { path: String },

    #[error("field `{field}` is reserved and cannot be written")]
    ReservedField { field: String },

    #[error("unknown comparison operator `{op}`")]
    UnknownOperator { op: String },

    #[error("comparison `{op}` on `{key}` needs a numeric operand, got `{value}`")]
    NonNumericOperand {
        key: String,
        op: String,
        value: String,
    },

    #[error("invalid condition for `{key}`: {message}")]
    InvalidCondition { key: String, message: String },

    #[error("filter syntax error at offset {offset}: {message}")]
    FilterSyntax { offset: usize, message: String },

    #[error("unmatched parenthesis at offset {offset}")]
    UnmatchedParen { offset: usize },

    #[error("{message}")]
    InvalidDefinition { message: String },

    #[error("formula syntax error at offset {offset}: {message}")]
    FormulaSyntax { offset: usize, message: String },

    #[error("reference to undefined metric `{name}`")]
    UndefinedReference { name: String },

    #[error("cyclic derived metric dependency: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("duplicate name `{name}`")]
    DuplicateName { name: String },

    #[error("{subject}: {source}")]
    Within {
        subject: String,
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Attach the metric or rule the error belongs to.
    pub fn within(self, subject: impl Into<String>) -> Self {
        ConfigError::Within {
            subject: subject.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, without subject wrappers.
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::Within { source, .. } => source.root(),
            other => other,
        }
    }
}

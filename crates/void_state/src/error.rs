//! Error types for the state layer

use thiserror::Error;

/// Errors raised while reading or writing state fields
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Alias redirects loop back onto themselves
    #[error("Alias cycle starting at {key}: {chain:?}")]
    AliasCycle { key: String, chain: Vec<String> },

    /// Field is not declared on the state type
    #[error("State type '{state_type}' has no field '{field}'")]
    UnknownField { state_type: String, field: String },

    /// Field is not a nested record
    #[error("Field '{field}' of '{state_type}' is not a nested record")]
    NotNested { state_type: String, field: String },

    /// Container operation on a scalar field, or the reverse
    #[error("Field '{field}' of '{state_type}' is not a {expected} field")]
    WrongFieldKind {
        state_type: String,
        field: String,
        expected: &'static str,
    },
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StoreError>;

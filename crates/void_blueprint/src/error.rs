//! Error types for blueprint expansion and materialization

use crate::host::HostError;
use crate::materialize::Instantiation;
use thiserror::Error;
use void_core::{Namespace, StateKind, ValueKind};
use void_state::{Conflict, StateKey, StoreError, ValueKey};

/// A non-fatal error accumulated during one expansion pass
///
/// Errors are collected per pass and only the final pass's errors are
/// surfaced, at the end of `expand()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("Object '{name}' declared by both '{first}' and '{second}'")]
    DuplicateObject {
        name: Namespace,
        first: String,
        second: String,
    },

    #[error("Blueprint '{blueprint}' at {namespace} cannot {operation} {target}: outside its subtree")]
    OutsideSubtree {
        blueprint: String,
        namespace: Namespace,
        operation: &'static str,
        target: Namespace,
    },

    #[error("Object '{0}' is not declared")]
    UnknownObject(Namespace),

    #[error("Blueprint '{0}' is not registered")]
    UnknownBlueprint(String),

    #[error("State type '{0}' is not registered")]
    UnknownStateType(String),

    #[error("No '{state_type}' state published at {namespace} or any ancestor")]
    StateNotFound {
        namespace: Namespace,
        state_type: String,
    },

    #[error("Binding {key} was already read in this pass")]
    BindingReread { key: StateKey },

    #[error("Blueprint '{blueprint}' cannot write read-only {key}")]
    ReadOnly { key: ValueKey, blueprint: String },

    #[error("{0}")]
    Conflict(Conflict),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Blueprint '{blueprint}' at {namespace}: {message}")]
    Blueprint {
        namespace: Namespace,
        blueprint: String,
        message: String,
    },
}

/// Error returned from a blueprint body
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// A builder operation failed and the blueprint gave up
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Blueprint-specific failure
    #[error("{0}")]
    Message(String),
}

impl From<StoreError> for BlueprintError {
    fn from(e: StoreError) -> Self {
        BlueprintError::Build(BuildError::Store(e))
    }
}

impl From<&str> for BlueprintError {
    fn from(s: &str) -> Self {
        BlueprintError::Message(s.to_string())
    }
}

impl From<String> for BlueprintError {
    fn from(s: String) -> Self {
        BlueprintError::Message(s)
    }
}

/// Result type for blueprint bodies
pub type BlueprintResult = Result<(), BlueprintError>;

/// Fatal expansion failures
#[derive(Debug, Error)]
pub enum ExpandError {
    /// The pass cap was reached without a fixed point
    #[error("Expansion did not converge within {limit} passes")]
    MaxIterationsExceeded { limit: usize },

    /// The entry point is not a registered blueprint
    #[error("Blueprint '{0}' is not registered")]
    UnknownBlueprint(String),

    /// A preset addresses a field that does not exist
    #[error("Invalid preset for {key}: {reason}")]
    InvalidPreset { key: String, reason: String },

    /// Parameter expansion failed at setup
    #[error(transparent)]
    Param(#[from] ParamError),

    /// Strict mode and the final pass accumulated errors
    #[error("Expansion failed with {} error(s)", .errors.len())]
    Failed { errors: Vec<BuildError> },
}

/// Parameter tree errors, raised before any pass runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("Blueprint '{0}' is not registered")]
    UnknownBlueprint(String),

    #[error("Blueprint '{blueprint}' declares parameter '{name}' twice")]
    DuplicateParameter { blueprint: String, name: String },

    #[error("Unknown parameter '{name}' for blueprint '{blueprint}'")]
    UnknownParameter { blueprint: String, name: String },

    #[error("Group '{group}' of blueprint '{blueprint}' is gated by unknown parameter '{gate}'")]
    UnknownGate {
        blueprint: String,
        group: String,
        gate: String,
    },

    #[error("Gate parameter '{gate}' must be {expected}, found {found}")]
    GateType {
        gate: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Count parameter '{gate}' is {value}, must be between 0 and {max}")]
    InvalidCount { gate: String, value: i64, max: i64 },

    #[error("Parameter '{param}' refers to unregistered state type '{state_type}'")]
    UnknownStateType { param: String, state_type: String },

    #[error("Parameter '{param}' refers to unknown field '{state_type}.{field}'")]
    UnknownField {
        param: String,
        state_type: String,
        field: String,
    },

    #[error("Parameter '{param}' cannot bind to {kind} state '{state_type}'")]
    IncompatibleState {
        param: String,
        state_type: String,
        kind: StateKind,
    },

    #[error("Parameter '{param}' cannot bind to nested record field '{field}'")]
    NestedField { param: String, field: String },

    #[error("Parameter '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Values for '{name}' must be a {expected}")]
    Shape { name: String, expected: &'static str },

    #[error("Blueprint '{0}' imports itself")]
    RecursiveGroup(String),
}

/// A post-instantiate callback that raised or panicked
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackFailure {
    pub namespace: Namespace,
    pub message: String,
}

/// Failures of `instantiate()`
#[derive(Debug, Error)]
pub enum InstantiateError {
    /// The host rejected the configuration; nothing was committed
    #[error("Host rejected the configuration: {0}")]
    Rejected(#[source] HostError),

    /// Materialization succeeded but callbacks failed
    #[error("{} post-instantiate callback(s) failed", .failures.len())]
    Callbacks {
        failures: Vec<CallbackFailure>,
        /// The objects that were created regardless
        realized: Instantiation,
    },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

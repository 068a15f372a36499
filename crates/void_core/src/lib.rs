//! # void_core - Blueprint Core
//!
//! Core primitives shared by every layer of blueprint expansion:
//! - **Namespace**: hierarchical paths anchoring declarations in the object tree
//! - **Value**: dynamic values carried by state fields, attributes and presets
//! - **StateRegistry**: state type schemas with merged, inherited field tables
//!
//! Nothing in this crate performs expansion; it only defines the vocabulary.

pub mod error;
pub mod namespace;
pub mod type_registry;
pub mod value;

pub use error::*;
pub use namespace::*;
pub use type_registry::*;
pub use value::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::namespace::Namespace;
    pub use crate::type_registry::{
        ContainerKind, FieldDefault, FieldSpec, StateKind, StateRegistry, StateType,
    };
    pub use crate::value::{Value, ValueKind};
}

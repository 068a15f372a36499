//! # void_state - State Records and Value Store
//!
//! Shared, typed, namespace-scoped state for blueprint expansion.
//!
//! ## Key Concepts
//!
//! - **StateKey / ValueKey**: address a record, or one field of it
//! - **ValueStore**: per-field history ranked by (priority, sequence)
//! - **BindingTable**: which record is published at which namespace
//! - **InstanceCache**: per-pass bookkeeping for touched records
//! - **StateRef**: handle blueprints use to reach a record's fields

pub mod binding;
pub mod error;
pub mod instance;
pub mod key;
pub mod store;

pub use binding::{Binding, BindingTable};
pub use error::{Result, StoreError};
pub use instance::{InstanceCache, StateInstance, StateRef};
pub use key::{StateKey, ValueKey};
pub use store::{
    merge_container, Assignment, Conflict, Lookup, Priority, ValueEntry, ValueStore, Written,
    PRESET_SOURCE,
};

//! # void_blueprint - Blueprint Expansion
//!
//! Turns a tree of parameterized blueprints into a concrete object graph:
//!
//! - **Builder**: runs blueprints pass after pass until the bindings and
//!   values they propose stop changing
//! - **BlueprintContext**: the handle a blueprint declares objects, queues
//!   sub-blueprints and shares state through
//! - **Params**: declared parameters, gated and replicated groups, and
//!   conversion of user values into presets
//! - **Materialize**: stages the resolved graph, hands it to a [`Host`] in
//!   one call and runs post-instantiate callbacks
//!
//! ## Example
//!
//! ```ignore
//! use void_blueprint::prelude::*;
//!
//! let mut registry = BlueprintRegistry::new();
//! registry.register_state(StateType::config("Clock").field("freq", 100))?;
//! registry.register(Blueprint::new("board", |ctx, ns| {
//!     let clock = ctx.expose_state(ns, "Clock")?;
//!     ctx.set(&clock, "freq", 250)?;
//!     ctx.add_object(ns.child("cpu"), "cpu", [("clock", 250)]);
//!     Ok(())
//! }));
//!
//! let graph = Builder::new(Arc::new(registry)).expand(Namespace::new("machine"), "board", vec![])?;
//! let created = instantiate(&graph, &mut host, "")?;
//! ```

pub mod active;
pub mod blueprint;
pub mod builder;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod host;
pub mod materialize;
pub mod params;
pub mod task;

pub use blueprint::{Args, Blueprint, BlueprintFn, BlueprintRegistry};
pub use builder::{expand, Builder};
pub use callback::{CallbackArgs, CallbackContext, CallbackFn, PostInstantiate};
pub use config::ExpandConfig;
pub use context::{BlueprintContext, ReadFlags};
pub use error::{
    BlueprintError, BlueprintResult, BuildError, CallbackFailure, ConfigError, ExpandError,
    InstantiateError, ParamError,
};
pub use graph::{ObjectDescriptor, ResolvedGraph};
pub use host::{AttrValue, Host, HostError, ObjectId, ObjectRef, ObjectSpec, StagedHandle};
pub use materialize::{instantiate, qualified_name, Instantiation, StagedGraph};
pub use params::{
    flat_parameters, param_tree, preset_from_nested_values, FlatParam, Gate, GroupParam,
    LeafParam, ParamDecl, ParamInfo, ParamNode, ParamTree, Preset,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        expand, instantiate, preset_from_nested_values, Args, AttrValue, Blueprint,
        BlueprintContext, BlueprintRegistry, BlueprintResult, Builder, BuildError, ExpandConfig,
        ExpandError, Host, HostError, ObjectId, ParamDecl, Preset, ReadFlags, ResolvedGraph,
    };
    pub use std::sync::Arc;
    pub use void_core::{FieldDefault, Namespace, StateKind, StateType, Value, ValueKind};
    pub use void_state::{Assignment, Priority, StateKey, StateRef, ValueKey};
}

//! Post-instantiate callbacks
//!
//! Blueprints register callbacks during expansion; they run once, after the
//! host has created the whole configuration, in registration order. A
//! failing or panicking callback is logged and recorded, and the batch
//! continues.

use crate::blueprint::Args;
use crate::error::CallbackFailure;
use crate::host::{AttrValue, Host, HostError, ObjectId, ObjectRef};
use crate::materialize::Instantiation;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use void_core::Namespace;

/// Keyword arguments with object references resolved
pub type CallbackArgs = BTreeMap<String, AttrValue>;

/// Callback body
pub type CallbackFn =
    dyn Fn(&mut CallbackContext<'_>, &Namespace, &CallbackArgs) -> Result<(), HostError> + Send + Sync;

/// A registered callback
#[derive(Clone)]
pub struct PostInstantiate {
    pub namespace: Namespace,
    pub callback: Arc<CallbackFn>,
    /// Arguments as registered; references resolve after materialization
    pub kwargs: Args,
    pub registered_by: String,
}

impl fmt::Debug for PostInstantiate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostInstantiate")
            .field("namespace", &self.namespace)
            .field("kwargs", &self.kwargs)
            .field("registered_by", &self.registered_by)
            .finish_non_exhaustive()
    }
}

/// Host access for a running callback
pub struct CallbackContext<'a> {
    host: &'a mut dyn Host,
    realized: &'a Instantiation,
}

impl<'a> CallbackContext<'a> {
    /// The objects created by this instantiation
    pub fn realized(&self) -> &Instantiation {
        self.realized
    }

    /// Resolve a graph namespace to a realized object
    pub fn object(&self, namespace: &Namespace) -> Result<ObjectId, HostError> {
        self.realize(&self.realized.resolve(namespace))
    }

    /// Turn any object reference into a realized handle
    ///
    /// Ports are walked attribute by attribute from their base object.
    pub fn realize(&self, object: &ObjectRef) -> Result<ObjectId, HostError> {
        match object {
            ObjectRef::Realized(id) => Ok(*id),
            ObjectRef::Staged(handle) => self
                .realized
                .by_handle(*handle)
                .ok_or_else(|| HostError::new(format!("no object was created for staged handle {}", handle.0))),
            ObjectRef::Port { base, path } => {
                let mut id = self.realize(base)?;
                for attr in path {
                    id = match self.host.get_attribute(id, attr)? {
                        AttrValue::Object(next) => self.realize(&next)?,
                        other => {
                            return Err(HostError::new(format!(
                                "attribute '{}' of {} is not an object: {:?}",
                                attr, id, other
                            )))
                        }
                    };
                }
                Ok(id)
            }
            ObjectRef::External(name) => Err(HostError::new(format!(
                "'{}' is not part of this configuration",
                name
            ))),
        }
    }

    /// Read an attribute of a realized object
    pub fn get_attribute(&self, object: ObjectId, attr: &str) -> Result<AttrValue, HostError> {
        self.host.get_attribute(object, attr)
    }

    /// Write an attribute of a realized object
    pub fn set_attribute(&mut self, object: ObjectId, attr: &str, value: AttrValue) -> Result<(), HostError> {
        self.host.set_attribute(object, attr, value)
    }
}

/// Run callbacks in order, containing errors and panics
pub(crate) fn run_callbacks(
    callbacks: &[PostInstantiate],
    host: &mut dyn Host,
    realized: &Instantiation,
) -> Vec<CallbackFailure> {
    let mut failures = Vec::new();

    for registered in callbacks {
        let args: CallbackArgs = registered
            .kwargs
            .iter()
            .map(|(name, value)| {
                (name.clone(), AttrValue::from_value(value, &mut |ns: &Namespace| realized.resolve(ns)))
            })
            .collect();

        let mut ctx = CallbackContext {
            host: &mut *host,
            realized,
        };
        let outcome = catch_panic_mut(|| (registered.callback)(&mut ctx, &registered.namespace, &args));
        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(panicked) => format!("panicked: {}", panicked),
        };

        log::error!(
            "Post-instantiate callback at {} (registered by '{}') failed: {}",
            registered.namespace,
            registered.registered_by,
            message
        );
        failures.push(CallbackFailure {
            namespace: registered.namespace.clone(),
            message,
        });
    }

    failures
}

fn catch_panic_mut<F, R>(mut f: F) -> Result<R, String>
where
    F: FnMut() -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(|| f())) {
        Ok(result) => Ok(result),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            Err(message)
        }
    }
}

//! Registry of expansions in progress
//!
//! Code running inside a blueprint can ask which expansion it belongs to.
//! Every expansion registers itself for its whole lifetime and
//! unregisters when it finishes, successfully or not.

use parking_lot::{const_mutex, Mutex};
use std::thread::{self, ThreadId};
use void_core::Namespace;

/// An expansion in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveExpansion {
    pub root: Namespace,
    pub blueprint: String,
    /// Pass being run, 0 before the first
    pub pass: usize,
}

static ACTIVE: Mutex<Vec<(ThreadId, ActiveExpansion)>> = const_mutex(Vec::new());

/// Innermost expansion running on the calling thread
pub fn current() -> Option<ActiveExpansion> {
    let me = thread::current().id();
    ACTIVE
        .lock()
        .iter()
        .rev()
        .find(|(owner, _)| *owner == me)
        .map(|(_, active)| active.clone())
}

/// Every expansion running in the process
pub fn all() -> Vec<ActiveExpansion> {
    ACTIVE.lock().iter().map(|(_, active)| active.clone()).collect()
}

/// Registration that lasts as long as the guard
pub(crate) struct ActiveGuard {
    owner: ThreadId,
    depth: usize,
}

impl ActiveGuard {
    pub(crate) fn begin(root: Namespace, blueprint: &str) -> Self {
        let owner = thread::current().id();
        let mut active = ACTIVE.lock();
        let depth = active.iter().filter(|(t, _)| *t == owner).count();
        active.push((
            owner,
            ActiveExpansion {
                root,
                blueprint: blueprint.to_string(),
                pass: 0,
            },
        ));
        Self { owner, depth }
    }

    pub(crate) fn set_pass(&self, pass: usize) {
        if let Some((_, active)) = ACTIVE
            .lock()
            .iter_mut()
            .filter(|(t, _)| *t == self.owner)
            .nth(self.depth)
        {
            active.pass = pass;
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = ACTIVE.lock();
        let position = active
            .iter()
            .enumerate()
            .filter(|(_, (t, _))| *t == self.owner)
            .nth(self.depth)
            .map(|(index, _)| index);
        if let Some(index) = position {
            active.remove(index);
        }
    }
}

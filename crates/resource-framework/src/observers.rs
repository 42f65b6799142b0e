//! # Observer Graph
//!
//! A concurrent pub/sub index from a *field identity* (`name\0id\0field`) to
//! the watchers subscribed to it. Each subscription carries a no-argument
//! callback that the runtime fires when the field settles.
//!
//! The graph keeps a reverse index from watcher id to the fields it watches
//! so that [`Observers::unwatch_all`] can tear a watcher down in one sweep.
//!
//! Callbacks are always invoked with no internal lock held. A callback may
//! therefore watch, trigger or unwatch other fields (the runtime relies on
//! this for propagation).

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A subscriber notification.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// A hook run once when the last watcher of a field goes away.
pub type UnwatchHook = Box<dyn FnOnce() + Send + Sync>;

/// Result of a [`Observers::watch`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watch {
    /// Nobody was watching the field before this call.
    pub initial: bool,
    /// The watcher was already subscribed; nothing changed.
    pub exists: bool,
}

#[derive(Default)]
pub struct Observers {
    // lock order: `fields` before `watchers`
    fields: DashMap<String, HashMap<String, Callback>>,
    watchers: DashMap<String, HashSet<String>>,
    hooks: DashMap<String, Vec<UnwatchHook>>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("fields", &self.fields.len())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `watcher` to `uid`. A second subscription of the same pair
    /// keeps the first callback and reports `exists`.
    pub fn watch(&self, uid: &str, watcher: &str, callback: Callback) -> Watch {
        let mut subscribers = self.fields.entry(uid.to_owned()).or_default();
        let initial = subscribers.is_empty();
        if subscribers.contains_key(watcher) {
            return Watch {
                initial,
                exists: true,
            };
        }
        subscribers.insert(watcher.to_owned(), callback);
        self.watchers
            .entry(watcher.to_owned())
            .or_default()
            .insert(uid.to_owned());

        trace!(uid = %printable(uid), watcher = %printable(watcher), initial, "Watch");
        Watch {
            initial,
            exists: false,
        }
    }

    /// Broadcasts to every watcher of `uid`. Returns how many were notified.
    pub fn trigger(&self, uid: &str) -> usize {
        let callbacks: Vec<Callback> = match self.fields.get(uid) {
            Some(subscribers) => subscribers.values().cloned().collect(),
            None => return 0,
        };
        trace!(uid = %printable(uid), watchers = callbacks.len(), "Broadcast");
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unwatch(&self, uid: &str, watcher: &str) -> bool {
        if let Some(mut fields) = self.watchers.get_mut(watcher) {
            fields.remove(uid);
        }
        self.watchers.remove_if(watcher, |_, fields| fields.is_empty());
        self.detach(uid, watcher)
    }

    /// Removes every subscription owned by `watcher`. Returns how many were
    /// removed.
    pub fn unwatch_all(&self, watcher: &str) -> usize {
        let Some((_, fields)) = self.watchers.remove(watcher) else {
            return 0;
        };
        let removed = fields
            .iter()
            .filter(|uid| self.detach(uid, watcher))
            .count();
        debug!(watcher = %printable(watcher), removed, "Unwatched");
        removed
    }

    /// Registers a hook that runs when `uid` loses its last watcher.
    pub fn on_unwatch(&self, uid: &str, hook: UnwatchHook) {
        self.hooks.entry(uid.to_owned()).or_default().push(hook);
    }

    pub fn is_watched(&self, uid: &str) -> bool {
        self.watcher_count(uid) > 0
    }

    pub fn watcher_count(&self, uid: &str) -> usize {
        self.fields.get(uid).map_or(0, |subscribers| subscribers.len())
    }

    fn detach(&self, uid: &str, watcher: &str) -> bool {
        let (removed, emptied) = match self.fields.get_mut(uid) {
            Some(mut subscribers) => {
                let removed = subscribers.remove(watcher).is_some();
                (removed, subscribers.is_empty())
            }
            None => (false, false),
        };
        if emptied && self.fields.remove_if(uid, |_, s| s.is_empty()).is_some() {
            if let Some((_, hooks)) = self.hooks.remove(uid) {
                for hook in hooks {
                    hook();
                }
            }
        }
        removed
    }
}

/// Field identities use NUL separators; render them readable in logs.
pub(crate) fn printable(uid: &str) -> String {
    uid.replace('\0', "/")
}

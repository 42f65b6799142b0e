//! # Field Cache
//!
//! Every resource instance owns a [`Cache`]: a concurrent map from field name
//! to the state of that field. A field moves through these states:
//!
//! ```text
//!   (absent) ──claim──▶ Computing ──NotReady──▶ Waiting ──claim──▶ Computing ...
//!                           │                                         │
//!                           └────────── Ready / Failed ──▶ Settled ◀──┘
//! ```
//!
//! `Settled` is terminal: a settled entry (a valid value or an error) is never
//! replaced. `Computing` is held by exactly one caller at a time, which is how
//! the runtime guarantees a field is never computed twice concurrently. A
//! caller that finds the field `Computing` marks it for a rerun, so an input
//! that arrives while the computation is in flight is never lost.

use crate::error::FrameworkError;
use crate::value::Value;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A settled field: its value or its error.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub error: Option<FrameworkError>,
    pub valid: bool,
    /// Seconds since the unix epoch at which the entry settled.
    pub timestamp: u64,
}

impl CacheEntry {
    pub fn value(data: Value) -> Self {
        Self {
            data,
            error: None,
            valid: true,
            timestamp: now(),
        }
    }

    pub fn error(error: FrameworkError) -> Self {
        Self {
            data: Value::Nil,
            error: Some(error),
            valid: true,
            timestamp: now(),
        }
    }

    pub fn from_result(result: Result<Value, FrameworkError>) -> Self {
        match result {
            Ok(data) => Self::value(data),
            Err(e) => Self::error(e),
        }
    }

    /// Once valid or failed, an entry is never recomputed.
    pub fn is_terminal(&self) -> bool {
        self.valid || self.error.is_some()
    }

    pub fn to_result(&self) -> Result<Value, FrameworkError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.data.clone()),
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Clone, Debug)]
enum Slot {
    Computing { rerun: bool },
    Waiting,
    Settled(CacheEntry),
}

/// Outcome of trying to become the computer of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum Claim {
    /// The caller now owns the computation and must finish it with
    /// [`Cache::settle`] or [`Cache::park`].
    Acquired,
    /// Someone else is computing; they have been asked to run again.
    InFlight,
    /// The field already settled.
    Settled(CacheEntry),
}

/// Outcome of giving up a claim because inputs are missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Park {
    /// New input arrived during the attempt; the caller still owns the claim
    /// and must compute again.
    Retry,
    /// The field is waiting for its inputs.
    Parked,
    /// The field settled during the attempt, e.g. published by the compute
    /// itself.
    Settled,
}

/// Read-only view of a field, as seen by compute implementations.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldState {
    Ready(Value),
    Failed(FrameworkError),
    Pending,
}

impl FieldState {
    /// Turns the state into an input for a dependent computation.
    ///
    /// Used through the [`ready!`](crate::ready) macro.
    pub fn into_input(self) -> Result<Value, crate::resource::Computation> {
        match self {
            FieldState::Ready(v) => Ok(v),
            FieldState::Failed(e) => Err(crate::resource::Computation::Failed(e)),
            FieldState::Pending => Err(crate::resource::Computation::NotReady),
        }
    }
}

/// Concurrent per-resource field cache.
#[derive(Debug, Default)]
pub struct Cache {
    slots: DashMap<String, Slot>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the settled entry for `field`, if any.
    pub fn load(&self, field: &str) -> Option<CacheEntry> {
        match self.slots.get(field).as_deref() {
            Some(Slot::Settled(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn read(&self, field: &str) -> FieldState {
        match self.load(field) {
            Some(entry) => match entry.error {
                Some(e) => FieldState::Failed(e),
                None => FieldState::Ready(entry.data),
            },
            None => FieldState::Pending,
        }
    }

    pub fn is_settled(&self, field: &str) -> bool {
        matches!(self.slots.get(field).as_deref(), Some(Slot::Settled(_)))
    }

    /// Stores a value unconditionally. Used to inject static fields when a
    /// resource is built; everything else goes through claim/settle.
    pub fn store(&self, field: impl Into<String>, entry: CacheEntry) {
        self.slots.insert(field.into(), Slot::Settled(entry));
    }

    /// Atomically claims `field` for computation (load-or-store).
    pub fn claim(&self, field: &str) -> Claim {
        match self.slots.entry(field.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Computing { rerun: false });
                Claim::Acquired
            }
            Entry::Occupied(mut slot) => {
                let claim = match slot.get() {
                    Slot::Settled(entry) => return Claim::Settled(entry.clone()),
                    Slot::Computing { .. } => Claim::InFlight,
                    Slot::Waiting => Claim::Acquired,
                };
                // an in-flight computation is asked to run once more
                let rerun = claim == Claim::InFlight;
                slot.insert(Slot::Computing { rerun });
                claim
            }
        }
    }

    /// Releases a claim whose computation came back not ready.
    pub fn park(&self, field: &str) -> Park {
        let Some(mut slot) = self.slots.get_mut(field) else {
            return Park::Parked;
        };
        let (next, park) = match &*slot {
            Slot::Computing { rerun: true } => (Slot::Computing { rerun: false }, Park::Retry),
            Slot::Computing { rerun: false } => (Slot::Waiting, Park::Parked),
            Slot::Settled(_) => return Park::Settled,
            Slot::Waiting => return Park::Parked,
        };
        *slot = next;
        park
    }

    /// Drops a claim without a result, leaving the field claimable again.
    pub fn release(&self, field: &str) {
        if let Some(mut slot) = self.slots.get_mut(field) {
            if matches!(*slot, Slot::Computing { .. }) {
                *slot = Slot::Waiting;
            }
        }
    }

    /// Settles `field` unless it already settled. Returns whether this call
    /// stored the entry.
    pub fn settle(&self, field: &str, entry: CacheEntry) -> bool {
        match self.slots.entry(field.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Settled(entry));
                true
            }
            Entry::Occupied(mut slot) => {
                if matches!(slot.get(), Slot::Settled(_)) {
                    return false;
                }
                slot.insert(Slot::Settled(entry));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

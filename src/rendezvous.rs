//! Single-assignment rendezvous cell
//!
//! A `RendezvousCell` suspends readers until exactly one writer supplies its
//! value, then releases every reader with that value. It is the unit of
//! virtual-content delivery: the HTTP pull boundary waits on a cell while the
//! client is asked (challenged) to supply the content.
//!
//! # States
//!
//! ```text
//!            set(v)
//!   Empty ───────────► Filled(v)      (terminal, immutable)
//!     │
//!     │ cancel() / session close
//!     ▼
//!   Cancelled                         (terminal, waiters get Cancelled)
//! ```
//!
//! Built on `tokio::sync::watch` so any number of waiters observe the single
//! assignment, including waiters that subscribe after it happened.

use tokio::sync::watch;

use crate::error::{DocBridgeError, Result};

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Filled(String),
    Cancelled,
}

/// Blocking single-assignment value shared between a writer and many readers
#[derive(Debug)]
pub struct RendezvousCell {
    /// Key this cell was registered under, for diagnostics
    key: String,
    slot: watch::Sender<Slot>,
}

impl RendezvousCell {
    /// Create an empty cell
    pub fn new(key: impl Into<String>) -> Self {
        let (slot, _) = watch::channel(Slot::Empty);
        Self {
            key: key.into(),
            slot,
        }
    }

    /// Create a cell that is already filled with `value`
    pub fn filled(key: impl Into<String>, value: String) -> Self {
        let (slot, _) = watch::channel(Slot::Filled(value));
        Self {
            key: key.into(),
            slot,
        }
    }

    /// Key this cell was registered under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the value.
    ///
    /// Returns immediately if the cell is already filled. Returns
    /// `Cancelled` if the cell was cancelled before a value arrived.
    pub async fn get(&self) -> Result<String> {
        let mut rx = self.slot.subscribe();
        let slot = rx
            .wait_for(|slot| !matches!(slot, Slot::Empty))
            .await
            .map_err(|_| DocBridgeError::Cancelled)?;
        match &*slot {
            Slot::Filled(value) => Ok(value.clone()),
            _ => Err(DocBridgeError::Cancelled),
        }
    }

    /// Current value without waiting
    pub fn try_get(&self) -> Option<String> {
        match &*self.slot.borrow() {
            Slot::Filled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Assign the value and release every waiter.
    ///
    /// A cell is assigned at most once. A second `set` fails with
    /// `AlreadySet` and leaves the first value in place.
    pub fn set(&self, value: String) -> Result<()> {
        let mut outcome = Ok(());
        self.slot.send_if_modified(|slot| match slot {
            Slot::Empty => {
                *slot = Slot::Filled(value);
                true
            }
            Slot::Filled(_) => {
                outcome = Err(DocBridgeError::AlreadySet {
                    key: self.key.clone(),
                });
                false
            }
            Slot::Cancelled => {
                outcome = Err(DocBridgeError::Cancelled);
                false
            }
        });
        outcome
    }

    /// Assign the value, or accept an identical value that is already there.
    ///
    /// Returns true if this call assigned the value. Content-addressed keys
    /// make a repeated push of the same bytes legal; a different value is
    /// still rejected with `AlreadySet`.
    pub fn set_or_confirm(&self, value: String) -> Result<bool> {
        let mut outcome = Ok(false);
        self.slot.send_if_modified(|slot| match slot {
            Slot::Empty => {
                *slot = Slot::Filled(value);
                outcome = Ok(true);
                true
            }
            Slot::Filled(existing) => {
                if *existing != value {
                    outcome = Err(DocBridgeError::AlreadySet {
                        key: self.key.clone(),
                    });
                }
                false
            }
            Slot::Cancelled => {
                outcome = Err(DocBridgeError::Cancelled);
                false
            }
        });
        outcome
    }

    /// Release all waiters with `Cancelled` if no value was assigned yet.
    ///
    /// Returns true if this call moved the cell out of the empty state.
    pub fn cancel(&self) -> bool {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Empty) {
                *slot = Slot::Cancelled;
                true
            } else {
                false
            }
        })
    }

    /// Whether a value has been assigned
    pub fn is_set(&self) -> bool {
        matches!(&*self.slot.borrow(), Slot::Filled(_))
    }

    /// Whether the cell is still waiting for a value
    pub fn is_pending(&self) -> bool {
        matches!(&*self.slot.borrow(), Slot::Empty)
    }

    /// Number of readers currently waiting
    pub fn waiters(&self) -> usize {
        self.slot.receiver_count()
    }
}

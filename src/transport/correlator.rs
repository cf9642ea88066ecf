//! Command id allocation and reply correlation.
//!
//! One correlator exists per connection epoch. Ids are strictly increasing
//! within the epoch and never reused; each pending entry is resolved at most
//! once, by whichever comes first of:
//!
//! | Event | Outcome for the caller |
//! |-------|------------------------|
//! | `result` / `pong` with the id | reply value or [`Error::Remote`] |
//! | caller timeout or drop | entry removed, later reply ignored |
//! | epoch ends | [`Error::Disconnected`] |

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, ConnectionId};

// ============================================================================
// Types
// ============================================================================

/// Channel half receiving a command's outcome.
pub type ReplyReceiver = oneshot::Receiver<Result<Value>>;

/// One outstanding command.
struct PendingCommand {
    tx: oneshot::Sender<Result<Value>>,
    command_type: String,
    issued_at: Instant,
}

/// Mutable correlator state, guarded as a whole.
struct State {
    next_id: u64,
    pending: FxHashMap<CommandId, PendingCommand>,
    closed: bool,
}

// ============================================================================
// CommandCorrelator
// ============================================================================

/// Table of commands awaiting replies on one connection epoch.
pub struct CommandCorrelator {
    connection: ConnectionId,
    max_pending: usize,
    state: Mutex<State>,
}

impl CommandCorrelator {
    /// Creates an empty table. The first id handed out is 1.
    #[must_use]
    pub fn new(connection: ConnectionId, max_pending: usize) -> Self {
        Self {
            connection,
            max_pending,
            state: Mutex::new(State {
                next_id: 1,
                pending: FxHashMap::default(),
                closed: false,
            }),
        }
    }

    /// Allocates an id without tracking a reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] once the epoch has ended.
    pub fn allocate(&self) -> Result<CommandId> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Disconnected);
        }
        Ok(Self::take_id(&mut state))
    }

    /// Allocates an id and registers a waiter for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::Disconnected`] once the epoch has ended
    /// - [`Error::TooManyPending`] if the table is full
    pub fn register(&self, command_type: &str) -> Result<(CommandId, ReplyReceiver)> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(Error::Disconnected);
        }
        if state.pending.len() >= self.max_pending {
            warn!(
                connection = %self.connection,
                pending = state.pending.len(),
                max = self.max_pending,
                "Too many pending commands"
            );
            return Err(Error::TooManyPending {
                max: self.max_pending,
            });
        }

        let id = Self::take_id(&mut state);
        let (tx, rx) = oneshot::channel();
        state.pending.insert(
            id,
            PendingCommand {
                tx,
                command_type: command_type.to_string(),
                issued_at: Instant::now(),
            },
        );

        trace!(connection = %self.connection, %id, command = command_type, "Registered command");
        Ok((id, rx))
    }

    /// Resolves the waiter for `id`.
    ///
    /// Returns `false` if nothing was waiting: the caller timed out, was
    /// cancelled, or the id was never issued on this epoch.
    pub fn complete(&self, id: CommandId, outcome: Result<Value>) -> bool {
        let Some(pending) = self.state.lock().pending.remove(&id) else {
            trace!(connection = %self.connection, %id, "Dropping reply with no waiter");
            return false;
        };

        trace!(
            connection = %self.connection,
            %id,
            command = %pending.command_type,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "Reply received"
        );

        // The caller may have given up between removal and send.
        let _ = pending.tx.send(outcome);
        true
    }

    /// Removes the waiter for `id` without resolving it.
    pub fn cancel(&self, id: CommandId) -> bool {
        let removed = self.state.lock().pending.remove(&id).is_some();
        if removed {
            trace!(connection = %self.connection, %id, "Cancelled pending command");
        }
        removed
    }

    /// Fails every waiter with [`Error::Disconnected`] and closes the table.
    ///
    /// Returns the number of waiters failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.tx.send(Err(Error::Disconnected));
        }

        if count > 0 {
            debug!(connection = %self.connection, count, "Failed pending commands");
        }
        count
    }

    /// Number of commands awaiting replies.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns `true` once [`fail_all`](Self::fail_all) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn take_id(state: &mut State) -> CommandId {
        let id = CommandId::new(state.next_id);
        state.next_id += 1;
        id
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Live conversation tracking and cooperative cancellation

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::ConversationId;

/// Per-conversation cancellation flag. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[derive(Debug)]
struct ConversationEntry {
    handle: CancellationHandle,
    serial: u64,
    created_at: Instant,
}

/// Snapshot of a live conversation
#[derive(Debug, Clone)]
pub struct LiveConversation {
    pub handle: CancellationHandle,
    pub created_at: Instant,
    serial: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    conversations: HashMap<ConversationId, ConversationEntry>,
    next_serial: u64,
}

/// Tracks live conversations and their cancellation handles
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    state: Mutex<RegistryState>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new conversation and return its handle.
    ///
    /// Re-registering a live id cancels the previous handle.
    pub fn register(&self, id: ConversationId) -> LiveConversation {
        let mut state = self.state.lock();
        let serial = state.next_serial;
        state.next_serial += 1;

        let entry = ConversationEntry {
            handle: CancellationHandle::new(),
            serial,
            created_at: Instant::now(),
        };
        let live = LiveConversation {
            handle: entry.handle.clone(),
            created_at: entry.created_at,
            serial,
        };

        if let Some(previous) = state.conversations.insert(id.clone(), entry) {
            previous.handle.cancel();
            debug!("Conversation {} re-registered, previous run cancelled", id);
        }
        debug!(
            "Registered conversation {} ({} live)",
            id,
            state.conversations.len()
        );
        live
    }

    /// Cancel and forget a conversation. Unknown ids are a no-op.
    pub fn cancel(&self, id: &ConversationId) -> bool {
        let removed = self.state.lock().conversations.remove(id);
        match removed {
            Some(entry) => {
                entry.handle.cancel();
                info!(
                    "Cancelled conversation {} after {:?}",
                    id,
                    entry.created_at.elapsed()
                );
                true
            }
            None => {
                debug!("Cancel for unknown conversation {} ignored", id);
                false
            }
        }
    }

    /// Forget a conversation that ran to completion, provided `live` is still
    /// the registered run for that id.
    pub fn finish(&self, id: &ConversationId, live: &LiveConversation) -> bool {
        let mut state = self.state.lock();
        match state.conversations.get(id) {
            Some(entry) if entry.serial == live.serial => {
                state.conversations.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, id: &ConversationId) -> Option<CancellationHandle> {
        self.state
            .lock()
            .conversations
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

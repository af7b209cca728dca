//! Decides which conversation is allowed to speak.
//!
//! A new utterance supersedes everything in flight: tracked conversations are
//! cancelled on the origin and their reassembly buffers dropped before the new
//! conversation exists, the speech backlog is cleared, and the synthesis sink
//! is swapped out so nothing queued for the old answer can still be heard.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reassembly::ReassemblyBuffer;
use super::sink::{SinkFactory, SinkSlot};
use super::speech_queue::SpeechQueue;
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::protocol::{CancelMessage, ConversationId, FragmentMessage, UtteranceMessage};

/// Consumer → origin half of the fragment channel.
///
/// Implementations report delivery failures as [`Error::Transport`](crate::Error::Transport).
#[async_trait]
pub trait OriginLink: Send + Sync {
    async fn send_utterance(&self, utterance: UtteranceMessage) -> Result<()>;

    async fn send_cancel(&self, cancel: CancelMessage) -> Result<()>;
}

/// Owns reassembly state and the speech queue for the consumer side
pub struct ConversationController {
    config: ControllerConfig,
    link: Arc<dyn OriginLink>,
    factory: Arc<dyn SinkFactory>,
    slot: Arc<SinkSlot>,
    queue: SpeechQueue,
    buffers: HashMap<ConversationId, ReassemblyBuffer>,
    active: Option<ConversationId>,
    sink_task: Option<JoinHandle<bool>>,
}

impl ConversationController {
    pub fn new(
        config: ControllerConfig,
        link: Arc<dyn OriginLink>,
        factory: Arc<dyn SinkFactory>,
    ) -> Self {
        let slot = Arc::new(SinkSlot::new());
        let queue = SpeechQueue::new(config.speech.clone(), slot.clone());
        Self {
            config,
            link,
            factory,
            slot,
            queue,
            buffers: HashMap::new(),
            active: None,
            sink_task: None,
        }
    }

    /// Start a new conversation for a finalized user utterance.
    ///
    /// Returns the new conversation id, or `None` for a blank utterance. A
    /// dispatch failure is returned after local state has already moved on to
    /// the new conversation.
    pub async fn on_utterance(&mut self, text: &str) -> Result<Option<ConversationId>> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring blank utterance");
            return Ok(None);
        }

        let superseded: Vec<ConversationId> = self.buffers.drain().map(|(id, _)| id).collect();
        self.active = None;
        self.queue.reset();

        let conversation_id = ConversationId::generate();
        self.buffers.insert(
            conversation_id.clone(),
            ReassemblyBuffer::new(conversation_id.clone()),
        );
        self.active = Some(conversation_id.clone());

        let (ticket, previous) = self.slot.revoke();

        for id in superseded {
            debug!("Superseding conversation {}", id);
            if let Err(e) = self.link.send_cancel(CancelMessage { conversation_id: id }).await {
                warn!("Failed to send cancellation: {}", e);
            }
        }

        let utterance =
            UtteranceMessage::new(text, conversation_id.clone(), self.config.max_utterance_chars);
        info!(
            "Starting conversation {} ({} chars)",
            conversation_id,
            utterance.message.chars().count()
        );
        let dispatched = self.link.send_utterance(utterance).await;

        let slot = self.slot.clone();
        let factory = self.factory.clone();
        self.sink_task = Some(tokio::spawn(async move {
            slot.recreate(ticket, previous, factory.as_ref()).await
        }));

        match dispatched {
            Ok(()) => Ok(Some(conversation_id)),
            Err(e) => {
                warn!("Failed to dispatch utterance {}: {}", conversation_id, e);
                Err(e)
            }
        }
    }

    /// Route one fragment from the origin. Returns whether it was accepted.
    ///
    /// Fragments for conversations that are no longer tracked are dropped.
    pub fn on_fragment(&mut self, fragment: FragmentMessage) -> bool {
        let conversation_id = fragment.conversation_id.clone();
        let Some(buffer) = self.buffers.get_mut(&conversation_id) else {
            debug!(
                "Dropping fragment {}#{} for inactive conversation",
                conversation_id, fragment.index
            );
            return false;
        };

        let release = buffer.accept(fragment);
        for sentence in release.sentences {
            if sentence.trim().is_empty() {
                continue;
            }
            self.queue.push(sentence);
        }

        if release.complete {
            self.buffers.remove(&conversation_id);
            if self.active.as_ref() == Some(&conversation_id) {
                self.active = None;
            }
            info!("Conversation {} fully released", conversation_id);
        }
        true
    }

    /// Wait for the most recent sink swap to settle. Returns whether it
    /// installed a sink.
    pub async fn wait_for_sink(&mut self) -> bool {
        match self.sink_task.take() {
            Some(task) => task.await.unwrap_or(false),
            None => self.slot.is_available(),
        }
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_tracked(&self, id: &ConversationId) -> bool {
        self.buffers.contains_key(id)
    }

    pub fn speech_queue(&self) -> &SpeechQueue {
        &self.queue
    }

    pub fn sink_slot(&self) -> &Arc<SinkSlot> {
        &self.slot
    }
}

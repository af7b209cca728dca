//! Single-flight FIFO feeding released sentences to the synthesis sink.
//!
//! At most one consumption task runs at a time. It is spawned by the push
//! that finds the queue idle and exits when the backlog is empty, so a push
//! into a busy queue only enqueues. Each sentence gets one bounded synthesis
//! attempt; failures and timeouts drop the item and the loop moves on.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::sink::{SinkSlot, SynthesisSink};
use crate::config::SpeechQueueConfig;

#[derive(Debug)]
struct QueuedSentence {
    epoch: u64,
    text: String,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueuedSentence>,
    running: bool,
    epoch: u64,
}

struct Shared {
    config: SpeechQueueConfig,
    slot: Arc<SinkSlot>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Ordered, single-flight speech queue
#[derive(Clone)]
pub struct SpeechQueue {
    shared: Arc<Shared>,
}

impl SpeechQueue {
    pub fn new(config: SpeechQueueConfig, slot: Arc<SinkSlot>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                slot,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Enqueue a sentence, starting the consumption loop if it is idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn push(&self, sentence: impl Into<String>) {
        let mut state = self.shared.state.lock();
        let epoch = state.epoch;
        state.items.push_back(QueuedSentence {
            epoch,
            text: sentence.into(),
        });
        if state.running {
            return;
        }
        state.running = true;
        drop(state);

        let shared = self.shared.clone();
        tokio::spawn(async move { shared.consume().await });
    }

    /// Drop the backlog. Items already popped but not yet submitted are
    /// discarded as well.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.items.len();
        state.items.clear();
        state.epoch += 1;
        if dropped > 0 {
            debug!("Speech queue reset, {} sentences dropped", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Wait until the consumption loop has drained the queue
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

impl Shared {
    async fn consume(&self) {
        loop {
            let item = {
                let mut state = self.state.lock();
                match state.items.pop_front() {
                    Some(item) => item,
                    None => {
                        state.running = false;
                        break;
                    }
                }
            };
            self.speak(item).await;
        }
        self.idle.notify_waiters();
    }

    fn is_stale(&self, item: &QueuedSentence) -> bool {
        self.state.lock().epoch != item.epoch
    }

    async fn speak(&self, item: QueuedSentence) {
        let sink = loop {
            if self.is_stale(&item) {
                debug!("Dropping sentence from a reset queue");
                return;
            }
            if let Some(sink) = self.slot.current() {
                break sink;
            }
            sleep(self.config.sink_poll_interval()).await;
        };
        self.speak_on(sink, item).await;
    }

    async fn speak_on(&self, sink: Arc<dyn SynthesisSink>, item: QueuedSentence) {
        // A reset can land between fetching the sink and starting playback.
        // Past this check, the old sink's `close` is what silences it.
        if self.is_stale(&item) {
            debug!("Dropping sentence from a reset queue");
            return;
        }

        debug!("Speaking: {}", item.text);
        match timeout(self.config.synthesis_timeout(), sink.speak(&item.text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Synthesis failed, skipping sentence: {}", e),
            Err(_) => warn!(
                "Synthesis timed out after {:?}, skipping sentence",
                self.config.synthesis_timeout()
            ),
        }
    }
}

//! Synthesis sink abstraction and the slot holding the current sink.
//!
//! The slot implements close-then-recreate as a scoped acquisition:
//! [`SinkSlot::revoke`] invalidates the current sink immediately and hands
//! out a [`SinkTicket`]; a sink created later is only installed if no newer
//! revocation happened in the meantime.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;

/// Text-to-speech output that plays one sentence at a time
#[async_trait]
pub trait SynthesisSink: Send + Sync {
    /// Synthesize and play `sentence`, resolving when playback finishes
    async fn speak(&self, sentence: &str) -> Result<()>;

    /// Stop playback and release the underlying device.
    ///
    /// Must cut off any `speak` call still in progress; a superseded
    /// sentence may already be playing when the sink is revoked.
    async fn close(&self) -> Result<()>;
}

/// Creates fresh sinks after a teardown
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn SynthesisSink>>;
}

/// Proof of a revocation; only the newest ticket may install a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkTicket {
    generation: u64,
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    current: Option<Arc<dyn SynthesisSink>>,
}

/// Holder of the single current synthesis sink
#[derive(Default)]
pub struct SinkSlot {
    state: Mutex<SlotState>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sink to speak through, if one is installed
    pub fn current(&self) -> Option<Arc<dyn SynthesisSink>> {
        self.state.lock().current.clone()
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Invalidate the current sink and return it for closing.
    ///
    /// Any ticket handed out before this call becomes stale.
    pub fn revoke(&self) -> (SinkTicket, Option<Arc<dyn SynthesisSink>>) {
        let mut state = self.state.lock();
        state.generation += 1;
        let ticket = SinkTicket {
            generation: state.generation,
        };
        (ticket, state.current.take())
    }

    /// Install `sink` if `ticket` is still the newest revocation.
    ///
    /// On a stale ticket the sink is handed back so the caller can close it.
    pub fn install(
        &self,
        ticket: SinkTicket,
        sink: Arc<dyn SynthesisSink>,
    ) -> std::result::Result<(), Arc<dyn SynthesisSink>> {
        let mut state = self.state.lock();
        if state.generation != ticket.generation {
            return Err(sink);
        }
        state.current = Some(sink);
        Ok(())
    }

    /// Close `previous` (if any), create a new sink and install it under `ticket`.
    ///
    /// A sink created for a superseded ticket is closed instead of installed.
    pub async fn recreate(
        &self,
        ticket: SinkTicket,
        previous: Option<Arc<dyn SynthesisSink>>,
        factory: &dyn SinkFactory,
    ) -> bool {
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                warn!("Closing previous synthesis sink failed: {}", e);
            }
        }

        let sink = match factory.create().await {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Recreating synthesis sink failed: {}", e);
                return false;
            }
        };

        match self.install(ticket, sink) {
            Ok(()) => {
                debug!("Synthesis sink installed");
                true
            }
            Err(stale) => {
                debug!("Discarding synthesis sink for a superseded conversation");
                if let Err(e) = stale.close().await {
                    warn!("Closing superseded synthesis sink failed: {}", e);
                }
                false
            }
        }
    }
}

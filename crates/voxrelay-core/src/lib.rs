//! Voxrelay Core - streamed answers to ordered, interruptible speech
//!
//! This crate holds both halves of the fragment pipeline.
//!
//! # Architecture
//!
//! - **Origin** ([`origin`]): a [`SegmentationEngine`] cuts a model's text
//!   delta stream into indexed sentence fragments, one conversation at a
//!   time, while a [`ConversationRegistry`] tracks cancellation handles.
//! - **Consumer** ([`consumer`]): a [`ConversationController`] routes
//!   fragments into per-conversation [`ReassemblyBuffer`]s, which release
//!   sentences strictly by index into a single-flight [`SpeechQueue`].
//!
//! The two sides only share the wire types in [`protocol`].
//!
//! # Example
//!
//! ```ignore
//! use voxrelay_core::{ConversationRegistry, SegmentationEngine, SegmenterConfig};
//!
//! let registry = Arc::new(ConversationRegistry::new());
//! let engine = SegmentationEngine::new(SegmenterConfig::default(), registry.clone());
//!
//! let live = registry.register(conversation_id.clone());
//! let outcome = engine.run(conversation_id, live, deltas, &fragment_tx).await;
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod history;
pub mod origin;
pub mod protocol;

pub use config::{
    ControllerConfig, HistoryConfig, ModelConfig, SegmenterConfig, ServerConfig,
    SpeechQueueConfig, SpeechTokenConfig,
};
pub use consumer::{
    ConversationController, OriginLink, ReassemblyBuffer, Release, SinkFactory, SinkSlot,
    SinkTicket, SpeechQueue, SynthesisSink,
};
pub use error::{Error, Result};
pub use history::{InteractionLog, InteractionRecord};
pub use origin::{
    CancellationHandle, ConversationRegistry, LiveConversation, Segment, SegmentationEngine,
    SegmentationOutcome, Segmenter,
};
pub use protocol::{
    CancelMessage, ClientEvent, ConversationId, FragmentMessage, ServerEvent, UtteranceMessage,
};

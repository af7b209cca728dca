//! Application state management

use std::sync::Arc;
use voxrelay_core::{ConversationRegistry, InteractionLog, SegmentationEngine};

use crate::llm::ChatModel;
use crate::settings::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConversationRegistry>,
    pub engine: SegmentationEngine,
    pub model: Arc<dyn ChatModel>,
    pub history: InteractionLog,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings, model: Arc<dyn ChatModel>) -> Self {
        let registry = Arc::new(ConversationRegistry::new());
        let engine = SegmentationEngine::new(settings.segmenter.clone(), registry.clone());
        let history = InteractionLog::new(settings.history.path.clone());

        Self {
            settings: Arc::new(settings),
            registry,
            engine,
            model,
            history,
            http: reqwest::Client::new(),
        }
    }
}

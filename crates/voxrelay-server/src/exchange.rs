//! One question/answer exchange: model call, segmentation, interaction log

use futures::stream;
use tokio::sync::mpsc;
use tracing::{info, warn};
use voxrelay_core::protocol::truncate_chars;
use voxrelay_core::{
    FragmentMessage, InteractionRecord, LiveConversation, SegmentationOutcome, UtteranceMessage,
};

use crate::llm::DeltaStream;
use crate::state::AppState;

/// Answer `utterance`, sending its fragments on `out`.
///
/// `live` must come from registering the conversation before this task is
/// spawned, so an `abort` arriving in between is not lost.
pub async fn run_exchange(
    state: AppState,
    utterance: UtteranceMessage,
    live: LiveConversation,
    out: mpsc::Sender<FragmentMessage>,
) -> SegmentationOutcome {
    let UtteranceMessage {
        message,
        conversation_id,
    } = utterance;
    let question = truncate_chars(&message, state.settings.server.max_utterance_chars).to_string();
    info!(
        "Conversation {} started ({} chars)",
        conversation_id,
        question.chars().count()
    );

    let opened = tokio::select! {
        biased;
        _ = live.handle.cancelled() => None,
        opened = state.model.stream_answer(&question) => Some(opened),
    };
    let deltas: DeltaStream = match opened {
        None => {
            state.registry.finish(&conversation_id, &live);
            info!("Conversation {} cancelled before the model answered", conversation_id);
            return SegmentationOutcome::Cancelled { fragments: 0 };
        }
        Some(Ok(deltas)) => deltas,
        Some(Err(e)) => Box::pin(stream::once(async move { Err(e) })),
    };

    let outcome = state
        .engine
        .run(conversation_id.clone(), live, deltas, &out)
        .await;

    if let SegmentationOutcome::Completed { answer, .. } = &outcome {
        let record = InteractionRecord::new(question, answer.clone());
        if let Err(e) = state.history.append(&record).await {
            warn!(
                "Failed to record interaction for {}: {}",
                conversation_id, e
            );
        }
    }
    outcome
}

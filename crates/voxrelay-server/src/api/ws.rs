//! Fragment channel over WebSocket
//!
//! `GET /ws` upgrades to a text WebSocket carrying JSON envelopes:
//!
//! | Direction | Envelope |
//! |---|---|
//! | Client -> Server | `{"event":"message","data":{"message":..,"conversationId":..}}` |
//! | Client -> Server | `{"event":"abort","data":{"conversationId":..}}` |
//! | Server -> Client | `{"event":"message","data":{"sentence":..,"conversationId":..,"index":..,"last":..}}` |
//!
//! Each utterance runs as its own task; fragments of concurrent
//! conversations interleave on the socket and are told apart by id.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxrelay_core::{ClientEvent, ConversationId, FragmentMessage, ServerEvent};

use crate::exchange::run_exchange;
use crate::state::AppState;

const FRAGMENT_BUFFER: usize = 64;

/// Conversations started over one connection
type Owned = Arc<Mutex<HashSet<ConversationId>>>;

pub async fn fragment_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (fragment_tx, mut fragment_rx) = mpsc::channel::<FragmentMessage>(FRAGMENT_BUFFER);
    let owned: Owned = Arc::default();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    info!("Fragment channel opened");

    let ingest_state = state.clone();
    let ingest_owned = owned.clone();
    let mut ingest = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_client_text(&ingest_state, &text, &fragment_tx, &ingest_owned);
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let mut egress = tokio::spawn(async move {
        while let Some(fragment) = fragment_rx.recv().await {
            let text = match serde_json::to_string(&ServerEvent::Message(fragment)) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode fragment: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut ingest => { egress.abort(); }
        _ = &mut egress => { ingest.abort(); }
    }

    let abandoned: Vec<ConversationId> = owned.lock().drain().collect();
    for id in &abandoned {
        state.registry.cancel(id);
    }
    info!(
        "Fragment channel closed, {} conversation(s) cancelled",
        abandoned.len()
    );
}

/// Act on one client text frame. Malformed frames are logged and dropped.
fn handle_client_text(
    state: &AppState,
    text: &str,
    out: &mpsc::Sender<FragmentMessage>,
    owned: &Owned,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed client frame: {}", e);
            return;
        }
    };

    match event {
        ClientEvent::Message(utterance) => {
            // Registered before the next frame is read, so an abort that
            // follows immediately still finds it.
            let live = state.registry.register(utterance.conversation_id.clone());
            {
                let mut owned = owned.lock();
                owned.retain(|id| state.registry.lookup(id).is_some());
                owned.insert(utterance.conversation_id.clone());
            }
            tokio::spawn(run_exchange(state.clone(), utterance, live, out.clone()));
        }
        ClientEvent::Abort(cancel) => {
            let found = state.registry.cancel(&cancel.conversation_id);
            debug!(
                "Abort for {} ({})",
                cancel.conversation_id,
                if found { "cancelled" } else { "not live" }
            );
        }
    }
}

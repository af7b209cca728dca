//! Voxrelay Server - streams LLM answers as ordered sentence fragments

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod exchange;
mod llm;
mod settings;
mod state;

use llm::OpenAiChatModel;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "voxrelay_server=debug,voxrelay_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voxrelay Server");

    // Load configuration
    let settings = settings::load_settings(std::env::args().nth(1).as_deref())?;
    info!("Chat model: {} at {}", settings.model.model, settings.model.base_url);
    info!("Interaction log: {:?}", settings.history.path);
    if settings.speech_token.credentials().is_none() {
        info!("Speech token issuance disabled (no key/region configured)");
    }

    let model = Arc::new(OpenAiChatModel::new(settings.model.clone()));
    let addr = settings.server.bind_address();
    let state = AppState::new(settings, model);

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

//! Short-lived speech-service token issuance
//!
//! The browser authenticates to the speech service with the issued token;
//! the subscription key stays on the server.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use voxrelay_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SpeechTokenResponse {
    pub token: String,
    pub region: String,
}

pub async fn speech_token(
    State(state): State<AppState>,
) -> Result<Json<SpeechTokenResponse>, ApiError> {
    let config = &state.settings.speech_token;
    let (key, region) = config.require_credentials()?;

    match issue_token(&state.http, &config.endpoint_for(region), key).await {
        Ok(token) => {
            info!("Issued speech token for region {}", region);
            Ok(Json(SpeechTokenResponse {
                token,
                region: region.to_string(),
            }))
        }
        Err(e) => {
            warn!("Speech token request failed: {}", e);
            Err(ApiError::unauthorized(
                "There was an error authorizing the speech key",
            ))
        }
    }
}

async fn issue_token(
    http: &reqwest::Client,
    endpoint: &str,
    key: &str,
) -> voxrelay_core::Result<String> {
    let response = http
        .post(endpoint)
        .header("Ocp-Apim-Subscription-Key", key)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Transport(e.to_string()))?;

    response
        .text()
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::tests::ScriptedModel;
    use crate::settings::Settings;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_with(key: Option<&str>, region: Option<&str>, endpoint: &str) -> AppState {
        let mut settings = Settings::default();
        settings.speech_token.key = key.map(str::to_string);
        settings.speech_token.region = region.map(str::to_string);
        settings.speech_token.endpoint_template = endpoint.to_string();
        AppState::new(settings, Arc::new(ScriptedModel::new(&[])))
    }

    #[tokio::test]
    async fn test_missing_credentials_is_bad_request() {
        let state = state_with(Some("secret"), None, "http://unused/{region}");
        let err = speech_token(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("speech_token.region"));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_token_is_issued() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/westeurope/issueToken"))
            .and(header("Ocp-Apim-Subscription-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("eyJ0b2tlbiJ9"))
            .mount(&server)
            .await;

        let endpoint = format!("{}/{{region}}/issueToken", server.uri());
        let state = state_with(Some("secret"), Some("westeurope"), &endpoint);
        let Json(response) = speech_token(State(state)).await.unwrap();
        assert_eq!(response.token, "eyJ0b2tlbiJ9");
        assert_eq!(response.region, "westeurope");
    }

    #[tokio::test]
    async fn test_rejected_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let endpoint = format!("{}/{{region}}/issueToken", server.uri());
        let state = state_with(Some("wrong"), Some("eastus"), &endpoint);
        let err = speech_token(State(state)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unreachable_token_service_is_transport_error() {
        let http = reqwest::Client::new();
        let err = issue_token(&http, "http://127.0.0.1:9/issueToken", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}

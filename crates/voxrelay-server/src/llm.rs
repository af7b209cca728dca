//! Streaming chat model client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint with
//! `stream: true` and turns the SSE body into a stream of text deltas.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
use tracing::debug;
use voxrelay_core::{Error, ModelConfig, Result};

/// Text deltas of one answer, in arrival order
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start answering `question`, yielding text deltas as they arrive
    async fn stream_answer(&self, question: &str) -> Result<DeltaStream>;
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn stream_answer(&self, question: &str) -> Result<DeltaStream> {
        let body = json!({
            "model": self.config.model,
            "stream": true,
            "temperature": self.config.temperature,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": question },
            ],
        });

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Model(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("HTTP {}: {}", status, detail)));
        }

        debug!("Chat completion stream opened ({})", self.config.model);
        Ok(Box::pin(sse_deltas(response.bytes_stream())))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let value: serde_json::Value = serde_json::from_str(data)?;
    if let Some(error) = value.get("error") {
        return Err(Error::Model(error.to_string()));
    }

    match value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.is_empty() => Ok(SseLine::Delta(content.to_string())),
        _ => Ok(SseLine::Skip),
    }
}

/// Split an SSE byte stream into lines and extract the content deltas.
///
/// Lines are cut on raw bytes so multi-byte characters split across network
/// chunks are reassembled before decoding.
fn sse_deltas<S>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        futures::pin_mut!(bytes);
        let mut pending: Vec<u8> = Vec::new();

        let mut done = false;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Error::Model(format!("Stream interrupted: {}", e)))?;
            pending.extend_from_slice(&chunk);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line))? {
                    SseLine::Delta(text) => {
                        yield text;
                    }
                    SseLine::Done => {
                        done = true;
                        break 'read;
                    }
                    SseLine::Skip => {}
                }
            }
        }

        // The body may end without a newline after the last event.
        if !done && !pending.is_empty() {
            if let SseLine::Delta(text) = parse_sse_line(&String::from_utf8_lossy(&pending))? {
                yield text;
            }
        }
    }
}

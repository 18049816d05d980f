//! Backend exchange client
//!
//! One exchange is one round trip: a captured utterance up, the synthesized
//! reply down. The audio path carries transcripts out-of-band in response
//! headers; the text path is a plain JSON echo for diagnostics and never
//! touches the audio pipeline.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBlob;
use crate::{Config, Error, Result};

/// Transcript metadata headers on the audio reply
const HEADER_USER_TEXT: &str = "x-user-text";
const HEADER_RESPONSE_TEXT: &str = "x-response-text";
const HEADER_SESSION_ID: &str = "x-session-id";
const HEADER_GOAL_ACHIEVED: &str = "x-goal-achieved";

/// Decoded result of one voice exchange
#[derive(Debug, Clone)]
pub struct ExchangeReply {
    /// MPEG reply audio body
    pub audio: Vec<u8>,
    /// Transcribed user utterance; empty if the backend sent none
    pub user_text: String,
    /// Assistant reply transcript; empty if the backend sent none
    pub response_text: String,
    /// Session id, possibly backend-assigned
    pub session_id: String,
    /// Advisory flag from the backend; no client-side effect
    pub goal_achieved: bool,
}

/// Result of one text-mode exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextReply {
    pub session_id: String,
    pub user_text: String,
    pub response_text: String,
    #[serde(default)]
    pub goal_achieved: bool,
}

/// Backend-held history for a session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub turns: usize,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// One entry of backend-held history
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub text: String,
}

/// Exchange metadata carried in response headers
///
/// Every field is optional on the wire; absent fields fall back to the empty
/// string, the request's own session id, and `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMetadata {
    pub user_text: String,
    pub response_text: String,
    pub session_id: String,
    pub goal_achieved: bool,
}

impl ReplyMetadata {
    /// Decode metadata headers, substituting defaults for absent fields
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, fallback_session_id: &str) -> Self {
        let session_id = headers
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_session_id)
            .to_string();

        let goal_achieved = headers
            .get(HEADER_GOAL_ACHIEVED)
            .and_then(|v| v.to_str().ok())
            == Some("true");

        Self {
            user_text: decode_text_header(headers, HEADER_USER_TEXT),
            response_text: decode_text_header(headers, HEADER_RESPONSE_TEXT),
            session_id,
            goal_achieved,
        }
    }
}

/// URL-decode a transcript header, falling back to the raw value when the
/// encoding is malformed and to empty when the header is absent
fn decode_text_header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned())
        })
        .unwrap_or_default()
}

/// Backend seam for the orchestrator
#[async_trait]
pub trait Backend {
    /// Send one captured utterance, receive the reply audio and transcripts
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or non-success status.
    /// Callers do not retry.
    async fn exchange_audio(&self, blob: &AudioBlob, session_id: &str) -> Result<ExchangeReply>;

    /// Text-in / text-out exchange, bypassing audio entirely
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or non-success status.
    async fn exchange_text(&self, text: &str, session_id: &str) -> Result<TextReply>;

    /// Whether the backend is reachable (any 2xx on the health endpoint)
    async fn health(&self) -> bool;

    /// Drop backend-held history for a session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on failure; callers may swallow it.
    async fn clear_session(&self, session_id: &str) -> Result<()>;

    /// Fetch backend-held history for a session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure or non-success status.
    async fn session_history(&self, session_id: &str) -> Result<SessionHistory>;
}

/// HTTP exchange client for the clinic assistant backend
pub struct ExchangeClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Backend for ExchangeClient {
    async fn exchange_audio(&self, blob: &AudioBlob, session_id: &str) -> Result<ExchangeReply> {
        tracing::debug!(
            bytes = blob.data.len(),
            mime = blob.container.mime(),
            session_id,
            "uploading capture"
        );

        let part = reqwest::multipart::Part::bytes(blob.data.clone())
            .file_name(blob.container.file_name())
            .mime_str(blob.container.mime())
            .map_err(|e| Error::Transport(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("audio", part)
            .text("session_id", session_id.to_string());

        let response = self
            .client
            .post(self.url("/api/process-audio"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "audio exchange failed");
            return Err(Error::Transport(format!("backend error {status}: {body}")));
        }

        let metadata = ReplyMetadata::from_headers(response.headers(), session_id);
        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .to_vec();

        tracing::info!(
            user_text = %metadata.user_text,
            response_text = %metadata.response_text,
            reply_bytes = audio.len(),
            "exchange complete"
        );

        Ok(ExchangeReply {
            audio,
            user_text: metadata.user_text,
            response_text: metadata.response_text,
            session_id: metadata.session_id,
            goal_achieved: metadata.goal_achieved,
        })
    }

    async fn exchange_text(&self, text: &str, session_id: &str) -> Result<TextReply> {
        tracing::debug!(session_id, "text exchange");

        let response = self
            .client
            .post(self.url("/api/process-text"))
            .json(&serde_json::json!({ "text": text, "session_id": session_id }))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("backend error {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn health(&self) -> bool {
        match self.client.get(self.url("/api/health")).send().await {
            Ok(response) => {
                let reachable = response.status().is_success();
                tracing::debug!(status = %response.status(), reachable, "health check");
                reachable
            }
            Err(e) => {
                tracing::warn!(error = %e, "backend unreachable");
                false
            }
        }
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/session/{session_id}")))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("backend error {status}")));
        }

        tracing::debug!(session_id, "backend session cleared");
        Ok(())
    }

    async fn session_history(&self, session_id: &str) -> Result<SessionHistory> {
        let response = self
            .client
            .get(self.url(&format!("/api/session/{session_id}")))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("backend error {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

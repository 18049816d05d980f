//! Shared test stubs for the orchestrator's hardware and network seams

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vocare::audio::{AudioBlob, CaptureSource, Container, Voice};
use vocare::exchange::{Backend, ExchangeReply, SessionHistory, TextReply};
use vocare::{Error, Result};

/// Scripted microphone: hands out queued blobs, tracks the open handle
#[derive(Clone, Default)]
pub struct StubCapture {
    pub deny_permission: bool,
    pub blobs: Arc<Mutex<VecDeque<Vec<u8>>>>,
    pub active: Arc<AtomicBool>,
    pub begin_calls: Arc<AtomicUsize>,
}

impl StubCapture {
    pub fn with_blobs(blobs: Vec<Vec<u8>>) -> Self {
        Self {
            blobs: Arc::new(Mutex::new(blobs.into())),
            ..Self::default()
        }
    }

    pub fn denying() -> Self {
        Self {
            deny_permission: true,
            ..Self::default()
        }
    }
}

impl CaptureSource for StubCapture {
    fn begin(&mut self) -> Result<()> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_permission {
            return Err(Error::PermissionDenied("denied by stub".to_string()));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn end(&mut self) -> Result<AudioBlob> {
        self.active.store(false, Ordering::SeqCst);
        let data = self
            .blobs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(AudioBlob {
            data,
            container: Container::Wav,
        })
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Scripted speaker: records payload sizes, honors stop while holding
#[derive(Clone)]
pub struct StubVoice {
    pub played: Arc<Mutex<Vec<usize>>>,
    pub active: Arc<AtomicBool>,
    pub cancelled: Arc<AtomicBool>,
    pub hold: Duration,
}

impl Default for StubVoice {
    fn default() -> Self {
        Self {
            played: Arc::default(),
            active: Arc::default(),
            cancelled: Arc::default(),
            hold: Duration::ZERO,
        }
    }
}

impl StubVoice {
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Voice for StubVoice {
    async fn play(&self, audio: Vec<u8>) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        self.played.lock().unwrap().push(audio.len());

        let deadline = tokio::time::Instant::now() + self.hold;
        while tokio::time::Instant::now() < deadline && !self.cancelled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        self.active.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Scripted backend: queued audio/text outcomes, switchable health
#[derive(Clone)]
pub struct StubBackend {
    pub audio_replies: Arc<Mutex<VecDeque<Result<ExchangeReply>>>>,
    pub text_replies: Arc<Mutex<VecDeque<Result<TextReply>>>>,
    pub healthy: Arc<AtomicBool>,
    pub cleared: Arc<Mutex<Vec<String>>>,
    pub audio_calls: Arc<AtomicUsize>,
    pub latency: Duration,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self {
            audio_replies: Arc::default(),
            text_replies: Arc::default(),
            healthy: Arc::new(AtomicBool::new(true)),
            cleared: Arc::default(),
            audio_calls: Arc::default(),
            latency: Duration::ZERO,
        }
    }
}

impl StubBackend {
    pub fn with_audio_replies(replies: Vec<Result<ExchangeReply>>) -> Self {
        Self {
            audio_replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    pub fn push_audio_reply(&self, reply: Result<ExchangeReply>) {
        self.audio_replies.lock().unwrap().push_back(reply);
    }
}

/// A successful reply with the given transcripts and a small audio body
pub fn reply(user_text: &str, response_text: &str) -> ExchangeReply {
    ExchangeReply {
        audio: vec![0xAA; 16],
        user_text: user_text.to_string(),
        response_text: response_text.to_string(),
        session_id: "backend-session".to_string(),
        goal_achieved: false,
    }
}

#[async_trait]
impl Backend for StubBackend {
    async fn exchange_audio(&self, _blob: &AudioBlob, _session_id: &str) -> Result<ExchangeReply> {
        self.audio_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.audio_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no scripted reply".to_string())))
    }

    async fn exchange_text(&self, _text: &str, _session_id: &str) -> Result<TextReply> {
        tokio::time::sleep(self.latency).await;
        self.text_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no scripted reply".to_string())))
    }

    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.cleared.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn session_history(&self, session_id: &str) -> Result<SessionHistory> {
        Ok(SessionHistory {
            session_id: session_id.to_string(),
            turns: 0,
            history: Vec::new(),
        })
    }
}

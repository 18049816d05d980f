//! Interaction orchestrator
//!
//! The state machine sequencing capture → exchange → transcript → playback.
//! Runs as a single cooperative event loop driven by a command channel, so
//! every transition between await points is atomic from the outside. The
//! microphone and speaker are exclusive singletons; at most one exchange is
//! in flight at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::audio::{AudioBlob, CaptureSource, Voice};
use crate::conversation::{ConversationLog, ConversationTurn};
use crate::exchange::Backend;
use crate::session::Session;
use crate::Error;

/// Fixed advisory text appended as an assistant turn when an exchange fails
pub const ERROR_ADVISORY: &str =
    "Sorry, I ran into a connection problem. Please try again.";

/// Externally observable interaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Recording,
    Transcribing,
    Thinking,
    Speaking,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Transcribing => "transcribing",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Commands accepted by the orchestrator loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Press-to-talk pressed: acquire the microphone
    CaptureStart,
    /// Press-to-talk released: finish the capture and run the exchange
    CaptureStop,
    /// Diagnostic text exchange, bypassing the audio path
    SubmitText(String),
    /// Abandon any open capture, stop playback, empty the transcript,
    /// reset to idle
    Clear,
    /// Exit the loop
    Shutdown,
}

/// Notifications emitted for a presentation layer
#[derive(Debug, Clone)]
pub enum ViewEvent {
    StatusChanged(Status),
    TurnAppended(ConversationTurn),
    LogCleared,
    OfflineChanged(bool),
    /// Blocking notice the user must act on (e.g. microphone permission)
    Notice(String),
}

/// Observable orchestrator state
#[derive(Debug)]
struct ViewState {
    status: Status,
    offline: bool,
    log: ConversationLog,
}

/// Read-only observation handle for a presentation layer
#[derive(Clone)]
pub struct ViewHandle {
    inner: Arc<RwLock<ViewState>>,
}

impl ViewHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ViewState {
                status: Status::Idle,
                offline: false,
                log: ConversationLog::new(),
            })),
        }
    }

    /// Current status value
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.read().map_or(Status::Idle, |s| s.status)
    }

    /// Whether the backend was unreachable at last probe
    #[must_use]
    pub fn offline(&self) -> bool {
        self.inner.read().map_or(false, |s| s.offline)
    }

    /// Snapshot of the transcript in order
    #[must_use]
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.inner
            .read()
            .map(|s| s.log.turns().to_vec())
            .unwrap_or_default()
    }

    /// Number of recorded turns
    #[must_use]
    pub fn transcript_len(&self) -> usize {
        self.inner.read().map_or(0, |s| s.log.len())
    }

    fn set_status(&self, status: Status) -> bool {
        self.inner.write().is_ok_and(|mut s| {
            if s.status == status {
                false
            } else {
                s.status = status;
                true
            }
        })
    }

    fn set_offline(&self, offline: bool) -> bool {
        self.inner.write().is_ok_and(|mut s| {
            if s.offline == offline {
                false
            } else {
                s.offline = offline;
                true
            }
        })
    }

    fn push_user(&self, text: &str) -> Option<ConversationTurn> {
        self.inner.write().ok().map(|mut s| s.log.push_user(text))
    }

    fn push_assistant(&self, text: &str) -> Option<ConversationTurn> {
        self.inner
            .write()
            .ok()
            .map(|mut s| s.log.push_assistant(text))
    }

    fn clear_log(&self) {
        if let Ok(mut s) = self.inner.write() {
            s.log.clear();
        }
    }
}

/// The interaction state machine
///
/// Generic over its three hardware/network seams so the sequencing logic is
/// testable without a microphone, speaker, or live backend.
pub struct Orchestrator<C, V, B> {
    session: Session,
    capture: C,
    playback: V,
    backend: B,
    view: ViewHandle,
    events: mpsc::UnboundedSender<ViewEvent>,
    error_recovery: Duration,
    /// Armed by an exchange failure; the loop auto-recovers to idle when it
    /// fires, and any state-changing action disarms it
    recover_at: Mutex<Option<Instant>>,
    /// Bumped by clear; an exchange resolving under an older generation
    /// discards its result locally
    generation: AtomicU64,
}

impl<C: CaptureSource, V: Voice, B: Backend> Orchestrator<C, V, B> {
    /// Create an orchestrator with a fresh session
    ///
    /// Returns the orchestrator, its observation handle, and the event
    /// stream for a presentation layer.
    pub fn new(
        capture: C,
        playback: V,
        backend: B,
        error_recovery: Duration,
    ) -> (Self, ViewHandle, mpsc::UnboundedReceiver<ViewEvent>) {
        let view = ViewHandle::new();
        let (events, events_rx) = mpsc::unbounded_channel();

        let orchestrator = Self {
            session: Session::new(),
            capture,
            playback,
            backend,
            view: view.clone(),
            events,
            error_recovery,
            recover_at: Mutex::new(None),
            generation: AtomicU64::new(0),
        };

        (orchestrator, view, events_rx)
    }

    /// The session id scoping this client's exchange history
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// Run the command loop until `Shutdown` or channel close
    ///
    /// Probes backend health once at startup; while the backend is offline,
    /// capture is gated off and each capture attempt re-probes once.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let offline = !self.backend.health().await;
        if self.view.set_offline(offline) {
            self.emit(ViewEvent::OfflineChanged(offline));
        }
        tracing::info!(session_id = %self.session.id(), offline, "orchestrator started");

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    tracing::debug!(?cmd, status = %self.view.status(), "command");
                    match cmd {
                        Command::Shutdown => break,
                        Command::CaptureStart => self.capture_start().await,
                        Command::CaptureStop => self.capture_stop(&mut commands).await,
                        Command::SubmitText(text) => {
                            self.submit_text(&text, &mut commands).await;
                        }
                        Command::Clear => {
                            self.abandon_capture();
                            self.clear().await;
                        }
                    }
                }
                () = tokio::time::sleep_until(
                    self.recovery_deadline().unwrap_or_else(Instant::now)
                ), if self.recovery_deadline().is_some() => {
                    self.set_recovery_deadline(None);
                    self.set_status(Status::Idle);
                    tracing::debug!("error status auto-recovered");
                }
            }
        }

        // Leave no hardware open behind us
        self.playback.stop();
        let _ = self.capture.end();
        tracing::info!("orchestrator stopped");
    }

    /// Acquire the microphone, gated to the idle state
    async fn capture_start(&mut self) {
        match self.view.status() {
            Status::Idle => {}
            // Idempotent start while already recording
            Status::Recording => return,
            // An exchange or playback is in flight; ignore to serialize
            other => {
                tracing::debug!(status = %other, "capture request ignored");
                return;
            }
        }

        if self.view.offline() {
            // One re-probe per user action, no further retries
            let offline = !self.backend.health().await;
            if self.view.set_offline(offline) {
                self.emit(ViewEvent::OfflineChanged(offline));
            }
            if offline {
                self.emit(ViewEvent::Notice("Backend is unreachable.".to_string()));
                return;
            }
        }

        match self.capture.begin() {
            Ok(()) => self.set_status(Status::Recording),
            Err(Error::PermissionDenied(reason)) => {
                tracing::warn!(%reason, "microphone permission denied");
                self.emit(ViewEvent::Notice(format!(
                    "Microphone access denied: {reason}"
                )));
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture failed to start");
                self.emit(ViewEvent::Notice(format!("Could not start capture: {e}")));
            }
        }
    }

    /// Finish the capture and, for a non-empty blob, run the exchange
    async fn capture_stop(&mut self, commands: &mut mpsc::Receiver<Command>) {
        if self.view.status() != Status::Recording {
            return;
        }

        match self.capture.end() {
            Ok(blob) if blob.is_empty() => {
                tracing::debug!("empty capture discarded");
                self.set_status(Status::Idle);
            }
            Ok(blob) => self.run_exchange(blob, commands).await,
            Err(e) => {
                // The hardware is already released; nothing to exchange
                tracing::warn!(error = %e, "capture failed");
                self.set_status(Status::Idle);
            }
        }
    }

    /// One audio exchange: upload, transcript appends, playback
    async fn run_exchange(&mut self, blob: AudioBlob, commands: &mut mpsc::Receiver<Command>) {
        let generation = self.generation.load(Ordering::SeqCst);
        self.set_status(Status::Transcribing);

        let fut = self.backend.exchange_audio(&blob, self.session.id());
        tokio::pin!(fut);
        self.set_status(Status::Thinking);

        let result = loop {
            tokio::select! {
                result = &mut fut => break result,
                cmd = commands.recv() => match cmd {
                    Some(Command::Clear) => self.clear().await,
                    // The exchange stays in flight; everything else is
                    // gated off while busy
                    Some(other) => tracing::debug!(?other, "ignored while exchanging"),
                    None => return,
                },
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            // Cleared while in flight: the call completed but its effects
            // are discarded locally
            tracing::debug!("exchange result discarded after clear");
            return;
        }

        match result {
            Ok(reply) => {
                if !reply.user_text.is_empty() {
                    self.append_user(&reply.user_text);
                }
                if !reply.response_text.is_empty() {
                    self.append_assistant(&reply.response_text);
                }

                self.set_status(Status::Speaking);
                self.speak(reply.audio, commands).await;

                if self.generation.load(Ordering::SeqCst) == generation {
                    self.set_status(Status::Idle);
                }
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Diagnostic text exchange; never touches the audio path
    async fn submit_text(&mut self, text: &str, commands: &mut mpsc::Receiver<Command>) {
        if self.view.status() != Status::Idle || text.is_empty() {
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        self.set_status(Status::Thinking);

        let fut = self.backend.exchange_text(text, self.session.id());
        tokio::pin!(fut);

        let result = loop {
            tokio::select! {
                result = &mut fut => break result,
                cmd = commands.recv() => match cmd {
                    Some(Command::Clear) => self.clear().await,
                    Some(other) => tracing::debug!(?other, "ignored while exchanging"),
                    None => return,
                },
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        match result {
            Ok(reply) => {
                if !reply.user_text.is_empty() {
                    self.append_user(&reply.user_text);
                }
                if !reply.response_text.is_empty() {
                    self.append_assistant(&reply.response_text);
                }
                self.set_status(Status::Idle);
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Play the reply audio, remaining responsive to clear
    async fn speak(&self, audio: Vec<u8>, commands: &mut mpsc::Receiver<Command>) {
        let fut = self.playback.play(audio);
        tokio::pin!(fut);

        loop {
            tokio::select! {
                () = &mut fut => break,
                cmd = commands.recv() => match cmd {
                    Some(Command::Clear) => self.clear().await,
                    Some(other) => tracing::debug!(?other, "ignored while speaking"),
                    None => break,
                },
            }
        }
    }

    /// Release an open capture and discard whatever it buffered
    ///
    /// A capture can only be open while the loop is between commands, so
    /// this runs before `clear` on the command path; the in-flight select
    /// arms never see an active microphone.
    fn abandon_capture(&mut self) {
        if !self.capture.is_active() {
            return;
        }
        match self.capture.end() {
            Ok(blob) => tracing::debug!(bytes = blob.data.len(), "recording abandoned"),
            Err(e) => tracing::warn!(error = %e, "capture release failed"),
        }
    }

    /// Unconditional local-first reset, accepted in any state
    async fn clear(&self) {
        self.playback.stop();
        self.view.clear_log();
        self.emit(ViewEvent::LogCleared);
        self.set_recovery_deadline(None);
        self.set_status(Status::Idle);
        self.generation.fetch_add(1, Ordering::SeqCst);

        // Best-effort: the transcript is already gone locally
        if let Err(e) = self.backend.clear_session(self.session.id()).await {
            tracing::warn!(error = %e, "backend session clear failed");
        }
    }

    /// Exchange failure: one synthetic assistant turn, transient error status
    fn fail(&self, error: &Error) {
        tracing::error!(%error, "exchange failed");
        self.append_assistant(ERROR_ADVISORY);
        self.set_status(Status::Error);
        self.set_recovery_deadline(Some(Instant::now() + self.error_recovery));
    }

    fn append_user(&self, text: &str) {
        if let Some(turn) = self.view.push_user(text) {
            self.emit(ViewEvent::TurnAppended(turn));
        }
    }

    fn append_assistant(&self, text: &str) {
        if let Some(turn) = self.view.push_assistant(text) {
            self.emit(ViewEvent::TurnAppended(turn));
        }
    }

    fn set_status(&self, status: Status) {
        if self.view.set_status(status) {
            self.emit(ViewEvent::StatusChanged(status));
        }
    }

    fn recovery_deadline(&self) -> Option<Instant> {
        self.recover_at.lock().map_or(None, |guard| *guard)
    }

    fn set_recovery_deadline(&self, deadline: Option<Instant>) {
        if let Ok(mut guard) = self.recover_at.lock() {
            *guard = deadline;
        }
    }

    fn emit(&self, event: ViewEvent) {
        // The receiver may be gone (headless run); that is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(Status::Idle.to_string(), "idle");
        assert_eq!(Status::Transcribing.to_string(), "transcribing");
        assert_eq!(Status::Error.to_string(), "error");
    }

    #[test]
    fn view_handle_starts_idle_and_empty() {
        let view = ViewHandle::new();

        assert_eq!(view.status(), Status::Idle);
        assert!(!view.offline());
        assert_eq!(view.transcript_len(), 0);
    }

    #[test]
    fn set_status_reports_changes_only() {
        let view = ViewHandle::new();

        assert!(view.set_status(Status::Recording));
        assert!(!view.set_status(Status::Recording));
        assert_eq!(view.status(), Status::Recording);
    }
}

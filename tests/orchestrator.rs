//! Interaction state machine tests
//!
//! Drive the orchestrator through its command channel with stubbed
//! microphone, speaker, and backend; no hardware or network involved.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use vocare::{Command, Error, Orchestrator, Role, Status, ViewEvent, ViewHandle, ERROR_ADVISORY};

mod common;
use common::{reply, StubBackend, StubCapture, StubVoice};

const RECOVERY: Duration = Duration::from_millis(3000);

struct Harness {
    tx: mpsc::Sender<Command>,
    view: ViewHandle,
    events: mpsc::UnboundedReceiver<ViewEvent>,
    handle: tokio::task::JoinHandle<()>,
}

fn start(capture: StubCapture, voice: StubVoice, backend: StubBackend) -> Harness {
    let (orchestrator, view, events) = Orchestrator::new(capture, voice, backend, RECOVERY);
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(orchestrator.run(rx));

    Harness {
        tx,
        view,
        events,
        handle,
    }
}

impl Harness {
    async fn send(&self, command: Command) {
        self.tx.send(command).await.expect("orchestrator alive");
    }

    async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown).await;
        self.handle.await.expect("run loop panicked");
    }

    fn drain_events(&mut self) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Let queued commands and timers make progress
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn one_exchange(harness: &Harness) {
    harness.send(Command::CaptureStart).await;
    settle().await;
    harness.send(Command::CaptureStop).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn successful_exchange_appends_both_turns_in_order() {
    let capture = StubCapture::with_blobs(vec![vec![1, 2, 3]]);
    let voice = StubVoice::default();
    let backend =
        StubBackend::with_audio_replies(vec![Ok(reply("Book an appointment", "Sure, when?"))]);
    let played = voice.played.clone();

    let harness = start(capture, voice, backend);
    settle().await;
    one_exchange(&harness).await;

    let transcript = harness.view.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[0].text, "Book an appointment");
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].text, "Sure, when?");
    assert!(transcript[0].timestamp <= transcript[1].timestamp);
    assert_eq!(harness.view.status(), Status::Idle);
    assert_eq!(*played.lock().unwrap(), vec![16]);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn empty_response_text_appends_only_user_turn() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let voice = StubVoice::default();
    let backend = StubBackend::with_audio_replies(vec![Ok(reply("Hello", ""))]);
    let played = voice.played.clone();

    let harness = start(capture, voice, backend);
    settle().await;
    one_exchange(&harness).await;

    let transcript = harness.view.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, Role::User);
    // Playback still runs against the returned audio body
    assert_eq!(played.lock().unwrap().len(), 1);
    assert_eq!(harness.view.status(), Status::Idle);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn log_length_matches_nonempty_text_fields() {
    let capture = StubCapture::with_blobs(vec![vec![1], vec![2], vec![3]]);
    let backend = StubBackend::with_audio_replies(vec![
        Ok(reply("a", "b")),
        Ok(reply("", "x")),
        Ok(reply("", "")),
    ]);

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;
    for _ in 0..3 {
        one_exchange(&harness).await;
    }

    assert_eq!(harness.view.transcript_len(), 3);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_failure_appends_advisory_and_auto_recovers() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let backend = StubBackend::with_audio_replies(vec![Err(Error::Transport(
        "connection refused".to_string(),
    ))]);

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;
    one_exchange(&harness).await;

    let transcript = harness.view.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, Role::Assistant);
    assert_eq!(transcript[0].text, ERROR_ADVISORY);
    assert_eq!(harness.view.status(), Status::Error);

    // Recovers to idle with no user action inside the fixed window
    tokio::time::sleep(RECOVERY + Duration::from_millis(100)).await;
    assert_eq!(harness.view.status(), Status::Idle);
    assert_eq!(harness.view.transcript_len(), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn empty_capture_is_silently_ignored() {
    let capture = StubCapture::with_blobs(vec![Vec::new()]);
    let backend = StubBackend::default();
    let calls = backend.audio_calls.clone();

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;
    one_exchange(&harness).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.view.transcript_len(), 0);
    assert_eq!(harness.view.status(), Status::Idle);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn capture_requests_are_ignored_while_exchange_in_flight() {
    let capture = StubCapture::with_blobs(vec![vec![1], vec![9]]);
    let begin_calls = capture.begin_calls.clone();
    let backend = StubBackend {
        latency: Duration::from_millis(500),
        ..StubBackend::with_audio_replies(vec![Ok(reply("hi", "hello"))])
    };

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;
    harness.send(Command::CaptureStart).await;
    settle().await;
    harness.send(Command::CaptureStop).await;
    settle().await;

    assert_eq!(harness.view.status(), Status::Thinking);

    // A new capture while busy is dropped without side effects
    harness.send(Command::CaptureStart).await;
    settle().await;
    assert_eq!(begin_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.view.transcript_len(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(harness.view.status(), Status::Idle);
    assert_eq!(harness.view.transcript_len(), 2);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clear_on_empty_log_is_noop_and_resets_status() {
    let backend = StubBackend::default();
    let cleared = backend.cleared.clone();

    let harness = start(StubCapture::default(), StubVoice::default(), backend);
    settle().await;
    harness.send(Command::Clear).await;
    settle().await;

    assert_eq!(harness.view.transcript_len(), 0);
    assert_eq!(harness.view.status(), Status::Idle);
    // Backend notified best-effort even when nothing was logged locally
    assert_eq!(cleared.lock().unwrap().len(), 1);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clear_stops_active_playback() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let voice = StubVoice::holding(Duration::from_secs(5));
    let speaking = voice.active.clone();
    let backend = StubBackend::with_audio_replies(vec![Ok(reply("hi", "hello"))]);

    let harness = start(capture, voice, backend);
    settle().await;
    one_exchange(&harness).await;

    assert_eq!(harness.view.status(), Status::Speaking);
    assert!(speaking.load(Ordering::SeqCst));

    harness.send(Command::Clear).await;
    settle().await;

    assert!(!speaking.load(Ordering::SeqCst));
    assert_eq!(harness.view.transcript_len(), 0);
    assert_eq!(harness.view.status(), Status::Idle);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clear_during_exchange_discards_its_result() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let voice = StubVoice::default();
    let played = voice.played.clone();
    let backend = StubBackend {
        latency: Duration::from_millis(500),
        ..StubBackend::with_audio_replies(vec![Ok(reply("hi", "hello"))])
    };
    let calls = backend.audio_calls.clone();

    let harness = start(capture, voice, backend);
    settle().await;
    harness.send(Command::CaptureStart).await;
    settle().await;
    harness.send(Command::CaptureStop).await;
    settle().await;
    harness.send(Command::Clear).await;

    // The in-flight call is not aborted, but its effects are discarded
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.view.transcript_len(), 0);
    assert!(played.lock().unwrap().is_empty());
    assert_eq!(harness.view.status(), Status::Idle);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clear_while_recording_releases_microphone_and_drops_audio() {
    let capture = StubCapture::with_blobs(vec![vec![1, 2, 3]]);
    let active = capture.active.clone();
    let backend = StubBackend::default();
    let calls = backend.audio_calls.clone();

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;
    harness.send(Command::CaptureStart).await;
    settle().await;
    assert!(active.load(Ordering::SeqCst));

    harness.send(Command::Clear).await;
    settle().await;
    assert!(!active.load(Ordering::SeqCst));
    assert_eq!(harness.view.status(), Status::Idle);

    // The button release after the clear is a no-op; the abandoned
    // audio never reaches the backend
    harness.send(Command::CaptureStop).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.view.transcript_len(), 0);
    assert!(!active.load(Ordering::SeqCst));

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn permission_denied_surfaces_notice_and_stays_idle() {
    let capture = StubCapture::denying();
    let active = capture.active.clone();

    let mut harness = start(capture, StubVoice::default(), StubBackend::default());
    settle().await;
    harness.send(Command::CaptureStart).await;
    settle().await;

    assert_eq!(harness.view.status(), Status::Idle);
    assert!(!active.load(Ordering::SeqCst));
    assert!(harness
        .drain_events()
        .iter()
        .any(|e| matches!(e, ViewEvent::Notice(_))));

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn offline_backend_gates_capture_until_reprobe_succeeds() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let begin_calls = capture.begin_calls.clone();
    let backend = StubBackend::default();
    backend.healthy.store(false, Ordering::SeqCst);
    let healthy = backend.healthy.clone();

    let harness = start(capture, StubVoice::default(), backend);
    settle().await;

    assert!(harness.view.offline());
    harness.send(Command::CaptureStart).await;
    settle().await;
    assert_eq!(begin_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.view.status(), Status::Idle);

    // Next user action re-probes once and proceeds when reachable
    healthy.store(true, Ordering::SeqCst);
    harness.send(Command::CaptureStart).await;
    settle().await;
    assert!(!harness.view.offline());
    assert_eq!(harness.view.status(), Status::Recording);

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_the_microphone() {
    let capture = StubCapture::with_blobs(vec![vec![1]]);
    let active = capture.active.clone();

    let harness = start(capture, StubVoice::default(), StubBackend::default());
    settle().await;
    harness.send(Command::CaptureStart).await;
    settle().await;
    assert!(active.load(Ordering::SeqCst));

    harness.shutdown().await;
    assert!(!active.load(Ordering::SeqCst));
}

//! Vocare - voice console client for the clinic assistant backend
//!
//! This library provides the client-side half of a voice conversation:
//! - Microphone capture into an encoded upload blob
//! - The HTTP exchange contract with the backend (audio and text paths)
//! - Reply playback
//! - The interaction state machine tying them together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Presentation                      │
//! │   console shell │ status line │ transcript view  │
//! └───────────────────────┬──────────────────────────┘
//!                         │ commands / view events
//! ┌───────────────────────▼──────────────────────────┐
//! │                 Orchestrator                      │
//! │   capture → exchange → transcript → playback     │
//! └───────────────────────┬──────────────────────────┘
//!                         │ HTTP
//! ┌───────────────────────▼──────────────────────────┐
//! │            Clinic assistant backend               │
//! │   STT │ dialogue reasoning │ TTS                 │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod exchange;
pub mod orchestrator;
pub mod session;

pub use audio::{AudioBlob, AudioCapture, AudioPlayback, CaptureSource, Container, Voice};
pub use config::Config;
pub use conversation::{ConversationLog, ConversationTurn, Role};
pub use error::{Error, Result};
pub use exchange::{Backend, ExchangeClient, ExchangeReply, ReplyMetadata, SessionHistory, TextReply};
pub use orchestrator::{Command, Orchestrator, Status, ViewEvent, ViewHandle, ERROR_ADVISORY};
pub use session::Session;

//! Audio capture, encoding, and playback

mod capture;
mod encode;
mod playback;

pub use capture::{AudioCapture, CaptureSource, SAMPLE_RATE};
pub use encode::{samples_to_wav, AudioBlob, Container};
pub use playback::{AudioPlayback, Voice};

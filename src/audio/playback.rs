//! Reply audio playback
//!
//! Plays one MPEG reply at a time on the default output device. Playback is
//! the exclusive speaker owner: starting a new one replaces any prior one,
//! and the decoded sample buffer is dropped on every exit path.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches the backend's MPEG output)
const PLAYBACK_SAMPLE_RATE: u32 = 44100;

/// Speaker seam for the orchestrator
///
/// A finished `play` means the reply is done sounding, whether it actually
/// played or failed; callers never observe a distinct playback failure.
#[async_trait]
pub trait Voice {
    /// Play an MPEG audio body to completion (or silent failure)
    async fn play(&self, audio: Vec<u8>);

    /// Stop any active playback
    fn stop(&self);
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
    /// Cancel flag of the active run; replaced per `play`
    cancel: Mutex<Arc<AtomicBool>>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device configuration exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            cancel: Mutex::new(Arc::new(AtomicBool::new(false))),
        })
    }

    /// Install a fresh cancel flag, stopping any prior run
    fn arm(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        if let Ok(mut current) = self.cancel.lock() {
            current.store(true, Ordering::Relaxed);
            *current = Arc::clone(&flag);
        }
        flag
    }
}

#[async_trait]
impl Voice for AudioPlayback {
    async fn play(&self, audio: Vec<u8>) {
        if audio.is_empty() {
            tracing::debug!("empty reply audio, nothing to play");
            return;
        }

        let samples = match decode_mp3(&audio) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "reply audio decode failed, treating as complete");
                return;
            }
        };
        drop(audio);

        let cancel = self.arm();
        let config = self.config.clone();

        let result = tokio::task::spawn_blocking(move || {
            play_samples_blocking(&config, samples, &cancel)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "playback failed, treating as complete"),
            Err(e) => tracing::warn!(error = %e, "playback task failed"),
        }
    }

    fn stop(&self) {
        if let Ok(current) = self.cancel.lock() {
            current.store(true, Ordering::Relaxed);
        }
    }
}

/// Drive an output stream until the samples run out, the cancel flag is
/// raised, or a duration-based timeout passes
fn play_samples_blocking(
    config: &StreamConfig,
    samples: Vec<f32>,
    cancel: &AtomicBool,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = config.channels as usize;
    let sample_count = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let finished = Arc::new(AtomicBool::new(false));

    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);
    let finished_cb = Arc::clone(&finished);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = position_cb.lock() else {
                    return;
                };

                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < samples_cb.len() {
                        let s = samples_cb[*pos];
                        *pos += 1;
                        s
                    } else {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) && !cancel.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    let stopped = cancel.load(Ordering::Relaxed);
    if !stopped {
        // Let the device drain its last buffer
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(samples = sample_count, stopped, "playback finished");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

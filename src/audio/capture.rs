//! Microphone capture
//!
//! Owns the exclusive microphone stream. Captured samples accumulate into
//! fixed-cadence chunks so long holds stay bounded per-append and the buffer
//! layout is ready for streaming upload later.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::encode::AudioBlob;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Microphone seam for the orchestrator
pub trait CaptureSource {
    /// Start capturing, acquiring exclusive microphone access
    ///
    /// Idempotent: calling while already active keeps the existing capture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the platform refuses access,
    /// or [`Error::Audio`] for other failures. No open handle survives a
    /// failed start.
    fn begin(&mut self) -> Result<()>;

    /// Stop capturing and return the encoded blob
    ///
    /// The hardware resource is released on every exit path. An empty
    /// capture yields an empty blob.
    ///
    /// # Errors
    ///
    /// Returns error if encoding the accumulated samples fails.
    fn end(&mut self) -> Result<AudioBlob>;

    /// Whether a capture is currently active
    fn is_active(&self) -> bool;
}

/// Sample accumulator split into cadence-sized chunks
#[derive(Debug)]
struct ChunkBuffer {
    chunk_samples: usize,
    current: Vec<f32>,
    chunks: Vec<Vec<f32>>,
}

impl ChunkBuffer {
    fn new(chunk_samples: usize) -> Self {
        Self {
            chunk_samples,
            current: Vec::with_capacity(chunk_samples),
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, data: &[f32]) {
        for &sample in data {
            self.current.push(sample);
            if self.current.len() >= self.chunk_samples {
                let full = std::mem::replace(
                    &mut self.current,
                    Vec::with_capacity(self.chunk_samples),
                );
                self.chunks.push(full);
            }
        }
    }

    /// Concatenate all chunks in order, including the partial tail
    fn drain(&mut self) -> Vec<f32> {
        let mut samples =
            Vec::with_capacity(self.chunks.len() * self.chunk_samples + self.current.len());
        for chunk in self.chunks.drain(..) {
            samples.extend(chunk);
        }
        samples.append(&mut self.current);
        samples
    }
}

/// Captures audio from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<ChunkBuffer>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device configuration exists
    pub fn new(chunk_cadence: Duration) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        #[allow(clippy::cast_possible_truncation)]
        let chunk_samples =
            ((u64::from(SAMPLE_RATE) * chunk_cadence.as_millis() as u64) / 1000).max(1) as usize;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            chunk_samples,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(ChunkBuffer::new(chunk_samples))),
            stream: None,
        })
    }
}

impl CaptureSource for AudioCapture {
    fn begin(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::PermissionDenied("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    Error::PermissionDenied("input device not available".to_string())
                }
                other => Error::Audio(other.to_string()),
            })?;

        if let Err(e) = stream.play() {
            // Stream dropped here; the device is released before we report.
            return Err(Error::Audio(e.to_string()));
        }
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn end(&mut self) -> Result<AudioBlob> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }

        let samples = self
            .buffer
            .lock()
            .map(|mut buf| buf.drain())
            .unwrap_or_default();

        tracing::debug!(samples = samples.len(), "capture drained");
        AudioBlob::encode(&samples, SAMPLE_RATE)
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

//! Capture blob encoding and container negotiation

use crate::{Error, Result};

/// Audio container for the upload blob, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Opus in WebM, the preferred upload encoding
    OpusWebm,
    /// PCM WAV, the baseline every platform can produce
    Wav,
}

impl Container {
    /// Containers in descending preference order
    const PREFERENCE: [Self; 2] = [Self::OpusWebm, Self::Wav];

    /// Pick the first container with a compiled-in encoder
    ///
    /// WAV is always encodable; Opus requires an encoder this build does not
    /// carry, so negotiation currently lands on WAV.
    #[must_use]
    pub fn negotiate() -> Self {
        Self::PREFERENCE
            .into_iter()
            .find(|c| c.is_supported())
            .unwrap_or(Self::Wav)
    }

    /// Whether an encoder for this container is available
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Wav)
    }

    /// MIME type sent with the upload
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::OpusWebm => "audio/webm",
            Self::Wav => "audio/wav",
        }
    }

    /// Suggested file name for the multipart audio field
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::OpusWebm => "recording.webm",
            Self::Wav => "recording.wav",
        }
    }
}

/// An encoded capture ready for upload
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub data: Vec<u8>,
    pub container: Container,
}

impl AudioBlob {
    /// Encode raw samples into the negotiated container
    ///
    /// An empty sample slice yields an empty blob, which callers treat as a
    /// discarded capture rather than an error.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn encode(samples: &[f32], sample_rate: u32) -> Result<Self> {
        let container = Container::negotiate();

        let data = if samples.is_empty() {
            Vec::new()
        } else {
            match container {
                Container::Wav => samples_to_wav(samples, sample_rate)?,
                Container::OpusWebm => {
                    return Err(Error::Audio("no opus encoder available".to_string()));
                }
            }
        };

        Ok(Self { data, container })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

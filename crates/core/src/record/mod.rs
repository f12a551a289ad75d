use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::{synth::AudioBuffer, Result, SpeechError};

/// Sample encoding of the written WAV file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavEncoding {
    #[default]
    Pcm16,
    Float32,
}

/// Configuration options for the output writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub encoding: WavEncoding,
    /// Write a header-only file instead of failing when the mix is empty.
    pub allow_empty: bool,
}

/// Serializes mixed buffers to mono WAV files.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    settings: RecordingSettings,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn write(&self, path: &Path, buffer: &AudioBuffer) -> Result<()> {
        if buffer.is_empty() && !self.settings.allow_empty {
            return Err(SpeechError::EmptyOutput);
        }

        write_samples(path, buffer, self.settings.encoding).map_err(|source| {
            SpeechError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;

        tracing::info!(
            path = %path.display(),
            seconds = buffer.duration(),
            sample_rate = buffer.sample_rate,
            "wrote audio"
        );
        Ok(())
    }
}

fn write_samples(
    path: &Path,
    buffer: &AudioBuffer,
    encoding: WavEncoding,
) -> std::result::Result<(), hound::Error> {
    let spec = match encoding {
        WavEncoding::Pcm16 => WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
        WavEncoding::Float32 => WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    };

    let mut writer = WavWriter::create(path, spec)?;
    match encoding {
        WavEncoding::Pcm16 => {
            for &sample in &buffer.samples {
                let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
                writer.write_sample(value)?;
            }
        }
        WavEncoding::Float32 => {
            for &sample in &buffer.samples {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()
}

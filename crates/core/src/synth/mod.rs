//! Speech synthesis boundary.
//!
//! The engine only ever sees [`ClipSynthesizer`]; the HTTP client in [`http`]
//! is one implementation and any `Fn(&SynthesisRequest) -> Result<AudioBuffer>`
//! closure is another, which keeps scheduling and mixing testable without a
//! network.

pub mod http;

use std::{io::Cursor, path::Path};

use hound::{SampleFormat, WavReader};
use serde::{Deserialize, Serialize};

use crate::{Result, SpeechError};

pub use http::HttpSynthesizer;

/// Mono sample buffer at a known sample rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Buffer of zeros lasting `seconds`, rounded to the nearest sample.
    pub fn silence(seconds: f64, sample_rate: u32) -> Self {
        let len = (seconds.max(0.0) * f64::from(sample_rate)).round() as usize;
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds. A zero sample rate yields zero.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Everything a synthesizer needs to voice one cue.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub cue_index: usize,
    pub text: &'a str,
    pub reference: Option<&'a Path>,
}

/// Turns text into audio. Implementations must be shareable across worker
/// threads because the engine may fan out one call per cue.
pub trait ClipSynthesizer: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioBuffer>;
}

impl<F> ClipSynthesizer for F
where
    F: Fn(&SynthesisRequest<'_>) -> Result<AudioBuffer> + Send + Sync,
{
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioBuffer> {
        self(request)
    }
}

/// Decodes an in-memory WAV file, averaging all channels down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader =
        WavReader::new(Cursor::new(bytes)).map_err(|err| SpeechError::Decode(err.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|err| SpeechError::Decode(err.to_string()))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|err| SpeechError::Decode(err.to_string()))?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

use serde::{Deserialize, Serialize};

use crate::{synth::AudioBuffer, timeline::Timeline, Result, SpeechError};

/// Renders a [`Timeline`] into one continuous buffer.
///
/// Clips never overlap, so every output sample is copied from at most one
/// clip and nothing is summed. Everything between clips stays silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mixer {
    /// Scale the whole mix by `1 / peak` when the peak exceeds full scale.
    pub normalize: bool,
}

impl Default for Mixer {
    fn default() -> Self {
        Self { normalize: true }
    }
}

impl Mixer {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }

    /// Sample offset for a time in seconds, rounded to the nearest index.
    pub fn sample_offset(seconds: f64, sample_rate: u32) -> usize {
        (seconds.max(0.0) * f64::from(sample_rate)).round() as usize
    }

    pub fn render(&self, timeline: &Timeline, sample_rate: u32) -> Result<AudioBuffer> {
        let clips = timeline.clips();
        if let Some(odd) = clips
            .iter()
            .find(|scheduled| scheduled.clip.audio.sample_rate != sample_rate)
        {
            return Err(SpeechError::msg(format!(
                "cue #{} is at {} Hz but the mix runs at {sample_rate} Hz",
                odd.clip.cue.index, odd.clip.audio.sample_rate
            )));
        }

        // Float noise must never move a clip onto its predecessor's tail, so
        // offsets are clamped first and the buffer is sized from the result.
        let mut floor = 0;
        let offsets: Vec<usize> = clips
            .iter()
            .map(|scheduled| {
                let offset = Self::sample_offset(scheduled.start, sample_rate).max(floor);
                floor = offset + scheduled.clip.audio.len();
                offset
            })
            .collect();

        // Rounding each start independently can land the last clip past
        // round(duration * rate); size for whichever is larger.
        let nominal_len = Self::sample_offset(timeline.duration(), sample_rate);
        let mut output = vec![0.0_f32; nominal_len.max(floor)];

        for (scheduled, &offset) in clips.iter().zip(&offsets) {
            let samples = &scheduled.clip.audio.samples;
            output[offset..offset + samples.len()].copy_from_slice(samples);
        }

        let mut mixed = AudioBuffer::new(output, sample_rate);
        if self.normalize {
            normalize_peak(&mut mixed);
        }

        tracing::debug!(
            clips = clips.len(),
            samples = mixed.len(),
            seconds = mixed.duration(),
            "rendered timeline"
        );
        Ok(mixed)
    }
}

/// Scales the buffer down so its peak sits at full scale. Buffers already
/// within range are left untouched; quiet buffers are never amplified.
pub fn normalize_peak(buffer: &mut AudioBuffer) -> f32 {
    let peak = buffer.peak();
    if peak <= 1.0 {
        return 1.0;
    }

    let gain = 1.0 / peak;
    for sample in &mut buffer.samples {
        *sample *= gain;
    }
    gain
}

//! Auto-Flow placement of synthesized clips.
//!
//! Each clip starts at its cue's nominal start unless the previous clip is
//! still playing, in which case it starts right when that clip ends (plus the
//! configured gap). The pass is greedy and never revisits a decision, so a clip
//! that overruns its window delays every clip after it and that delay is never
//! won back.

use serde::{Deserialize, Serialize};

use crate::{synth::AudioBuffer, Cue};

/// A cue together with the audio produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedClip {
    pub cue: Cue,
    pub audio: AudioBuffer,
    /// Set when the audio is silence standing in for a failed synthesis.
    pub substituted: bool,
}

impl SynthesizedClip {
    pub fn new(cue: Cue, audio: AudioBuffer) -> Self {
        Self {
            cue,
            audio,
            substituted: false,
        }
    }

    /// Silence covering the cue's nominal window.
    pub fn silent(cue: Cue, sample_rate: u32) -> Self {
        let audio = AudioBuffer::silence(cue.slot(), sample_rate);
        Self {
            cue,
            audio,
            substituted: true,
        }
    }

    pub fn duration(&self) -> f64 {
        self.audio.duration()
    }
}

/// A clip pinned to its position on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledClip {
    pub clip: SynthesizedClip,
    pub start: f64,
}

impl ScheduledClip {
    pub fn end(&self) -> f64 {
        self.start + self.clip.duration()
    }

    /// How far the clip was pushed past its nominal start.
    pub fn delay(&self) -> f64 {
        self.start - self.clip.cue.start
    }
}

/// Ordered, non-overlapping placement of all clips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    clips: Vec<ScheduledClip>,
}

impl Timeline {
    pub fn clips(&self) -> &[ScheduledClip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// End of the last clip, or zero for an empty timeline.
    pub fn duration(&self) -> f64 {
        self.clips.last().map_or(0.0, ScheduledClip::end)
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.clips.iter().map(|scheduled| scheduled.start).collect()
    }

    pub fn delays(&self) -> Vec<f64> {
        self.clips.iter().map(ScheduledClip::delay).collect()
    }

    pub fn max_delay(&self) -> f64 {
        self.clips
            .iter()
            .map(ScheduledClip::delay)
            .fold(0.0, f64::max)
    }

    pub fn into_clips(self) -> Vec<ScheduledClip> {
        self.clips
    }
}

/// Greedy single-pass scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFlow {
    /// Seconds of enforced silence after each clip.
    pub gap: f64,
}

impl AutoFlow {
    pub fn with_gap(gap: f64) -> Self {
        Self { gap: gap.max(0.0) }
    }

    /// Places clips in the order given.
    pub fn schedule(&self, clips: Vec<SynthesizedClip>) -> Timeline {
        let mut cursor = 0.0_f64;
        let mut scheduled = Vec::with_capacity(clips.len());

        for clip in clips {
            let start = clip.cue.start.max(cursor);
            let end = start + clip.duration();
            cursor = end + self.gap;

            tracing::trace!(cue = clip.cue.index, start, end, "placed clip");
            scheduled.push(ScheduledClip { clip, start });
        }

        Timeline { clips: scheduled }
    }
}

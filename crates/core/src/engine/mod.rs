//! End-to-end assembly: cues in, one mixed buffer (and file) out.
//!
//! Synthesis is the only step that may run concurrently. Results are always
//! consumed in cue order, so the scheduler sees exactly what a sequential run
//! would have produced.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::{EngineConfig, FailurePolicy},
    cue::validate_cues,
    fade::Fader,
    mixer::Mixer,
    record::{Recorder, RecordingSettings},
    subtitle,
    synth::{AudioBuffer, ClipSynthesizer, SynthesisRequest},
    timeline::{AutoFlow, SynthesizedClip, Timeline},
    trim::SilenceTrimmer,
    Cue, Result, SpeechError,
};

/// Scheduled clips plus the sample rate they share.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub timeline: Timeline,
    pub sample_rate: u32,
}

impl Assembly {
    /// Indices of cues whose audio is substituted silence.
    pub fn substituted(&self) -> Vec<usize> {
        self.timeline
            .clips()
            .iter()
            .filter(|scheduled| scheduled.clip.substituted)
            .map(|scheduled| scheduled.clip.cue.index)
            .collect()
    }
}

/// Summary of a finished render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub output: PathBuf,
    pub subtitles: Option<PathBuf>,
    pub clips: usize,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub max_delay_seconds: f64,
    pub substituted: Vec<usize>,
}

/// Turns cues into a timeline using an injected synthesizer.
#[derive(Debug)]
pub struct TimelineEngine<S> {
    config: EngineConfig,
    synthesizer: S,
    reference: Option<PathBuf>,
}

impl<S: ClipSynthesizer> TimelineEngine<S> {
    pub fn new(config: EngineConfig, synthesizer: S) -> Self {
        Self {
            config,
            synthesizer,
            reference: None,
        }
    }

    /// Reference voice forwarded with every synthesis request.
    pub fn with_reference(mut self, reference: impl Into<PathBuf>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn synthesizer(&self) -> &S {
        &self.synthesizer
    }

    /// Validates the cues and synthesizes one clip per cue, in cue order.
    ///
    /// Failed cues either abort the run or become silence of their nominal
    /// length, depending on [`EngineConfig::on_failure`].
    pub fn synthesize(&self, cues: &[Cue]) -> Result<Vec<SynthesizedClip>> {
        validate_cues(cues)?;

        let workers = self.config.workers.max(1);
        tracing::info!(cues = cues.len(), workers, "synthesizing cues");

        if workers == 1 {
            // Lazy: under `Abort` nothing after the first failure is requested.
            let outcomes = cues.iter().map(|cue| (cue, self.synthesize_one(cue)));
            return self.collect_clips(outcomes, cues.len());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|err| SpeechError::msg(format!("failed to start synthesis workers: {err}")))?;
        let outcomes: Vec<_> = pool.install(|| {
            cues.par_iter()
                .map(|cue| (cue, self.synthesize_one(cue)))
                .collect()
        });
        self.collect_clips(outcomes, cues.len())
    }

    /// Trims trailing silence and fades the edges of every synthesized clip.
    /// Substituted silence is left as is so it keeps its nominal length.
    pub fn prepare(&self, clips: &mut [SynthesizedClip]) {
        let trimmer =
            SilenceTrimmer::new(self.config.silence_threshold, self.config.tail_margin_ms);
        let fader = Fader::new(self.config.fade_duration_ms);

        for clip in clips.iter_mut().filter(|clip| !clip.substituted) {
            let removed = trimmer.trim(&mut clip.audio);
            if clip.audio.is_empty() {
                tracing::warn!(cue = clip.cue.index, "clip is silent after trimming");
            }
            fader.apply(&mut clip.audio);
            tracing::debug!(
                cue = clip.cue.index,
                trimmed_samples = removed,
                seconds = clip.duration(),
                slot = clip.cue.slot(),
                "prepared clip"
            );
        }
    }

    /// Synthesizes, prepares and schedules all cues.
    pub fn assemble(&self, cues: &[Cue]) -> Result<Assembly> {
        let mut clips = self.synthesize(cues)?;
        // `synthesize` only succeeds with at least one clip at a known rate.
        let sample_rate = clips
            .first()
            .map(|clip| clip.audio.sample_rate)
            .ok_or(SpeechError::EmptyInput)?;

        self.prepare(&mut clips);
        let timeline = AutoFlow::with_gap(self.config.gap_seconds()).schedule(clips);

        tracing::info!(
            clips = timeline.len(),
            seconds = timeline.duration(),
            max_delay = timeline.max_delay(),
            "scheduled timeline"
        );
        Ok(Assembly {
            timeline,
            sample_rate,
        })
    }

    pub fn mix(&self, assembly: &Assembly) -> Result<AudioBuffer> {
        Mixer::new(self.config.normalize).render(&assembly.timeline, assembly.sample_rate)
    }

    /// Full pipeline: writes the WAV to `output` and, when `subtitles` is
    /// given, an SRT of the clips' actual windows.
    pub fn render_to_file(
        &self,
        cues: &[Cue],
        output: &Path,
        recording: &RecordingSettings,
        subtitles: Option<&Path>,
    ) -> Result<RenderReport> {
        let assembly = self.assemble(cues)?;
        let mixed = self.mix(&assembly)?;
        Recorder::new(recording.clone()).write(output, &mixed)?;

        if let Some(path) = subtitles {
            subtitle::write_srt(path, &assembly.timeline)?;
            tracing::info!(path = %path.display(), "wrote timeline subtitles");
        }

        Ok(RenderReport {
            output: output.to_path_buf(),
            subtitles: subtitles.map(Path::to_path_buf),
            clips: assembly.timeline.len(),
            duration_seconds: mixed.duration(),
            sample_rate: assembly.sample_rate,
            max_delay_seconds: assembly.timeline.max_delay(),
            substituted: assembly.substituted(),
        })
    }

    fn synthesize_one(&self, cue: &Cue) -> std::result::Result<AudioBuffer, String> {
        let text = cue.spoken_text();
        let request = SynthesisRequest {
            cue_index: cue.index,
            text: &text,
            reference: self.reference.as_deref(),
        };

        let audio = self
            .synthesizer
            .synthesize(&request)
            .map_err(|err| err.to_string())?;
        if audio.sample_rate == 0 {
            return Err("synthesizer reported a zero sample rate".to_string());
        }
        if audio.is_empty() {
            return Err("synthesizer returned no samples".to_string());
        }
        if audio.samples.iter().any(|sample| !sample.is_finite()) {
            return Err("synthesizer returned non-finite samples".to_string());
        }

        tracing::debug!(cue = cue.index, seconds = audio.duration(), "synthesized cue");
        Ok(audio)
    }

    /// Consumes outcomes in cue order and applies the failure policy.
    ///
    /// Without a configured rate the first successful clip fixes it. Failures
    /// seen before that point are held back and filled with silence once the
    /// rate is known; if it never is, the earliest failure is returned.
    fn collect_clips<'c>(
        &self,
        outcomes: impl IntoIterator<Item = (&'c Cue, std::result::Result<AudioBuffer, String>)>,
        expected: usize,
    ) -> Result<Vec<SynthesizedClip>> {
        let mut rate = self.config.sample_rate;
        let mut slots: Vec<Option<SynthesizedClip>> = Vec::with_capacity(expected);
        let mut pending: Vec<(usize, &'c Cue, SpeechError)> = Vec::new();

        for (cue, outcome) in outcomes {
            let outcome = outcome.and_then(|audio| match rate {
                Some(rate) if audio.sample_rate != rate => Err(format!(
                    "sample rate {} Hz does not match {rate} Hz",
                    audio.sample_rate
                )),
                _ => Ok(audio),
            });

            match outcome {
                Ok(audio) => {
                    if rate.is_none() {
                        rate = Some(audio.sample_rate);
                        for (slot, failed, err) in pending.drain(..) {
                            slots[slot] = Some(substitute(failed, &err, audio.sample_rate));
                        }
                    }
                    slots.push(Some(SynthesizedClip::new(cue.clone(), audio)));
                }
                Err(reason) => {
                    let err = SpeechError::Synthesis {
                        index: cue.index,
                        text: cue.text.clone(),
                        reason,
                    };
                    if self.config.on_failure == FailurePolicy::Abort {
                        return Err(err);
                    }
                    match rate {
                        Some(rate) => slots.push(Some(substitute(cue, &err, rate))),
                        None => {
                            pending.push((slots.len(), cue, err));
                            slots.push(None);
                        }
                    }
                }
            }
        }

        if let Some((_, _, err)) = pending.into_iter().next() {
            return Err(err);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

fn substitute(cue: &Cue, err: &SpeechError, sample_rate: u32) -> SynthesizedClip {
    tracing::warn!(
        cue = cue.index,
        seconds = cue.slot(),
        error = %err,
        "substituting silence for failed cue"
    );
    SynthesizedClip::silent(cue.clone(), sample_rate)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;

    const RATE: u32 = 1000;

    /// Fake service: voices cue `i` as `seconds[i]` of constant tone.
    struct Scripted {
        seconds: Vec<f64>,
        failing: Vec<usize>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(usize, String, Option<PathBuf>)>>,
    }

    impl Scripted {
        fn new(seconds: &[f64]) -> Self {
            Self {
                seconds: seconds.to_vec(),
                failing: Vec::new(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, cues: &[usize]) -> Self {
            self.failing = cues.to_vec();
            self
        }
    }

    impl ClipSynthesizer for Scripted {
        fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<AudioBuffer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((
                request.cue_index,
                request.text.to_string(),
                request.reference.map(Path::to_path_buf),
            ));
            if self.failing.contains(&request.cue_index) {
                return Err(SpeechError::msg("service unavailable"));
            }
            let len = (self.seconds[request.cue_index] * f64::from(RATE)).round() as usize;
            Ok(AudioBuffer::new(vec![0.5; len], RATE))
        }
    }

    fn cues(windows: &[(f64, f64)]) -> Vec<Cue> {
        windows
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| Cue::new(index, start, end, format!("line {index}")))
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn overrunning_clip_delays_its_successor_only_while_needed() {
        let engine = TimelineEngine::new(EngineConfig::default(), Scripted::new(&[2.5, 1.0, 2.0]));
        let assembly = engine
            .assemble(&cues(&[(0.0, 2.0), (2.0, 4.0), (4.0, 6.0)]))
            .unwrap();

        let starts = assembly.timeline.start_times();
        assert_close(starts[0], 0.0);
        assert_close(starts[1], 2.5);
        assert_close(starts[2], 4.0);
        assert_close(assembly.timeline.duration(), 6.0);
        assert_eq!(assembly.sample_rate, RATE);

        let mixed = engine.mix(&assembly).unwrap();
        assert_eq!(mixed.len(), 6000);
    }

    #[test]
    fn short_clip_keeps_its_own_length() {
        let engine = TimelineEngine::new(EngineConfig::default(), Scripted::new(&[0.3]));
        let assembly = engine.assemble(&cues(&[(0.0, 1.0)])).unwrap();
        assert_close(assembly.timeline.duration(), 0.3);
    }

    #[test]
    fn empty_input_fails_before_synthesis() {
        let synth = Scripted::new(&[]);
        let engine = TimelineEngine::new(EngineConfig::default(), synth);
        assert!(matches!(engine.assemble(&[]), Err(SpeechError::EmptyInput)));
        assert_eq!(engine.synthesizer().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_cue_fails_before_synthesis() {
        let engine = TimelineEngine::new(EngineConfig::default(), Scripted::new(&[1.0, 1.0]));
        let err = engine
            .assemble(&cues(&[(0.0, 1.0), (3.0, 2.0)]))
            .unwrap_err();
        assert!(matches!(err, SpeechError::MalformedCue { index: 1, .. }));
        assert_eq!(engine.synthesizer().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn abort_policy_reports_failing_cue_and_stops() {
        let synth = Scripted::new(&[1.0, 1.0, 1.0]).failing(&[1]);
        let engine = TimelineEngine::new(EngineConfig::default(), synth);

        let err = engine
            .assemble(&cues(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]))
            .unwrap_err();
        match err {
            SpeechError::Synthesis {
                index,
                text,
                reason,
            } => {
                assert_eq!(index, 1);
                assert_eq!(text, "line 1");
                assert!(reason.contains("service unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.synthesizer().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn silence_policy_fills_nominal_window() {
        let config = EngineConfig {
            on_failure: FailurePolicy::Silence,
            ..Default::default()
        };
        let synth = Scripted::new(&[1.0, 1.0, 1.0]).failing(&[1]);
        let engine = TimelineEngine::new(config, synth);

        let assembly = engine
            .assemble(&cues(&[(0.0, 1.0), (1.0, 3.0), (3.0, 4.0)]))
            .unwrap();
        assert_eq!(assembly.substituted(), vec![1]);

        let substituted = &assembly.timeline.clips()[1];
        assert_close(substituted.start, 1.0);
        assert_close(substituted.end(), 3.0);
        assert!(substituted.clip.audio.samples.iter().all(|&s| s == 0.0));
        assert_close(assembly.timeline.duration(), 4.0);
    }

    #[test]
    fn silence_policy_backfills_failures_before_rate_is_known() {
        let config = EngineConfig {
            on_failure: FailurePolicy::Silence,
            ..Default::default()
        };
        let synth = Scripted::new(&[1.0, 0.5]).failing(&[0]);
        let engine = TimelineEngine::new(config, synth);

        let assembly = engine.assemble(&cues(&[(0.0, 2.0), (2.0, 3.0)])).unwrap();
        assert_eq!(assembly.substituted(), vec![0]);
        assert_eq!(assembly.timeline.clips()[0].clip.audio.len(), 2000);
        assert_close(assembly.timeline.duration(), 2.5);
    }

    #[test]
    fn silence_policy_without_any_rate_returns_first_failure() {
        let config = EngineConfig {
            on_failure: FailurePolicy::Silence,
            ..Default::default()
        };
        let synth = Scripted::new(&[1.0, 1.0]).failing(&[0, 1]);
        let engine = TimelineEngine::new(config, synth);

        let err = engine.assemble(&cues(&[(0.0, 1.0), (1.0, 2.0)])).unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { index: 0, .. }));
    }

    #[test]
    fn configured_rate_is_enforced() {
        let config = EngineConfig {
            sample_rate: Some(22_050),
            ..Default::default()
        };
        let engine = TimelineEngine::new(config, Scripted::new(&[1.0]));
        let err = engine.assemble(&cues(&[(0.0, 1.0)])).unwrap_err();
        match err {
            SpeechError::Synthesis { reason, .. } => assert!(reason.contains("22050")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_clip_fixes_the_rate() {
        let synth = |request: &SynthesisRequest<'_>| -> Result<AudioBuffer> {
            let rate = if request.cue_index == 0 { 16_000 } else { 24_000 };
            Ok(AudioBuffer::new(vec![0.5; 100], rate))
        };
        let engine = TimelineEngine::new(EngineConfig::default(), synth);
        let err = engine.assemble(&cues(&[(0.0, 1.0), (1.0, 2.0)])).unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { index: 1, .. }));
    }

    #[test]
    fn empty_or_corrupt_audio_is_a_synthesis_failure() {
        let synth = |request: &SynthesisRequest<'_>| -> Result<AudioBuffer> {
            match request.cue_index {
                0 => Ok(AudioBuffer::new(vec![], RATE)),
                _ => Ok(AudioBuffer::new(vec![f32::NAN], RATE)),
            }
        };
        let engine = TimelineEngine::new(EngineConfig::default(), synth);

        let err = engine.assemble(&cues(&[(0.0, 1.0)])).unwrap_err();
        assert!(err.to_string().contains("no samples"));

        let err = engine
            .assemble(&[Cue::new(1, 0.0, 1.0, "nan")])
            .unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn parallel_synthesis_matches_sequential_schedule() {
        let seconds: Vec<f64> = (0..24).map(|i| 0.2 + (i % 5) as f64 * 0.4).collect();
        let windows: Vec<(f64, f64)> = (0..24).map(|i| (i as f64, i as f64 + 1.0)).collect();
        let cues = cues(&windows);

        let sequential = TimelineEngine::new(EngineConfig::default(), Scripted::new(&seconds))
            .assemble(&cues)
            .unwrap();
        let parallel = TimelineEngine::new(
            EngineConfig {
                workers: 4,
                ..Default::default()
            },
            Scripted::new(&seconds),
        )
        .assemble(&cues)
        .unwrap();

        assert_eq!(parallel.timeline, sequential.timeline);
        let order: Vec<usize> = parallel
            .timeline
            .clips()
            .iter()
            .map(|s| s.clip.cue.index)
            .collect();
        assert_eq!(order, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_abort_reports_earliest_failure() {
        let config = EngineConfig {
            workers: 3,
            ..Default::default()
        };
        let synth = Scripted::new(&[1.0; 6]).failing(&[4, 2]);
        let engine = TimelineEngine::new(config, synth);
        let windows: Vec<(f64, f64)> = (0..6).map(|i| (i as f64, i as f64 + 1.0)).collect();

        let err = engine.assemble(&cues(&windows)).unwrap_err();
        assert!(matches!(err, SpeechError::Synthesis { index: 2, .. }));
    }

    #[test]
    fn sends_spoken_text_and_reference() {
        let engine = TimelineEngine::new(EngineConfig::default(), Scripted::new(&[0.5]))
            .with_reference("/voices/narrator.wav");
        engine
            .assemble(&[Cue::new(0, 0.0, 1.0, "<i>Hello</i> there")])
            .unwrap();

        let seen = engine.synthesizer().seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[(
                0,
                "Hello there".to_string(),
                Some(PathBuf::from("/voices/narrator.wav"))
            )]
        );
    }

    #[test]
    fn trailing_silence_is_removed_before_scheduling() {
        let synth = |_: &SynthesisRequest<'_>| -> Result<AudioBuffer> {
            let mut samples = vec![0.8; 1000];
            samples.extend(std::iter::repeat(0.001).take(500));
            Ok(AudioBuffer::new(samples, RATE))
        };
        let engine = TimelineEngine::new(EngineConfig::default(), synth);
        let assembly = engine
            .assemble(&cues(&[(0.0, 5.0), (1.2, 5.0)]))
            .unwrap();

        let first = &assembly.timeline.clips()[0];
        assert_eq!(first.clip.audio.len(), 1000);
        assert_eq!(first.clip.audio.samples[0], 0.0);
        assert_eq!(first.clip.audio.samples[999], 0.0);
        assert_close(assembly.timeline.clips()[1].start, 1.2);
    }

    #[test]
    fn gap_is_applied_between_clips() {
        let config = EngineConfig {
            gap_ms: 200,
            ..Default::default()
        };
        let engine = TimelineEngine::new(config, Scripted::new(&[1.0, 1.0]));
        let assembly = engine.assemble(&cues(&[(0.0, 1.0), (1.0, 2.0)])).unwrap();
        assert_close(assembly.timeline.clips()[1].start, 1.2);
    }

    #[test]
    fn renders_wav_and_timeline_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("speech.wav");
        let subtitles = dir.path().join("speech.srt");

        let engine = TimelineEngine::new(EngineConfig::default(), Scripted::new(&[2.5, 1.0]));
        let report = engine
            .render_to_file(
                &cues(&[(0.0, 2.0), (2.0, 4.0)]),
                &output,
                &RecordingSettings::default(),
                Some(subtitles.as_path()),
            )
            .unwrap();

        assert_eq!(report.clips, 2);
        assert_eq!(report.sample_rate, RATE);
        assert_close(report.duration_seconds, 3.5);
        assert_close(report.max_delay_seconds, 0.5);
        assert!(report.substituted.is_empty());

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.duration(), 3500);

        let written = subtitle::read_srt(&subtitles).unwrap();
        assert_eq!(written.len(), 2);
        assert_close(written[1].start, 2.5);
        assert_close(written[1].end, 3.5);
    }
}

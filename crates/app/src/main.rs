use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use srt_speech_core::{
    subtitle, AppConfig, FailurePolicy, HttpSynthesizer, TimelineEngine, WavEncoding,
};
use tracing_subscriber::EnvFilter;

fn main() -> srt_speech_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => run_render(args),
        Commands::Cues { srt } => run_cues(&srt),
    }
}

fn run_render(args: RenderArgs) -> srt_speech_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    args.apply_overrides(&mut config);

    tracing::info!(
        endpoint = %args.endpoint,
        srt = ?args.srt,
        output = ?args.output,
        "rendering subtitles to speech"
    );

    let cues = subtitle::read_srt(&args.srt)?;
    let synthesizer = HttpSynthesizer::new(&args.endpoint, &config.synthesis)?;
    let mut engine = TimelineEngine::new(config.engine, synthesizer);
    if let Some(reference) = &args.reference {
        let prepared = engine.synthesizer().prepare_reference(reference)?;
        engine = engine.with_reference(prepared);
    }

    let sidecar = (!args.no_subtitles).then(|| sidecar_path(&args.output, &args.srt));
    let report = engine.render_to_file(
        &cues,
        &args.output,
        &config.recording,
        sidecar.as_deref(),
    )?;

    tracing::info!(
        output = ?report.output,
        subtitles = ?report.subtitles,
        clips = report.clips,
        seconds = report.duration_seconds,
        max_delay = report.max_delay_seconds,
        substituted = ?report.substituted,
        "done"
    );
    Ok(())
}

fn run_cues(srt: &Path) -> srt_speech_core::Result<()> {
    let cues = subtitle::read_srt(srt)?;
    println!("{}", serde_json::to_string_pretty(&cues)?);
    Ok(())
}

/// `<output>.srt`, unless that would overwrite the input subtitles.
fn sidecar_path(output: &Path, input: &Path) -> PathBuf {
    let candidate = output.with_extension("srt");
    let same_file = match (candidate.canonicalize(), input.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => candidate == input,
    };
    if same_file {
        output.with_extension("timeline.srt")
    } else {
        candidate
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Turn an SRT file into one narrated WAV track",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synthesize every cue and assemble the clips into a single WAV file.
    Render(RenderArgs),
    /// Parse an SRT file and print its cues as JSON.
    Cues {
        /// Path to the subtitle file.
        srt: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Base URL of the TTS service, e.g. http://localhost:8000.
    endpoint: String,
    /// Path to the subtitle file.
    srt: PathBuf,
    /// Reference voice to clone.
    #[arg(short, long)]
    reference: Option<PathBuf>,
    /// Where to write the WAV file.
    #[arg(short, long, default_value = "output.wav")]
    output: PathBuf,
    /// JSON configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of concurrent synthesis requests.
    #[arg(long)]
    workers: Option<usize>,
    /// Minimum silence between consecutive clips, in milliseconds.
    #[arg(long)]
    gap_ms: Option<u32>,
    /// What to do when a cue cannot be synthesized.
    #[arg(long, value_enum)]
    on_failure: Option<FailureArg>,
    /// Length of the fade at each clip edge, in milliseconds.
    #[arg(long)]
    fade_ms: Option<u32>,
    /// Amplitude below which trailing samples count as silence.
    #[arg(long)]
    silence_threshold: Option<f32>,
    /// Emotion description sent with every request.
    #[arg(long)]
    emo_text: Option<String>,
    /// Emotion vector sent with every request, e.g. 0.5,0,0.2.
    #[arg(long, value_delimiter = ',')]
    emo_vector: Option<Vec<f32>>,
    /// Write 32-bit float samples instead of 16-bit PCM.
    #[arg(long)]
    float: bool,
    /// Skip the subtitle file describing the rendered timeline.
    #[arg(long)]
    no_subtitles: bool,
}

impl RenderArgs {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.engine.workers = workers;
        }
        if let Some(gap_ms) = self.gap_ms {
            config.engine.gap_ms = gap_ms;
        }
        if let Some(policy) = self.on_failure {
            config.engine.on_failure = policy.into();
        }
        if let Some(fade_ms) = self.fade_ms {
            config.engine.fade_duration_ms = fade_ms;
        }
        if let Some(threshold) = self.silence_threshold {
            config.engine.silence_threshold = threshold;
        }
        if let Some(text) = &self.emo_text {
            config.synthesis.emo_text = Some(text.clone());
        }
        if let Some(vector) = &self.emo_vector {
            config.synthesis.emo_vector = Some(vector.clone());
        }
        if self.float {
            config.recording.encoding = WavEncoding::Float32;
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FailureArg {
    Abort,
    Silence,
}

impl From<FailureArg> for FailurePolicy {
    fn from(value: FailureArg) -> Self {
        match value {
            FailureArg::Abort => FailurePolicy::Abort,
            FailureArg::Silence => FailurePolicy::Silence,
        }
    }
}

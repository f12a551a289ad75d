//! SRT reading and writing.
//!
//! Parsing is forgiving: a block that has no `-->` line or whose timestamps do
//! not parse is skipped with a warning instead of failing the whole file. The
//! writer is used for the sidecar subtitle file that mirrors the timeline
//! actually produced, so its timestamps follow the placed clips rather than
//! the source cues.

use std::{fmt::Write as _, path::Path, sync::OnceLock};

use regex::Regex;

use crate::{timeline::Timeline, Cue, Result};

/// Reads and parses an SRT file from disk.
pub fn read_srt(path: impl AsRef<Path>) -> Result<Vec<Cue>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Ok(parse_srt(&raw))
}

/// Parses SRT text into cues numbered by their order of appearance.
pub fn parse_srt(content: &str) -> Vec<Cue> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for (block_no, block) in block_separator()
        .split(normalized.trim())
        .enumerate()
    {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        let Some(timing_at) = lines.iter().position(|line| line.contains("-->")) else {
            if !lines.is_empty() {
                tracing::warn!(block = block_no + 1, "skipping subtitle block without timing line");
            }
            continue;
        };

        let Some((start, end)) = parse_timing_line(lines[timing_at]) else {
            tracing::warn!(
                block = block_no + 1,
                line = lines[timing_at],
                "skipping subtitle block with unreadable timestamps"
            );
            continue;
        };

        let text = lines[timing_at + 1..].join(" ");
        cues.push(Cue::new(cues.len(), start, end, text));
    }

    cues
}

/// Parses `HH:MM:SS,mmm` (or `HH:MM:SS.mmm`) into seconds.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let mut parts = raw.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;
    let (seconds, millis) = rest.split_once([',', '.']).unwrap_or((rest, "0"));
    let seconds: u64 = seconds.parse().ok()?;
    let millis: u64 = millis.parse().ok()?;
    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return None;
    }

    Some((hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0)
}

/// Formats seconds as an SRT timestamp, rounding to the nearest millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Renders the placed clips as SRT, one entry per clip with its actual window.
pub fn render_srt(timeline: &Timeline) -> String {
    let mut out = String::new();
    for (position, scheduled) in timeline.clips().iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            position + 1,
            format_timestamp(scheduled.start),
            format_timestamp(scheduled.end()),
            scheduled.clip.cue.text
        );
    }
    out
}

/// Writes [`render_srt`] output to `path`.
pub fn write_srt(path: impl AsRef<Path>, timeline: &Timeline) -> Result<()> {
    std::fs::write(path, render_srt(timeline))?;
    Ok(())
}

fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.split_once("-->")?;
    // Some files append positioning hints after the end timestamp.
    let end = end.split_whitespace().next()?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

fn block_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n\s*\n").expect("block separator pattern is valid"))
}

// Rainmaker - FFmpeg Filtergraph Builder
// Constructs the scale -> opacity -> overlay filtergraph and the full ffmpeg command.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants::STDERR_SUMMARY_LINES;
use crate::error::{RainmakerError, Result};
use super::geometry::Placement;

/// Label of the scaled, alpha-adjusted watermark stream inside the graph
const WATERMARK_LABEL: &str = "wm";

/// A complete `-filter_complex` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression(String);

impl FilterExpression {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<FilterExpression> for String {
    fn from(expr: FilterExpression) -> Self {
        expr.0
    }
}

/// Build the filtergraph for one watermark.
///
/// Input 1 (the image) is scaled, converted to RGBA with its alpha multiplied by
/// `opacity`, then overlaid onto input 0 at the placement offset. Opacity is
/// passed through as given; ffmpeg validates the range.
pub fn build_filter(placement: &Placement, opacity: f64) -> FilterExpression {
    FilterExpression(format!(
        "[1:v]scale={w}:{h},format=rgba,colorchannelmixer=aa={opacity}[{label}];\
         [0:v][{label}]overlay={x}:{y}",
        w = placement.scaled_width,
        h = placement.scaled_height,
        opacity = opacity,
        label = WATERMARK_LABEL,
        x = placement.x,
        y = placement.y,
    ))
}

/// Encoder settings placed after the filtergraph
#[derive(Debug, Clone)]
pub struct EncodeArgs<'a> {
    pub codec: &'a str,
    pub crf: u32,
    pub preset: &'a str,
}

/// Build the ffmpeg args list. The output path is always the last argument.
///
/// `-y` is required: the output file has already been reserved (created empty)
/// by the caller.
pub fn build_command(
    video_path: &Path,
    watermark_path: &Path,
    filter: &FilterExpression,
    encode: &EncodeArgs<'_>,
    output_path: &Path,
) -> Result<Vec<String>> {
    let mut args: Vec<String> = vec!["-y".into()];

    // Input order matters: the filtergraph refers to [0:v] and [1:v]
    args.extend_from_slice(&["-i".into(), path_str(video_path)?]);
    args.extend_from_slice(&["-i".into(), path_str(watermark_path)?]);

    args.extend_from_slice(&["-filter_complex".into(), filter.as_str().to_string()]);

    // Audio untouched
    args.extend_from_slice(&["-c:a".into(), "copy".into()]);

    args.extend(output_encoding_args(encode));
    args.push(path_str(output_path)?);

    Ok(args)
}

fn output_encoding_args(encode: &EncodeArgs<'_>) -> Vec<String> {
    vec![
        "-c:v".into(), encode.codec.to_string(),
        "-crf".into(), encode.crf.to_string(),
        "-preset".into(), encode.preset.to_string(),
    ]
}

/// Pull the interesting lines out of ffmpeg's stderr.
///
/// Prefers lines that look like errors; otherwise falls back to the tail.
pub fn summarize_stderr(stderr: &str) -> String {
    let error_line = error_line_regex();

    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let flagged: Vec<&str> = lines.iter().copied().filter(|l| error_line.is_match(l)).collect();
    let picked = if flagged.is_empty() { &lines } else { &flagged };

    let start = picked.len().saturating_sub(STDERR_SUMMARY_LINES);
    picked[start..].join("\n")
}

fn error_line_regex() -> &'static Regex {
    static ERROR_LINE: OnceLock<Regex> = OnceLock::new();
    ERROR_LINE.get_or_init(|| {
        Regex::new(r"(?i)(error|invalid|no such|not found|unknown|failed|cannot)").expect("static regex")
    })
}

/// Convert a Path to a String, failing on non-UTF8
fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| RainmakerError::InvalidPath(format!("Path contains non-UTF8 characters: {}", path.display())))
}

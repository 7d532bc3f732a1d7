// FFprobe wrapper for dimension extraction

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RainmakerError, Result};
use crate::metadata::MediaDimensions;
use crate::tools::ExternalTool;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    #[serde(default)]
    streams: Vec<FFprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    width: Option<i64>,
    height: Option<i64>,
}

/// Probe a video or still image with the resolved ffprobe binary
pub fn probe(path: &Path) -> Result<MediaDimensions> {
    probe_with(&ExternalTool::ffprobe(), path, None)
}

/// Run ffprobe on a file and read width/height of its first video stream
pub fn probe_with(tool: &ExternalTool, path: &Path, timeout: Option<Duration>) -> Result<MediaDimensions> {
    let mut args: Vec<&OsStr> = [
        "-v", "error",
        "-select_streams", "v:0",
        "-show_entries", "stream=width,height",
        "-of", "json",
    ]
    .into_iter()
    .map(OsStr::new)
    .collect();
    args.push(path.as_os_str());

    let output = tool
        .run(args, timeout)
        .map_err(|e| match e {
            RainmakerError::Io(e) => RainmakerError::Probe(format!("Failed to run {}: {}", tool.name(), e)),
            other => other,
        })?;

    if !output.status.success() {
        return Err(RainmakerError::Probe(format!(
            "{} failed on {}: {}",
            tool.name(),
            path.display(),
            output.stderr_lossy().trim()
        )));
    }

    let dims = parse_dimensions(&output.stdout)?;
    log::debug!("Probed {}: {}", path.display(), dims);
    Ok(dims)
}

/// Parse ffprobe's `-of json` stream listing, using the first stream
pub fn parse_dimensions(stdout: &[u8]) -> Result<MediaDimensions> {
    let probe_output: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| RainmakerError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = probe_output
        .streams
        .first()
        .ok_or_else(|| RainmakerError::Probe("No video stream found".to_string()))?;

    let width = positive(stream.width, "width")?;
    let height = positive(stream.height, "height")?;
    Ok(MediaDimensions::new(width, height))
}

fn positive(value: Option<i64>, field: &str) -> Result<u32> {
    match value {
        Some(v) if v > 0 => u32::try_from(v)
            .map_err(|_| RainmakerError::Probe(format!("Stream {} out of range: {}", field, v))),
        Some(v) => Err(RainmakerError::Probe(format!("Stream {} is not positive: {}", field, v))),
        None => Err(RainmakerError::Probe(format!("Stream has no {}", field))),
    }
}

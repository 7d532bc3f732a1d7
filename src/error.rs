// Rainmaker Error Types

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RainmakerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFprobe error: {0}")]
    Probe(String),

    #[error("FFmpeg failed (exit code {}): {stderr}", exit_code(.code))]
    Composition { code: Option<i32>, stderr: String },

    #[error("{tool} did not finish within {limit:?}")]
    Timeout { tool: String, limit: Duration },

    #[error("Unknown watermark position: {0}")]
    InvalidPosition(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Output path error: {0}")]
    OutputPath(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

fn exit_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
}

pub type Result<T> = std::result::Result<T, RainmakerError>;

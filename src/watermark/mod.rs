// Rainmaker - Watermark Compositing
// Orchestrates probing, geometry, filtergraph construction, output reservation and the ffmpeg run.

pub mod ffmpeg_builder;
pub mod geometry;
pub mod output;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CODEC, DEFAULT_CONTAINER, DEFAULT_CRF, DEFAULT_OPACITY, DEFAULT_OUTPUT_NAME,
    DEFAULT_PRESET, DEFAULT_SIZE_PERCENTAGE, KNOWN_CODECS, KNOWN_CONTAINERS,
};
use crate::error::{RainmakerError, Result};
use crate::metadata::{ffprobe, MediaDimensions};
use crate::tools::ExternalTool;

use ffmpeg_builder::{EncodeArgs, FilterExpression};
pub use geometry::{BoundsPolicy, Placement, Position};

/// Everything the caller chooses for one watermarking run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkRequest {
    pub input_video_path: PathBuf,
    pub watermark_image_path: PathBuf,
    pub output_path: PathBuf,
    /// Watermark size relative to its own pixel size, in (0, 100]
    pub size_percentage: f64,
    pub position: Position,
    /// Alpha multiplier in [0, 1]; not validated here
    pub opacity: f64,
    pub codec: String,
    pub container_extension: String,
}

impl WatermarkRequest {
    /// A request with the default size, position, opacity, codec and container
    pub fn new(input_video_path: impl Into<PathBuf>, watermark_image_path: impl Into<PathBuf>) -> Self {
        Self {
            input_video_path: input_video_path.into(),
            watermark_image_path: watermark_image_path.into(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_NAME),
            size_percentage: DEFAULT_SIZE_PERCENTAGE,
            position: Position::default(),
            opacity: DEFAULT_OPACITY,
            codec: DEFAULT_CODEC.to_string(),
            container_extension: DEFAULT_CONTAINER.to_string(),
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_size_percentage(mut self, pct: f64) -> Self {
        self.size_percentage = pct;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn with_container(mut self, ext: impl Into<String>) -> Self {
        self.container_extension = ext.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.size_percentage > 0.0 && self.size_percentage <= 100.0) {
            return Err(RainmakerError::InvalidRequest(format!(
                "Size percentage must be in (0, 100], got {}",
                self.size_percentage
            )));
        }
        if self.codec.trim().is_empty() {
            return Err(RainmakerError::InvalidRequest("Codec is empty".to_string()));
        }
        let ext = self.container_extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(RainmakerError::InvalidRequest(format!(
                "Invalid container extension '{}'",
                self.container_extension
            )));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(RainmakerError::InvalidRequest("Output path is empty".to_string()));
        }

        if !KNOWN_CODECS.contains(&self.codec.as_str()) {
            log::warn!("Codec '{}' is not one of {:?}, passing it to ffmpeg as-is", self.codec, KNOWN_CODECS);
        }
        if !KNOWN_CONTAINERS.contains(&ext) {
            log::warn!("Container '{}' is not one of {:?}", ext, KNOWN_CONTAINERS);
        }
        Ok(())
    }
}

/// Encoder and policy knobs that are not part of a request
#[derive(Debug, Clone)]
pub struct CompositorSettings {
    pub crf: u32,
    pub preset: String,
    pub bounds: BoundsPolicy,
    /// Applies to every spawned tool; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.to_string(),
            bounds: BoundsPolicy::default(),
            timeout: None,
        }
    }
}

/// The probed inputs and derived geometry for one request.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub video: MediaDimensions,
    pub watermark: MediaDimensions,
    pub placement: Placement,
    pub filter: FilterExpression,
}

impl CompositionPlan {
    /// ffmpeg arguments for writing this plan to `output`
    pub fn command(&self, request: &WatermarkRequest, settings: &CompositorSettings, output: &Path) -> Result<Vec<String>> {
        let encode = EncodeArgs {
            codec: &request.codec,
            crf: settings.crf,
            preset: &settings.preset,
        };
        ffmpeg_builder::build_command(
            &request.input_video_path,
            &request.watermark_image_path,
            &self.filter,
            &encode,
            output,
        )
    }
}

/// Runs watermark compositions with a fixed pair of tools.
#[derive(Debug, Clone)]
pub struct Compositor {
    ffprobe: ExternalTool,
    ffmpeg: ExternalTool,
    settings: CompositorSettings,
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self::with_tools(ExternalTool::ffprobe(), ExternalTool::ffmpeg(), settings)
    }

    pub fn with_tools(ffprobe: ExternalTool, ffmpeg: ExternalTool, settings: CompositorSettings) -> Self {
        Self { ffprobe, ffmpeg, settings }
    }

    pub fn settings(&self) -> &CompositorSettings {
        &self.settings
    }

    /// Probe both inputs and work out the filtergraph without touching the output.
    pub fn plan(&self, request: &WatermarkRequest) -> Result<CompositionPlan> {
        request.validate()?;

        let video = ffprobe::probe_with(&self.ffprobe, &request.input_video_path, self.settings.timeout)?;
        let watermark = ffprobe::probe_with(&self.ffprobe, &request.watermark_image_path, self.settings.timeout)?;
        log::info!("Video {}, watermark {}", video, watermark);

        let raw = geometry::compute(video, watermark, request.size_percentage, request.position);
        let placement = geometry::apply_bounds(raw, video, self.settings.bounds)?;
        log::info!(
            "Placing {}x{} watermark at ({}, {}) [{}]",
            placement.scaled_width, placement.scaled_height, placement.x, placement.y, request.position
        );

        let filter = ffmpeg_builder::build_filter(&placement, request.opacity);
        log::debug!("Filtergraph: {}", filter);

        Ok(CompositionPlan { video, watermark, placement, filter })
    }

    /// Composite the watermark and return the path that was written.
    ///
    /// The returned path is the one reserved before ffmpeg ran.
    pub fn run(&self, request: &WatermarkRequest) -> Result<PathBuf> {
        let plan = self.plan(request)?;

        let reserved = output::reserve_output_path(&request.output_path, &request.container_extension)?;
        let args = plan.command(request, &self.settings, reserved.path())?;

        log::info!("Rendering {}", reserved.path().display());
        let result = self.ffmpeg.run(&args, self.settings.timeout).map_err(|e| match e {
            RainmakerError::Io(e) => RainmakerError::Composition {
                code: None,
                stderr: format!("Failed to start {}: {}", self.ffmpeg.name(), e),
            },
            other => other,
        })?;

        if !result.status.success() {
            let stderr = ffmpeg_builder::summarize_stderr(&result.stderr_lossy());
            log::error!("{} failed ({}): {}", self.ffmpeg.name(), result.status, stderr);
            // Dropping `reserved` removes the placeholder
            return Err(RainmakerError::Composition {
                code: result.status.code(),
                stderr,
            });
        }

        let path = reserved.commit();
        log::info!("Watermarked video saved as {}", path.display());
        Ok(path)
    }
}

/// Composite with the resolved ffprobe/ffmpeg binaries
pub fn run_watermark(request: &WatermarkRequest, settings: &CompositorSettings) -> Result<PathBuf> {
    Compositor::new(settings.clone()).run(request)
}

/// Probe and plan with the resolved binaries, without rendering
pub fn plan_watermark(request: &WatermarkRequest, settings: &CompositorSettings) -> Result<CompositionPlan> {
    Compositor::new(settings.clone()).plan(request)
}

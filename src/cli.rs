// Rainmaker CLI binary

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use rainmaker_lib::constants::{
    DEFAULT_CODEC, DEFAULT_CONTAINER, DEFAULT_CRF, DEFAULT_OPACITY, DEFAULT_OUTPUT_NAME,
    DEFAULT_PRESET, DEFAULT_SIZE_PERCENTAGE,
};
use rainmaker_lib::metadata::ffprobe;
use rainmaker_lib::tools::ExternalTool;
use rainmaker_lib::{BoundsPolicy, Compositor, CompositorSettings, Position, WatermarkRequest};

#[derive(Parser)]
#[command(name = "rainmaker")]
#[command(about = "Rainmaker - stamp a watermark image onto a video", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite a watermark onto a video
    Apply {
        /// Input video
        video: PathBuf,
        /// Watermark image
        watermark: PathBuf,
        /// Output path; the container extension is appended if missing
        #[arg(short, long, default_value = DEFAULT_OUTPUT_NAME)]
        output: PathBuf,
        /// Watermark size as a percentage of its original size
        #[arg(long, default_value_t = DEFAULT_SIZE_PERCENTAGE)]
        size: f64,
        /// upper-left, upper-right, lower-left, lower-right or center
        #[arg(long, default_value = "upper-left")]
        position: String,
        /// Fall back to upper-left for unknown positions instead of failing
        #[arg(long)]
        lenient_position: bool,
        /// Watermark opacity, 0.0 to 1.0
        #[arg(long, default_value_t = DEFAULT_OPACITY)]
        opacity: f64,
        /// Video codec passed to ffmpeg
        #[arg(long, default_value = DEFAULT_CODEC)]
        codec: String,
        /// Output container extension
        #[arg(long, default_value = DEFAULT_CONTAINER)]
        ext: String,
        /// Constant rate factor
        #[arg(long, default_value_t = DEFAULT_CRF)]
        crf: u32,
        /// Encoder speed/quality preset
        #[arg(long, default_value = DEFAULT_PRESET)]
        preset: String,
        /// How to treat a watermark that leaves the frame
        #[arg(long, value_enum, default_value_t = BoundsArg::Unchecked)]
        bounds: BoundsArg,
        /// Kill ffprobe/ffmpeg after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the ffmpeg command instead of running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the dimensions of a video or image
    Probe {
        /// Media file
        path: PathBuf,
    },

    /// Check that ffprobe and ffmpeg can be found
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BoundsArg {
    Unchecked,
    Clamp,
    Reject,
}

impl From<BoundsArg> for BoundsPolicy {
    fn from(arg: BoundsArg) -> Self {
        match arg {
            BoundsArg::Unchecked => BoundsPolicy::Unchecked,
            BoundsArg::Clamp => BoundsPolicy::Clamp,
            BoundsArg::Reject => BoundsPolicy::Reject,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    rainmaker_lib::init_logger(level);

    match cli.command {
        Commands::Apply {
            video, watermark, output, size, position, lenient_position, opacity,
            codec, ext, crf, preset, bounds, timeout_secs, dry_run,
        } => {
            let position = if lenient_position {
                Position::parse_lenient(&position)
            } else {
                position.parse::<Position>()?
            };

            let request = WatermarkRequest::new(video, watermark)
                .with_output(output)
                .with_size_percentage(size)
                .with_position(position)
                .with_opacity(opacity)
                .with_codec(codec)
                .with_container(ext);

            let settings = CompositorSettings {
                crf,
                preset,
                bounds: bounds.into(),
                timeout: timeout_secs.map(Duration::from_secs),
            };

            cmd_apply(&request, settings, dry_run)
        }
        Commands::Probe { path } => cmd_probe(path),
        Commands::Check => cmd_check(),
    }
}

fn cmd_apply(request: &WatermarkRequest, settings: CompositorSettings, dry_run: bool) -> Result<()> {
    let compositor = Compositor::new(settings);

    if dry_run {
        let plan = compositor.plan(request)?;
        let output = rainmaker_lib::watermark::output::resolve_output_path(
            &request.output_path,
            &request.container_extension,
        )?;
        let args = plan.command(request, compositor.settings(), &output)?;

        println!("Video:     {}", plan.video);
        println!("Watermark: {} -> {}x{}", plan.watermark, plan.placement.scaled_width, plan.placement.scaled_height);
        println!("Offset:    {}:{}", plan.placement.x, plan.placement.y);
        println!();
        println!("ffmpeg {}", args.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" "));
        return Ok(());
    }

    let path = compositor
        .run(request)
        .with_context(|| format!("Failed to watermark {}", request.input_video_path.display()))?;

    println!("Watermarked video saved as {}", path.display());
    Ok(())
}

fn cmd_probe(path: PathBuf) -> Result<()> {
    let dims = ffprobe::probe(&path)?;
    println!("{}", dims);
    Ok(())
}

fn cmd_check() -> Result<()> {
    let mut missing = Vec::new();

    for tool in [ExternalTool::ffprobe(), ExternalTool::ffmpeg()] {
        let ok = tool.is_available();
        println!("{:<8} {:<8} {}", tool.name(), if ok { "ok" } else { "missing" }, tool.program().display());
        if !ok {
            missing.push(tool.name().to_string());
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing tools: {}", missing.join(", "));
    }
    Ok(())
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=+,".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

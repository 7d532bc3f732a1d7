// Rainmaker - Library Entry Point

pub mod constants;
pub mod error;
pub mod tools;
pub mod metadata;
pub mod watermark;

pub use error::{RainmakerError, Result};
pub use metadata::MediaDimensions;
pub use watermark::{
    plan_watermark, run_watermark, BoundsPolicy, Compositor, CompositorSettings, Placement, Position,
    WatermarkRequest,
};

/// Install the process-wide logger.
///
/// Format: `[HH:MM:SS LEVEL file line] message`. `RUST_LOG` overrides `default_level`.
pub fn init_logger(default_level: log::LevelFilter) {
    use std::io::Write;

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            let style = buf.default_level_style(record.level());
            let ts = chrono::Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "[{} {style}{}{style:#} {} {}] {}",
                ts,
                record.level(),
                record
                    .file()
                    .unwrap_or("None")
                    .split('/')
                    .next_back()
                    .unwrap_or("None"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

// Rainmaker Constants
// Defaults mirror the original watermarker form. Encoder values are fixed unless overridden.

// Geometry
pub const MARGIN_PX: i64 = 10;

// Encoder
pub const DEFAULT_CRF: u32 = 18;
pub const DEFAULT_PRESET: &str = "medium";

// Request defaults
pub const DEFAULT_SIZE_PERCENTAGE: f64 = 30.0;
pub const DEFAULT_OPACITY: f64 = 0.5;
pub const DEFAULT_CODEC: &str = "libx264";
pub const DEFAULT_CONTAINER: &str = "mp4";
pub const DEFAULT_OUTPUT_NAME: &str = "output";

// Choices offered by the original form. Other values are passed through to ffmpeg.
pub const KNOWN_CODECS: [&str; 4] = ["libx264", "libx265", "mpeg4", "vp9"];
pub const KNOWN_CONTAINERS: [&str; 4] = ["mp4", "mkv", "avi", "webm"];

// Output collision handling
pub const MAX_SUFFIX_ATTEMPTS: u32 = 10_000;

// Tool locations
pub const FFPROBE_ENV: &str = "RAINMAKER_FFPROBE_PATH";
pub const FFMPEG_ENV: &str = "RAINMAKER_FFMPEG_PATH";

// Process supervision
pub const PROCESS_POLL_MS: u64 = 25;
pub const STDERR_SUMMARY_LINES: usize = 5;

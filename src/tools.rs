// External tool resolver and process guard for ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (RAINMAKER_FFPROBE_PATH, RAINMAKER_FFMPEG_PATH)
// 2) Sidecar next to the executable
// 3) bin/ next to the executable
// 4) PATH fallback

use std::env;
use std::ffi::OsStr;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::{FFMPEG_ENV, FFPROBE_ENV, PROCESS_POLL_MS};
use crate::error::{RainmakerError, Result};

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Resolve a tool path, preferring explicit overrides and bundled sidecars.
fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
        log::warn!("{} points at missing file {}, ignoring", env_key, v);
    }

    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }

        let bin_candidate = dir.join("bin").join(&filename);
        if bin_candidate.exists() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool(FFPROBE_ENV, "ffprobe")
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool(FFMPEG_ENV, "ffmpeg")
}

/// An external program plus any arguments that always precede the call-specific ones.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ExternalTool {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn ffprobe() -> Self {
        Self::new("ffprobe", ffprobe_path())
    }

    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg", ffmpeg_path())
    }

    /// Arguments inserted before every invocation (wrappers, `sh -c` scripts).
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd
    }

    /// Spawn the tool and block until it exits or `timeout` elapses.
    pub fn run<I, S>(&self, args: I, timeout: Option<Duration>) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        ToolProcess::spawn(self, args)?.wait(timeout)
    }

    /// Check if the tool can be found and answers `-version`
    pub fn is_available(&self) -> bool {
        self.run(["-version"], Some(Duration::from_secs(10)))
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Captured result of a finished tool process.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A running child process. The child is always reaped: either by `wait`,
/// by the timeout path, or by `Drop` if the guard is abandoned.
pub struct ToolProcess {
    name: String,
    child: Option<Child>,
    stdout: Option<Receiver<Vec<u8>>>,
    stderr: Option<Receiver<Vec<u8>>>,
}

impl ToolProcess {
    pub fn spawn<I, S>(tool: &ExternalTool, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = tool.command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log::debug!("Spawning {} ({})", tool.name, tool.program.display());
        let mut child = cmd.spawn()?;

        // Drain both pipes so a chatty tool never blocks on a full buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        Ok(Self {
            name: tool.name.clone(),
            child: Some(child),
            stdout,
            stderr,
        })
    }

    pub fn wait(mut self, timeout: Option<Duration>) -> Result<ToolOutput> {
        let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
        let status = loop {
            let child = match self.child.as_mut() {
                Some(child) => child,
                None => return Err(RainmakerError::InvalidRequest(format!("{} already reaped", self.name))),
            };

            if let Some(status) = child.try_wait()? {
                break status;
            }

            if let Some((at, limit)) = deadline {
                if Instant::now() >= at {
                    log::warn!("{} exceeded {:?}, killing", self.name, limit);
                    self.reap();
                    return Err(self.timed_out(limit));
                }
            }

            thread::sleep(Duration::from_millis(PROCESS_POLL_MS));
        };
        self.child = None;

        // The deadline also covers the pipes: a backgrounded grandchild can
        // keep them open long after the tool itself exited.
        let stdout = collect(self.stdout.take(), deadline);
        let stderr = collect(self.stderr.take(), deadline);
        let (stdout, stderr) = match (stdout, stderr) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let limit = deadline.map(|(_, limit)| limit).unwrap_or_default();
                log::warn!("{} exited but its output was still open after {:?}", self.name, limit);
                self.reap();
                return Err(self.timed_out(limit));
            }
        };

        log::debug!("{} exited with {}", self.name, status);
        Ok(ToolOutput { status, stdout, stderr })
    }

    fn timed_out(&self, limit: Duration) -> RainmakerError {
        RainmakerError::Timeout {
            tool: self.name.clone(),
            limit,
        }
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // Grandchildren may still hold the pipes open; leave the readers detached.
        self.stdout.take();
        self.stderr.take();
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        self.reap();
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe. `None` means the deadline passed first.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Option<(Instant, Duration)>) -> Option<Vec<u8>> {
    let Some(rx) = rx else {
        return Some(Vec::new());
    };
    match deadline {
        None => Some(rx.recv().unwrap_or_default()),
        Some((at, _)) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
            Ok(buf) => Some(buf),
            Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
            Err(RecvTimeoutError::Timeout) => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tool_fallback() {
        let path = resolve_tool("RAINMAKER_TEST_NONEXISTENT", "testcmd");
        assert_eq!(path, PathBuf::from("testcmd"));
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake_ffprobe");
        std::fs::write(&tool, "test").unwrap();

        std::env::set_var("RAINMAKER_TEST_TOOL", tool.to_str().unwrap());
        let path = resolve_tool("RAINMAKER_TEST_TOOL", "default");
        assert_eq!(path, tool);
        std::env::remove_var("RAINMAKER_TEST_TOOL");
    }

    #[test]
    fn test_env_override_missing_file_falls_back() {
        std::env::set_var("RAINMAKER_TEST_MISSING_TOOL", "/definitely/not/here/ffmpeg");
        let path = resolve_tool("RAINMAKER_TEST_MISSING_TOOL", "ffmpeg");
        assert_eq!(path, PathBuf::from("ffmpeg"));
        std::env::remove_var("RAINMAKER_TEST_MISSING_TOOL");
    }

    #[cfg(unix)]
    fn script(body: &str) -> ExternalTool {
        ExternalTool::new("script", "sh").with_leading_args(["-c", body, "script"])
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output_and_status() {
        let out = script("echo hello; echo oops >&2; exit 3")
            .run(Vec::<String>::new(), None)
            .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
        assert_eq!(out.stderr_lossy().trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_passes_arguments_after_leading_args() {
        let out = script("echo \"$1-$2\"").run(["a", "b"], None).unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "a-b");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_hung_process() {
        let started = Instant::now();
        let err = script("exec sleep 30")
            .run(Vec::<String>::new(), Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, RainmakerError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_covers_pipes_held_after_exit() {
        // The shell exits at once but the background sleep inherits stdout/stderr.
        let started = Instant::now();
        let err = script("sleep 5 & exit 0")
            .run(Vec::<String>::new(), Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, RainmakerError::Timeout { ref tool, .. } if tool == "script"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_limit() {
        let err = RainmakerError::Timeout {
            tool: "ffmpeg".to_string(),
            limit: Duration::from_millis(300),
        };
        assert_eq!(err.to_string(), "ffmpeg did not finish within 300ms");
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let tool = ExternalTool::new("ghost", "/definitely/not/here/ghost-tool");
        assert!(matches!(tool.run(["-version"], None), Err(RainmakerError::Io(_))));
        assert!(!tool.is_available());
    }
}

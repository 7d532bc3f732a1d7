// Output path resolution: extension handling and collision-free naming

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::constants::MAX_SUFFIX_ATTEMPTS;
use crate::error::{RainmakerError, Result};

/// Append `.{ext}` unless the path already ends with it
pub fn with_container_extension(desired: &Path, ext: &str) -> PathBuf {
    let ext = ext.trim_start_matches('.');
    let suffix = format!(".{}", ext);
    let raw = desired.as_os_str().to_string_lossy();

    if raw.ends_with(&suffix) {
        desired.to_path_buf()
    } else {
        let mut name = desired.as_os_str().to_os_string();
        name.push(&suffix);
        PathBuf::from(name)
    }
}

/// Candidate `n` for a path ending in `.{ext}`: `base.ext`, `base_1.ext`, `base_2.ext`, ...
fn candidate(with_ext: &Path, ext: &str, n: u32) -> PathBuf {
    if n == 0 {
        return with_ext.to_path_buf();
    }

    let parent = with_ext.parent().unwrap_or(Path::new(""));
    let name = with_ext
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = ext.trim_start_matches('.');
    let base = name.strip_suffix(&format!(".{}", ext)).unwrap_or(&name);

    parent.join(format!("{}_{}.{}", base, n, ext))
}

/// Find the first candidate that does not exist yet.
///
/// Check-only: another process can still create the file before it is written.
/// Use [`reserve_output_path`] when that matters.
pub fn resolve_output_path(desired: &Path, ext: &str) -> Result<PathBuf> {
    resolve_within(desired, ext, MAX_SUFFIX_ATTEMPTS)
}

fn resolve_within(desired: &Path, ext: &str, max_attempts: u32) -> Result<PathBuf> {
    let with_ext = with_container_extension(desired, ext);

    (0..max_attempts)
        .map(|n| candidate(&with_ext, ext, n))
        .find(|path| !path.exists())
        .ok_or_else(|| exhausted(&with_ext, max_attempts))
}

/// Claim the first free candidate by creating it exclusively.
pub fn reserve_output_path(desired: &Path, ext: &str) -> Result<ReservedOutput> {
    reserve_within(desired, ext, MAX_SUFFIX_ATTEMPTS)
}

fn reserve_within(desired: &Path, ext: &str, max_attempts: u32) -> Result<ReservedOutput> {
    let with_ext = with_container_extension(desired, ext);

    for n in 0..max_attempts {
        let path = candidate(&with_ext, ext, n);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                log::debug!("Reserved output {}", path.display());
                return Ok(ReservedOutput { path, committed: false });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(RainmakerError::OutputPath(format!(
                    "Cannot create {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    Err(exhausted(&with_ext, max_attempts))
}

fn exhausted(with_ext: &Path, attempts: u32) -> RainmakerError {
    RainmakerError::OutputPath(format!(
        "No free name for {} after {} attempts",
        with_ext.display(),
        attempts
    ))
}

/// An empty placeholder file owned by one composition. Removed on drop unless
/// committed, so failed runs leave nothing behind.
#[derive(Debug)]
pub struct ReservedOutput {
    path: PathBuf,
    committed: bool,
}

impl ReservedOutput {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file and hand back its path
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ReservedOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_extension_appended_once() {
        assert_eq!(with_container_extension(Path::new("out"), "mp4"), PathBuf::from("out.mp4"));
        assert_eq!(with_container_extension(Path::new("out.mp4"), "mp4"), PathBuf::from("out.mp4"));
        assert_eq!(with_container_extension(Path::new("out.mov"), "mkv"), PathBuf::from("out.mov.mkv"));
        assert_eq!(with_container_extension(Path::new("out"), ".webm"), PathBuf::from("out.webm"));
    }

    #[test]
    fn test_resolve_increments_suffix() {
        let tmp = TempDir::new().unwrap();
        let desired = tmp.path().join("out");

        assert_eq!(resolve_output_path(&desired, "mp4").unwrap(), tmp.path().join("out.mp4"));

        touch(&tmp.path().join("out.mp4"));
        assert_eq!(resolve_output_path(&desired, "mp4").unwrap(), tmp.path().join("out_1.mp4"));

        touch(&tmp.path().join("out_1.mp4"));
        assert_eq!(resolve_output_path(&desired, "mp4").unwrap(), tmp.path().join("out_2.mp4"));
    }

    #[test]
    fn test_resolve_keeps_inner_dots() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("clip.v2.mkv"));
        assert_eq!(
            resolve_output_path(&tmp.path().join("clip.v2"), "mkv").unwrap(),
            tmp.path().join("clip.v2_1.mkv")
        );
    }

    #[test]
    fn test_resolve_gives_up_after_max_attempts() {
        let tmp = TempDir::new().unwrap();
        for name in ["out.mp4", "out_1.mp4", "out_2.mp4"] {
            touch(&tmp.path().join(name));
        }
        let desired = tmp.path().join("out");

        let err = resolve_within(&desired, "mp4", 3).unwrap_err();
        assert!(matches!(err, RainmakerError::OutputPath(ref msg) if msg.contains("after 3 attempts")));

        assert_eq!(resolve_within(&desired, "mp4", 4).unwrap(), tmp.path().join("out_3.mp4"));
    }

    #[test]
    fn test_reserve_gives_up_after_max_attempts() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("out.mp4"));
        touch(&tmp.path().join("out_1.mp4"));

        let err = reserve_within(&tmp.path().join("out"), "mp4", 2).unwrap_err();
        assert!(matches!(err, RainmakerError::OutputPath(_)));
        assert!(!tmp.path().join("out_2.mp4").exists());
    }

    #[test]
    fn test_reserve_creates_placeholder_and_skips_taken_names() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("out.mp4"));

        let first = reserve_output_path(&tmp.path().join("out"), "mp4").unwrap();
        let second = reserve_output_path(&tmp.path().join("out"), "mp4").unwrap();

        assert_eq!(first.path(), tmp.path().join("out_1.mp4"));
        assert_eq!(second.path(), tmp.path().join("out_2.mp4"));
        assert!(first.path().exists());
        assert!(second.path().exists());
        // Existing file untouched
        assert_eq!(fs::read(tmp.path().join("out.mp4")).unwrap(), b"x");
    }

    #[test]
    fn test_reservation_dropped_removes_placeholder() {
        let tmp = TempDir::new().unwrap();
        let path = {
            let reserved = reserve_output_path(&tmp.path().join("out"), "mp4").unwrap();
            reserved.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_committed_reservation_survives() {
        let tmp = TempDir::new().unwrap();
        let reserved = reserve_output_path(&tmp.path().join("out"), "mp4").unwrap();
        let path = reserved.commit();
        assert_eq!(path, tmp.path().join("out.mp4"));
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_reservations_never_collide() {
        let tmp = TempDir::new().unwrap();
        let desired = tmp.path().join("race");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let desired = desired.clone();
                std::thread::spawn(move || reserve_output_path(&desired, "mp4").unwrap().commit())
            })
            .collect();

        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn test_reserve_in_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let err = reserve_output_path(&tmp.path().join("nope").join("out"), "mp4").unwrap_err();
        assert!(matches!(err, RainmakerError::OutputPath(_)));
    }
}

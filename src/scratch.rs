use std::path::{Path, PathBuf};

/// Working files for a single video request.
///
/// Paths are derived from the Telegram file ID, so concurrent requests
/// never collide. Dropping the value removes whichever files exist,
/// making cleanup idempotent when trimming was skipped or a step failed
/// partway through.
pub struct ScratchFiles {
    source: PathBuf,
    trimmed: PathBuf,
}

impl ScratchFiles {
    pub fn new(dir: &Path, file_id: &str) -> Self {
        Self {
            source: dir.join(format!("{}.mp4", file_id)),
            trimmed: dir.join(format!("trimmed_{}.mp4", file_id)),
        }
    }

    /// Where the downloaded video is written.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Where the trimmed video is encoded.
    pub fn trimmed(&self) -> &Path {
        &self.trimmed
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.source, &self.trimmed] {
            if path.exists() {
                if let Err(err) = std::fs::remove_file(path) {
                    tracing::error!(
                        "unable to remove scratch file {}: {:?}",
                        path.display(),
                        err
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScratchFiles;

    #[test]
    fn test_paths_follow_naming_convention() {
        let dir = std::path::Path::new("/tmp/scratch");
        let scratch = ScratchFiles::new(dir, "AgADBAADb6gxG5tq");

        assert_eq!(
            scratch.source(),
            dir.join("AgADBAADb6gxG5tq.mp4"),
            "source file should be named by file id"
        );
        assert_eq!(
            scratch.trimmed(),
            dir.join("trimmed_AgADBAADb6gxG5tq.mp4"),
            "trimmed file should add the trimmed prefix"
        );
    }

    #[test]
    fn test_drop_removes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFiles::new(dir.path(), "file-id");

        std::fs::write(scratch.source(), b"source").unwrap();
        std::fs::write(scratch.trimmed(), b"trimmed").unwrap();

        let (source, trimmed) = (scratch.source().to_owned(), scratch.trimmed().to_owned());
        drop(scratch);

        assert!(!source.exists(), "source file should have been removed");
        assert!(!trimmed.exists(), "trimmed file should have been removed");
    }

    #[test]
    fn test_drop_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFiles::new(dir.path(), "file-id");

        // Only the source exists, as when a video was too short to trim.
        std::fs::write(scratch.source(), b"source").unwrap();

        let source = scratch.source().to_owned();
        drop(scratch);

        assert!(!source.exists());
    }
}

//! Per-request scratch files with guaranteed cleanup.

use std::path::{Path, PathBuf};

/// On-disk scratch file removed when the guard is dropped.
///
/// The scratch directory is shared across concurrent requests; collisions
/// are avoided by embedding the file id in the scratch filename. Dropping
/// the guard deletes the file on every exit path, success or failure.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Write `bytes` to a fresh scratch file named after the file id.
    pub async fn create(
        dir: &Path,
        file_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{file_id}-{filename}"));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Scratch file written");
        Ok(Self { path })
    }

    /// Take ownership of a file produced by a tool (e.g. a converted PDF)
    /// so it is deleted alongside the original scratch file.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove scratch file");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "Scratch file removed");
        }
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::ArchiveError;

/// Trait for archive directory providers.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Piece cids with a pre-staged archive in long-term storage.
    async fn staged_pieces(&self) -> Result<Vec<String>, ArchiveError>;

    /// Path of the long-term archive for `piece_cid`, if one exists.
    ///
    /// A pure existence probe; no content verification.
    async fn local_archive(&self, piece_cid: &str) -> Option<PathBuf>;

    /// Destination path for a fresh retrieval of `piece_cid`.
    fn download_path(&self, piece_cid: &str) -> PathBuf;
}

/// Filesystem-backed archive store.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    longterm_dir: PathBuf,
    download_dir: PathBuf,
}

impl FsArchiveStore {
    pub fn new(longterm_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            longterm_dir: longterm_dir.into(),
            download_dir: download_dir.into(),
        }
    }

    fn car_path(dir: &Path, piece_cid: &str) -> PathBuf {
        dir.join(format!("{piece_cid}.car"))
    }
}

#[async_trait]
impl ArchiveStore for FsArchiveStore {
    async fn staged_pieces(&self) -> Result<Vec<String>, ArchiveError> {
        let dir = self.longterm_dir.clone();
        let entries = tokio::task::spawn_blocking(move || std::fs::read_dir(&dir))
            .await
            .map_err(|e| ArchiveError::DirUnreadable {
                dir: self.longterm_dir.display().to_string(),
                source: std::io::Error::other(e),
            })?
            .map_err(|e| ArchiveError::DirUnreadable {
                dir: self.longterm_dir.display().to_string(),
                source: e,
            })?;

        let mut pieces = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("car") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                pieces.push(stem.to_string());
            }
        }
        Ok(pieces)
    }

    async fn local_archive(&self, piece_cid: &str) -> Option<PathBuf> {
        let path = Self::car_path(&self.longterm_dir, piece_cid);
        path.exists().then_some(path)
    }

    fn download_path(&self, piece_cid: &str) -> PathBuf {
        Self::car_path(&self.download_dir, piece_cid)
    }
}

//! Local photo album: `<root>/EventPhotos/event-<id>/`.

use async_trait::async_trait;
use snapfind_core::{EventId, PhotoDescriptor, PhotoStore, StorageError};
use std::io;
use std::path::{Path, PathBuf};

pub const ALBUM_NAME: &str = "EventPhotos";

const PROBE_FILE: &str = ".snapfind-write-probe";

pub struct AlbumStore {
    dir: PathBuf,
}

impl AlbumStore {
    pub fn new(root: impl AsRef<Path>, event: &EventId) -> Self {
        Self {
            dir: root
                .as_ref()
                .join(ALBUM_NAME)
                .join(format!("event-{}", event.as_str())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Target path for a photo, avoiding existing files.
    fn target_for(&self, photo: &PhotoDescriptor, bytes: &[u8]) -> PathBuf {
        let ext = image::guess_format(bytes)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("jpg");
        let stem = format!("photo_{}", sanitize(&photo.id.to_string()));

        let path = self.dir.join(format!("{stem}.{ext}"));
        if !path.exists() {
            return path;
        }
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
        self.dir.join(format!("{stem}_{stamp}.{ext}"))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn storage_error(path: &Path, e: io::Error) -> StorageError {
    let detail = format!("{}: {e}", path.display());
    match e.kind() {
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(detail),
        _ => StorageError::Write(detail),
    }
}

#[async_trait]
impl PhotoStore for AlbumStore {
    async fn ensure_write_access(&mut self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, e))?;

        let probe = self.dir.join(PROBE_FILE);
        tokio::fs::write(&probe, b"")
            .await
            .map_err(|e| storage_error(&probe, e))?;
        let _ = tokio::fs::remove_file(&probe).await;

        tracing::debug!(dir = %self.dir.display(), "album writable");
        Ok(())
    }

    async fn save(&mut self, photo: &PhotoDescriptor, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.target_for(photo, bytes);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| storage_error(&path, e))?;
        tracing::info!(photo = %photo.id, path = %path.display(), "photo written");
        Ok(path.display().to_string())
    }
}

// src/services/asset_store.rs
use crate::errors::PostfitError;
use log::warn;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Public URL prefix for optimized images.
pub const MEDIA_PREFIX: &str = "/media/optimized";

/// Filesystem home for optimized images and their caption sidecars.
#[derive(Debug, Clone)]
pub struct AssetStore {
    output_root: PathBuf,
    caption_root: PathBuf,
}

impl AssetStore {
    pub fn new(output_root: impl Into<PathBuf>, caption_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            caption_root: caption_root.into(),
        }
    }

    pub async fn ensure_dirs(&self) -> Result<(), PostfitError> {
        for dir in [&self.output_root, &self.caption_root] {
            fs::create_dir_all(dir).await.map_err(|e| {
                PostfitError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn image_path(&self, filename: &str) -> Result<PathBuf, PostfitError> {
        Ok(self.output_root.join(checked_name(filename)?))
    }

    pub fn caption_path(&self, filename: &str) -> Result<PathBuf, PostfitError> {
        Ok(self.caption_root.join(checked_name(filename)?))
    }

    pub fn public_url(filename: &str) -> String {
        format!("{}/{}", MEDIA_PREFIX, filename)
    }

    pub async fn save(&self, path: &Path, data: &[u8]) -> Result<(), PostfitError> {
        write_atomic(path, data).await
    }

    pub async fn save_text(&self, path: &Path, text: &str) -> Result<(), PostfitError> {
        write_atomic(path, text.as_bytes()).await
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, PostfitError> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PostfitError::NotFound(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )),
            Err(e) => Err(PostfitError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Looks up a served image by bare filename.
    pub async fn read_optimized(&self, filename: &str) -> Result<Vec<u8>, PostfitError> {
        let path = self
            .image_path(filename)
            .map_err(|_| PostfitError::NotFound(filename.to_string()))?;
        if !self.exists(&path).await {
            warn!("File not found: {}", path.display());
            return Err(PostfitError::NotFound(filename.to_string()));
        }
        self.read(&path).await
    }
}

/// Only plain, visible file names are allowed into the store.
fn checked_name(filename: &str) -> Result<&str, PostfitError> {
    let plain = !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        && Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
    if plain {
        Ok(filename)
    } else {
        Err(PostfitError::Validation(format!(
            "Invalid asset name: {:?}",
            filename
        )))
    }
}

/// Writes to a hidden sibling and renames it into place, so readers see
/// either the whole file or nothing.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), PostfitError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PostfitError::Io(format!("Invalid target path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", name));

    if let Err(e) = fs::write(&tmp, data).await {
        return Err(PostfitError::Io(format!(
            "Failed to write {}: {}",
            tmp.display(),
            e
        )));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!("Error removing temporary file {}: {}", tmp.display(), cleanup);
        }
        return Err(PostfitError::Io(format!(
            "Failed to move {} into place: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

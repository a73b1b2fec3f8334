//! Getting source rasters onto disk: user uploads and the default example pair.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RoadSegError};
use crate::storage::{sanitize_file_name, staging_path, Storage};
use crate::traits::RemoteFetcher;

/// Declared content types accepted as TIFF uploads.
pub const TIFF_MIME_TYPES: &[&str] = &["image/tiff", "image/tif", "image/x-tiff"];

/// A file received from the upload control.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Whether the declared type is a TIFF variant. Parameters such as
    /// `; charset=` are ignored.
    pub fn is_tiff(&self) -> bool {
        is_tiff_mime(&self.content_type)
    }
}

pub fn is_tiff_mime(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    TIFF_MIME_TYPES.contains(&essence.as_str())
}

/// Rejects non-TIFF uploads, otherwise writes the bytes to the original area
/// and returns the stored path. The name is reduced to its last component.
pub fn store_upload(storage: &Storage, upload: &Upload) -> Result<PathBuf> {
    if !upload.is_tiff() {
        return Err(RoadSegError::UnsupportedUpload {
            file_name: upload.file_name.clone(),
            content_type: upload.content_type.clone(),
        });
    }
    storage.ensure_dirs()?;
    let path = storage.original_path(&upload.file_name)?;

    let partial = staging_path(&path, "upload");
    fs::write(&partial, &upload.bytes)
        .map_err(|e| RoadSegError::file_system(&partial, "save upload", e))?;
    fs::rename(&partial, &path).map_err(|e| RoadSegError::file_system(&path, "move upload into place", e))?;

    tracing::info!(path = %path.display(), bytes = upload.bytes.len(), "upload saved");
    Ok(path)
}

/// The pre-designated example scene and its pre-computed road mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPair {
    pub before_id: String,
    pub after_id: String,
    pub before_name: String,
    pub after_name: String,
}

impl DefaultPair {
    pub fn new(before_id: impl Into<String>, after_id: impl Into<String>) -> Self {
        Self {
            before_id: before_id.into(),
            after_id: after_id.into(),
            before_name: "monsia.tif".to_string(),
            after_name: "roadsmonsiamerquator_1.tif".to_string(),
        }
    }

    pub fn before_path(&self, storage: &Storage) -> PathBuf {
        storage.defaults_dir().join(&self.before_name)
    }

    pub fn after_path(&self, storage: &Storage) -> PathBuf {
        storage.defaults_dir().join(&self.after_name)
    }
}

/// Downloads whichever default rasters are not on disk yet and returns the
/// `(before, after)` paths. A failed download is logged and leaves its path
/// missing; the caller must tolerate that.
pub fn acquire_defaults(
    storage: &Storage,
    fetcher: &dyn RemoteFetcher,
    defaults: &DefaultPair,
) -> Result<(PathBuf, PathBuf)> {
    storage.ensure_dirs()?;
    let before = defaults.before_path(storage);
    let after = defaults.after_path(storage);

    for (id, path) in [(&defaults.before_id, &before), (&defaults.after_id, &after)] {
        if path.is_file() {
            continue;
        }
        if let Err(err) = fetcher.fetch(id, path) {
            tracing::warn!(id = %id, path = %path.display(), error = %err, "default raster unavailable");
        }
    }
    Ok((before, after))
}

/// Notice shown when an upload is not a TIFF.
pub fn rejection_notice(upload: &Upload) -> String {
    let name = sanitize_file_name(&upload.file_name).unwrap_or_else(|_| upload.file_name.clone());
    format!(
        "Please upload a .tif file ({name} was sent as `{}`)",
        upload.content_type
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockFetcher;
    use tempfile::TempDir;

    fn upload(name: &str, content_type: &str) -> Upload {
        Upload {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: b"II*\0".to_vec(),
        }
    }

    #[test]
    fn test_tiff_mime_types() {
        assert!(is_tiff_mime("image/tiff"));
        assert!(is_tiff_mime("image/tif"));
        assert!(is_tiff_mime("IMAGE/TIFF; application=geotiff"));
        assert!(is_tiff_mime("image/x-tiff"));
        assert!(!is_tiff_mime("image/png"));
        assert!(!is_tiff_mime("application/octet-stream"));
        assert!(!is_tiff_mime(""));
    }

    #[test]
    fn test_store_upload_keeps_final_component() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path());

        let path = store_upload(&storage, &upload("../../scene.tif", "image/tiff"))?;
        assert_eq!(path, storage.original_dir().join("scene.tif"));
        assert_eq!(fs::read(&path)?, b"II*\0");
        Ok(())
    }

    #[test]
    fn test_store_upload_rejects_other_types() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path());

        let result = store_upload(&storage, &upload("scene.png", "image/png"));
        assert!(matches!(result, Err(RoadSegError::UnsupportedUpload { .. })));
        assert!(!storage.original_dir().exists());
        Ok(())
    }

    #[test]
    fn test_defaults_fetched_once() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path());
        let defaults = DefaultPair::new("before-id", "after-id");
        let fetcher = MockFetcher::new(true);

        let (before, after) = acquire_defaults(&storage, &fetcher, &defaults)?;
        assert!(before.is_file() && after.is_file());
        acquire_defaults(&storage, &fetcher, &defaults)?;
        assert_eq!(fetcher.fetched(), vec!["before-id", "after-id"]);
        Ok(())
    }

    #[test]
    fn test_unreachable_defaults_leave_missing_paths() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path());
        let defaults = DefaultPair::new("before-id", "after-id");

        let (before, after) = acquire_defaults(&storage, &MockFetcher::new(false), &defaults)?;
        assert!(!before.exists());
        assert!(!after.exists());
        assert!(storage.original_dir().is_dir());
        Ok(())
    }

    #[test]
    fn test_rejection_notice_names_file() {
        let notice = rejection_notice(&upload("maps/photo.png", "image/png"));
        assert!(notice.starts_with("Please upload a .tif file"));
        assert!(notice.contains("photo.png"));
    }
}

//! Local storage areas for original and processed rasters.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, RoadSegError};

const ORIGINAL_DIR: &str = "original";
const OUTPUT_DIR: &str = "output";
const DEFAULTS_DIR: &str = "defaults";
const SESSIONS_DIR: &str = "sessions";
const MANIFEST_FILE: &str = "catalog.json";

/// Root of one storage area. The process-wide area is the configured root;
/// `for_session` scopes a separate area per session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_session(&self, session_id: &str) -> Result<Self> {
        let id = sanitize_file_name(session_id)?;
        Ok(Self::new(self.root.join(SESSIONS_DIR).join(id)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn original_dir(&self) -> PathBuf {
        self.root.join(ORIGINAL_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn defaults_dir(&self) -> PathBuf {
        self.root.join(DEFAULTS_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn original_path(&self, file_name: &str) -> Result<PathBuf> {
        Ok(self.original_dir().join(sanitize_file_name(file_name)?))
    }

    pub fn output_path(&self, file_name: &str) -> Result<PathBuf> {
        Ok(self.output_dir().join(sanitize_file_name(file_name)?))
    }

    /// Creates the storage directories if they are absent.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.original_dir(), self.output_dir(), self.defaults_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| RoadSegError::file_system(&dir, "create storage directory", e))?;
        }
        Ok(())
    }

    /// Resolves a `<area>/<file>` path served over HTTP to a file inside
    /// this storage, refusing anything outside the three areas.
    pub fn resolve(&self, area: &str, file_name: &str) -> Option<PathBuf> {
        let dir = match area {
            ORIGINAL_DIR => self.original_dir(),
            OUTPUT_DIR => self.output_dir(),
            DEFAULTS_DIR => self.defaults_dir(),
            _ => return None,
        };
        let name = sanitize_file_name(file_name).ok()?;
        (name == file_name).then(|| dir.join(name))
    }
}

/// Reduces an uploaded file name to its final path component, rejecting
/// names with nothing usable left.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let candidate = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(RoadSegError::Validation {
            field: "file name".to_string(),
            reason: format!("`{name}` has no usable final component"),
        });
    }
    Ok(candidate.to_string())
}

/// Sibling path `<file>.<suffix>` used to stage a write before renaming it
/// over `destination`.
pub fn staging_path(destination: &Path, suffix: &str) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let storage = Storage::new("/srv/roads");
        assert_eq!(storage.original_dir(), PathBuf::from("/srv/roads/original"));
        assert_eq!(storage.output_dir(), PathBuf::from("/srv/roads/output"));
        assert_eq!(storage.manifest_path(), PathBuf::from("/srv/roads/catalog.json"));
        assert_eq!(
            storage.output_path("scene.tif").unwrap(),
            PathBuf::from("/srv/roads/output/scene.tif")
        );
    }

    #[test]
    fn test_staging_path_is_sibling() {
        assert_eq!(
            staging_path(Path::new("/data/output/scene.tif"), "partial"),
            PathBuf::from("/data/output/scene.tif.partial")
        );
    }

    #[test]
    fn test_session_scoping() -> Result<()> {
        let storage = Storage::new("/srv/roads");
        let session = storage.for_session("a1b2")?;
        assert_eq!(session.original_dir(), PathBuf::from("/srv/roads/sessions/a1b2/original"));
        assert_ne!(session.original_dir(), storage.original_dir());
        Ok(())
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("scene.tif").unwrap(), "scene.tif");
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\maps\\scene.tif").unwrap(), "scene.tif");
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("dir/").is_err());
        assert!(sanitize_file_name("..").is_err());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let storage = Storage::new("/srv/roads");
        assert_eq!(
            storage.resolve("output", "scene.tif"),
            Some(PathBuf::from("/srv/roads/output/scene.tif"))
        );
        assert_eq!(storage.resolve("output", "../catalog.json"), None);
        assert_eq!(storage.resolve("sessions", "scene.tif"), None);
    }

    #[test]
    fn test_ensure_dirs_creates_areas() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path().join("nested").join("store"));
        storage.ensure_dirs()?;
        assert!(storage.original_dir().is_dir());
        assert!(storage.output_dir().is_dir());
        assert!(storage.defaults_dir().is_dir());
        Ok(())
    }
}

//! State behind the split-map page: which pair sits on either side of the
//! divider and what the last acquisition had to say.

use std::path::PathBuf;
use std::sync::Arc;

use crate::acquisition::{acquire_defaults, rejection_notice, store_upload, DefaultPair, Upload};
use crate::catalog::{self, PairRecord};
use crate::errors::{Result, RoadSegError};
use crate::pipeline::SegmentationPipeline;
use crate::presentation::SplitMapView;
use crate::storage::Storage;
use crate::traits::RemoteFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Processed(PairRecord),
    Rejected { notice: String },
}

pub struct Dashboard {
    pipeline: SegmentationPipeline,
    fetcher: Arc<dyn RemoteFetcher>,
    defaults: DefaultPair,
    current: Option<(PathBuf, PathBuf)>,
    notice: Option<String>,
}

impl Dashboard {
    pub fn new(pipeline: SegmentationPipeline, fetcher: Arc<dyn RemoteFetcher>, defaults: DefaultPair) -> Self {
        Self {
            pipeline,
            fetcher,
            defaults,
            current: None,
            notice: None,
        }
    }

    pub fn storage(&self) -> &Storage {
        self.pipeline.storage()
    }

    /// Stores and segments an upload. A non-TIFF upload is turned away with a
    /// notice before anything touches storage or the model.
    pub fn upload(&mut self, upload: Upload) -> Result<UploadOutcome> {
        if !upload.is_tiff() {
            let notice = rejection_notice(&upload);
            tracing::info!(file = %upload.file_name, content_type = %upload.content_type, "upload rejected");
            self.notice = Some(notice.clone());
            return Ok(UploadOutcome::Rejected { notice });
        }

        let stored = store_upload(self.storage(), &upload)?;
        let file_name = stored
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RoadSegError::Validation {
                field: stored.display().to_string(),
                reason: "has no UTF-8 file name".to_string(),
            })?
            .to_string();

        let pair = self.pipeline.process_stored(&file_name)?;
        self.current = Some((pair.original.clone(), pair.output.clone()));
        self.notice = None;
        Ok(UploadOutcome::Processed(pair))
    }

    /// Builds the view for a page load, fetching the default pair first when
    /// nothing has been uploaded yet.
    pub fn page_load(&mut self) -> Result<SplitMapView> {
        if self.current.is_none() {
            acquire_defaults(self.storage(), self.fetcher.as_ref(), &self.defaults)?;
        }
        self.view()
    }

    /// Current view without triggering any acquisition.
    pub fn view(&self) -> Result<SplitMapView> {
        let storage = self.storage();
        storage.ensure_dirs()?;
        let scan = catalog::scan(storage);
        let pairs = catalog::complete_pairs(storage).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "pair manifest unreadable, showing no pairs");
            Vec::new()
        });

        let split = match &self.current {
            Some((left, right)) => (left.clone(), right.clone()),
            None => (self.defaults.before_path(storage), self.defaults.after_path(storage)),
        };
        Ok(SplitMapView::new(
            storage,
            &scan,
            pairs,
            Some((split.0.as_path(), split.1.as_path())),
            self.notice.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interpolation;
    use crate::mocks::{write_test_raster, MockFetcher, MockSegmentationModel};
    use std::fs;
    use tempfile::TempDir;

    fn dashboard(root: &std::path::Path, model: Arc<MockSegmentationModel>, reachable: bool) -> Dashboard {
        let pipeline = SegmentationPipeline::new(model, Storage::new(root), Interpolation::Bilinear);
        Dashboard::new(
            pipeline,
            Arc::new(MockFetcher::new(reachable)),
            DefaultPair::new("before-id", "after-id"),
        )
    }

    fn tiff_upload(dir: &std::path::Path, name: &str) -> Upload {
        let path = dir.join(name);
        write_test_raster(&path, 24, 16, 3).unwrap();
        Upload {
            file_name: name.to_string(),
            content_type: "image/tiff".to_string(),
            bytes: fs::read(&path).unwrap(),
        }
    }

    #[test]
    fn test_first_load_shows_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut dashboard = dashboard(temp_dir.path(), Arc::new(MockSegmentationModel::new(32)), true);

        let view = dashboard.page_load()?;
        let left = view.left.unwrap();
        assert_eq!(left.name, "monsia.tif");
        assert!(left.available);
        assert_eq!(left.url.as_deref(), Some("/rasters/defaults/monsia.tif"));
        assert!(view.right.unwrap().available);
        assert!(view.original_layers.is_empty());
        Ok(())
    }

    #[test]
    fn test_upload_replaces_split() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model = Arc::new(MockSegmentationModel::new(32));
        let mut dashboard = dashboard(&temp_dir.path().join("store"), Arc::clone(&model), true);

        let outcome = dashboard.upload(tiff_upload(temp_dir.path(), "scene.tif"))?;
        assert!(matches!(outcome, UploadOutcome::Processed(_)));
        assert_eq!(model.calls(), 1);

        let view = dashboard.page_load()?;
        assert_eq!(view.left.unwrap().url.as_deref(), Some("/rasters/original/scene.tif"));
        assert_eq!(view.right.unwrap().url.as_deref(), Some("/rasters/output/scene.tif"));
        assert_eq!(view.pairs.len(), 1);
        assert_eq!(view.notice, None);
        Ok(())
    }

    #[test]
    fn test_rejected_upload_changes_nothing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model = Arc::new(MockSegmentationModel::new(32));
        let mut dashboard = dashboard(temp_dir.path(), Arc::clone(&model), false);
        let before = dashboard.view()?;

        let outcome = dashboard.upload(Upload {
            file_name: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        })?;

        let UploadOutcome::Rejected { notice } = outcome else {
            panic!("png upload was accepted");
        };
        assert_eq!(model.calls(), 0);
        let after = dashboard.view()?;
        assert_eq!(after.original_layers, before.original_layers);
        assert_eq!(after.processed_layers, before.processed_layers);
        assert_eq!(after.notice, Some(notice));
        Ok(())
    }

    #[test]
    fn test_corrupt_manifest_still_renders() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut dashboard = dashboard(temp_dir.path(), Arc::new(MockSegmentationModel::new(32)), true);
        dashboard.storage().ensure_dirs()?;
        fs::write(dashboard.storage().manifest_path(), b"{ not json")?;

        let view = dashboard.page_load()?;
        assert!(view.pairs.is_empty());
        assert!(view.left.unwrap().available);
        Ok(())
    }

    #[test]
    fn test_unreachable_defaults_still_render() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut dashboard = dashboard(temp_dir.path(), Arc::new(MockSegmentationModel::new(32)), false);

        let view = dashboard.page_load()?;
        assert!(view.original_layers.is_empty());
        assert!(view.processed_layers.is_empty());
        assert!(!view.left.unwrap().available);
        assert!(!view.right.unwrap().available);
        Ok(())
    }
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::catalog::{self, is_raster_file, PairRecord};
use crate::config::Interpolation;
use crate::errors::{Result, RoadSegError};
use crate::inference::predict_from_raster;
use crate::raster::RasterInfo;
use crate::storage::Storage;
use crate::traits::RoadSegmentationModel;
use crate::writer::create_tiff_with_metadata;

/// Inference adapter plus georeferenced writer over one storage area.
pub struct SegmentationPipeline {
    model: Arc<dyn RoadSegmentationModel>,
    storage: Storage,
    interpolation: Interpolation,
}

/// Outcome of a directory run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<PairRecord>,
    pub failed: Vec<(PathBuf, String)>,
}

impl SegmentationPipeline {
    pub fn new(
        model: Arc<dyn RoadSegmentationModel>,
        storage: Storage,
        interpolation: Interpolation,
    ) -> Self {
        Self {
            model,
            storage,
            interpolation,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Segments `original` and writes the georeferenced mask to `output`.
    pub fn process(&self, original: &Path, output: &Path) -> Result<RasterInfo> {
        let _span = tracing::info_span!("segment", original = %original.display()).entered();
        let mask = predict_from_raster(self.model.as_ref(), original)?;
        create_tiff_with_metadata(original, &mask, output, self.interpolation)
    }

    /// Segments a raster already in the original area and records the pair.
    pub fn process_stored(&self, file_name: &str) -> Result<PairRecord> {
        self.storage.ensure_dirs()?;
        let original = self.storage.original_path(file_name)?;
        let output = self.storage.output_path(file_name)?;
        self.process(&original, &output)?;
        catalog::record_pair(&self.storage, file_name, &original, &output)
    }

    /// Copies every raster under `input_dir` into the original area and
    /// segments it. Failures are collected per file; the run continues.
    ///
    /// Files are keyed by name in the original area, so a second file with a
    /// name already seen in this run is reported as failed instead of
    /// overwriting the first. Input directories overlapping the output or
    /// defaults areas are refused.
    pub fn process_directory(&self, input_dir: &Path) -> Result<BatchSummary> {
        if !input_dir.is_dir() {
            return Err(RoadSegError::FileSystem {
                path: input_dir.to_path_buf(),
                operation: "read input directory".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "input directory does not exist"),
            });
        }
        self.storage.ensure_dirs()?;
        self.check_input_dir(input_dir)?;

        let mut files = WalkDir::new(input_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_raster_file(e.path()))
            .map(|e| e.into_path())
            .collect::<Vec<_>>();
        files.sort();

        let mut summary = BatchSummary::default();
        if files.is_empty() {
            tracing::warn!(dir = %input_dir.display(), "no rasters to process");
            return Ok(summary);
        }

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| RoadSegError::Configuration {
                message: e.to_string(),
            })?
            .progress_chars("#>-"),
        );

        let mut seen = HashSet::new();
        for file in files {
            let name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            if !seen.insert(name) {
                tracing::warn!(file = %file.display(), "duplicate file name in batch, skipped");
                summary
                    .failed
                    .push((file, "duplicate file name in this batch".to_string()));
                pb.inc(1);
                continue;
            }
            match self.import_and_process(&file) {
                Ok(pair) => summary.processed.push(pair),
                Err(err) => {
                    tracing::error!(file = %file.display(), error = %err, "segmentation failed");
                    summary.failed.push((file, err.to_string()));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        tracing::info!(
            processed = summary.processed.len(),
            failed = summary.failed.len(),
            "batch complete"
        );
        Ok(summary)
    }

    fn check_input_dir(&self, input_dir: &Path) -> Result<()> {
        let canonical = |path: &Path| {
            path.canonicalize()
                .map_err(|e| RoadSegError::file_system(path, "resolve directory", e))
        };
        let input = canonical(input_dir)?;
        let root = canonical(self.storage.root())?;
        let reserved = [canonical(&self.storage.output_dir())?, canonical(&self.storage.defaults_dir())?];

        if root.starts_with(&input) || reserved.iter().any(|dir| input.starts_with(dir)) {
            return Err(RoadSegError::Validation {
                field: input_dir.display().to_string(),
                reason: "overlaps the storage output or defaults area".to_string(),
            });
        }
        Ok(())
    }

    fn import_and_process(&self, file: &Path) -> Result<PairRecord> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RoadSegError::Validation {
                field: file.display().to_string(),
                reason: "has no UTF-8 file name".to_string(),
            })?;
        let original = self.storage.original_path(name)?;
        if original != file {
            std::fs::copy(file, &original)
                .map_err(|e| RoadSegError::file_system(&original, "copy into original area", e))?;
        }
        self.process_stored(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_mock_model, write_test_raster, FailingModel};
    use std::fs;
    use tempfile::TempDir;

    fn pipeline(root: &Path) -> SegmentationPipeline {
        SegmentationPipeline::new(
            Arc::new(create_mock_model()),
            Storage::new(root),
            Interpolation::Bilinear,
        )
    }

    #[test]
    fn test_process_stored_records_pair() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let pipeline = pipeline(temp_dir.path());
        pipeline.storage().ensure_dirs()?;
        write_test_raster(&pipeline.storage().original_path("scene.tif")?, 40, 20, 3)?;

        let pair = pipeline.process_stored("scene.tif")?;
        assert_eq!(pair.output, pipeline.storage().output_path("scene.tif")?);
        assert_eq!(catalog::complete_pairs(pipeline.storage())?, vec![pair]);
        Ok(())
    }

    #[test]
    fn test_failed_inference_writes_nothing() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let storage = Storage::new(temp_dir.path());
        storage.ensure_dirs()?;
        write_test_raster(&storage.original_path("scene.tif")?, 8, 8, 3)?;
        let pipeline = SegmentationPipeline::new(Arc::new(FailingModel), storage, Interpolation::Nearest);

        assert!(pipeline.process_stored("scene.tif").is_err());
        assert!(catalog::scan(pipeline.storage()).outputs.is_empty());
        assert!(catalog::load_pairs(pipeline.storage())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_process_directory_collects_failures() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("incoming");
        fs::create_dir_all(input.join("sub"))?;
        write_test_raster(&input.join("a.tif"), 12, 12, 3)?;
        write_test_raster(&input.join("sub").join("b.tiff"), 9, 7, 1)?;
        fs::write(input.join("broken.tif"), b"not a tiff")?;
        fs::write(input.join("readme.txt"), b"ignored")?;

        let pipeline = pipeline(&temp_dir.path().join("store"));
        let summary = pipeline.process_directory(&input)?;

        assert_eq!(summary.processed.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.ends_with("broken.tif"));
        assert_eq!(catalog::scan(pipeline.storage()).outputs.len(), 2);
        Ok(())
    }

    #[test]
    fn test_duplicate_names_do_not_overwrite() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("incoming");
        for sub in ["a", "b"] {
            fs::create_dir_all(input.join(sub))?;
            write_test_raster(&input.join(sub).join("scene.tif"), 10, 10, 3)?;
        }

        let pipeline = pipeline(&temp_dir.path().join("store"));
        let summary = pipeline.process_directory(&input)?;

        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.ends_with("b/scene.tif"));
        assert_eq!(catalog::scan(pipeline.storage()).originals.len(), 1);
        assert_eq!(catalog::complete_pairs(pipeline.storage())?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_storage_overlap_is_refused() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let pipeline = pipeline(&temp_dir.path().join("store"));
        pipeline.storage().ensure_dirs()?;
        write_test_raster(&pipeline.storage().output_path("x.tif")?, 6, 6, 1)?;

        for input in [
            temp_dir.path().to_path_buf(),
            pipeline.storage().root().to_path_buf(),
            pipeline.storage().output_dir(),
        ] {
            assert!(matches!(
                pipeline.process_directory(&input),
                Err(RoadSegError::Validation { .. })
            ));
        }
        assert!(catalog::scan(pipeline.storage()).originals.is_empty());
        Ok(())
    }

    #[test]
    fn test_original_area_can_be_reprocessed() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let pipeline = pipeline(temp_dir.path());
        pipeline.storage().ensure_dirs()?;
        write_test_raster(&pipeline.storage().original_path("scene.tif")?, 8, 8, 3)?;

        let summary = pipeline.process_directory(&pipeline.storage().original_dir())?;
        assert_eq!(summary.processed.len(), 1);
        assert!(summary.failed.is_empty());
        Ok(())
    }

    #[test]
    fn test_process_directory_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(temp_dir.path());
        assert!(matches!(
            pipeline.process_directory(&temp_dir.path().join("absent")),
            Err(RoadSegError::FileSystem { .. })
        ));
    }
}

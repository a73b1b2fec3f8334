//! Writes a prediction mask as a single-band GeoTIFF registered like its source.

use std::fs;
use std::path::Path;

use crate::config::Interpolation;
use crate::errors::{Result, RoadSegError};
use crate::inference::PredictionMask;
use crate::raster::{self, RasterInfo};
use crate::storage::staging_path;

/// Resamples `mask` to the geometry of the raster at `original`, quantizes it
/// to `u8` and writes it to `destination` with the original's georeference.
///
/// The file is written under a temporary name and renamed into place, so a
/// failure never leaves a partial output behind.
pub fn create_tiff_with_metadata(
    original: &Path,
    mask: &PredictionMask,
    destination: &Path,
    interpolation: Interpolation,
) -> Result<RasterInfo> {
    let source = raster::inspect(original)?;
    let resized = mask.resized(source.width, source.height, interpolation)?;
    let data = resized.quantize();

    let partial = staging_path(destination, "partial");
    let written = raster::write_u8(
        &partial,
        source.width,
        source.height,
        1,
        &data,
        &source.georeference,
    )
    .and_then(|()| {
        fs::rename(&partial, destination)
            .map_err(|e| RoadSegError::file_system(destination, "move output into place", e))
    });
    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    tracing::info!(
        original = %original.display(),
        output = %destination.display(),
        width = source.width,
        height = source.height,
        crs = %source.crs().map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
        "georeferenced mask written"
    );

    raster::inspect(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoReference, GeoTransform};
    use crate::mocks::{test_georeference, write_test_raster};
    use crate::raster::{Raster, SampleType};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn mask(size: usize, value: f32) -> PredictionMask {
        PredictionMask::new(Array2::from_elem((size, size), value))
    }

    #[test]
    fn test_output_matches_original_geometry() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let original = temp_dir.path().join("scene.tif");
        let output = temp_dir.path().join("scene_mask.tif");
        write_test_raster(&original, 50, 30, 3)?;

        let info = create_tiff_with_metadata(&original, &mask(16, 0.75), &output, Interpolation::Bilinear)?;
        let source = raster::inspect(&original)?;

        assert_eq!((info.width, info.height), (50, 30));
        assert_eq!(info.bands, 1);
        assert_eq!(info.sample_type, SampleType::U8);
        assert_eq!(info.transform(), source.transform());
        assert_eq!(info.crs(), source.crs());
        assert_eq!(info.georeference, test_georeference());
        assert!(!staging_path(&output, "partial").exists());
        Ok(())
    }

    #[test]
    fn test_output_pixels_are_quantized_mask() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let original = temp_dir.path().join("scene.tif");
        let output = temp_dir.path().join("out.tif");
        write_test_raster(&original, 8, 8, 1)?;

        create_tiff_with_metadata(&original, &mask(4, 0.5), &output, Interpolation::Nearest)?;
        let raster = Raster::open(&output)?;
        assert!(raster.pixels.iter().all(|&v| v == 127.0));
        Ok(())
    }

    #[test]
    fn test_model_transformation_is_preserved() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let original = temp_dir.path().join("rotated.tif");
        let output = temp_dir.path().join("rotated_out.tif");
        let geo = GeoReference {
            transformation: Some(vec![
                0.5, 0.1, 0.0, 300000.0, //
                0.1, -0.5, 0.0, 4000000.0, //
                0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0,
            ]),
            ..GeoReference::from_transform(GeoTransform::north_up(0.0, 0.0, 1.0, 1.0), 32631)
        };
        let geo = GeoReference {
            pixel_scale: None,
            tiepoints: None,
            ..geo
        };
        raster::write_u8(&original, 6, 4, 1, &[10; 24], &geo)?;

        let info = create_tiff_with_metadata(&original, &mask(3, 0.2), &output, Interpolation::Bilinear)?;
        assert_eq!(info.georeference, geo);
        assert_eq!(info.crs().and_then(|c| c.epsg), Some(32631));
        Ok(())
    }

    #[test]
    fn test_missing_original_fails_without_output() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let output = temp_dir.path().join("out.tif");
        let result = create_tiff_with_metadata(
            &temp_dir.path().join("missing.tif"),
            &mask(4, 0.5),
            &output,
            Interpolation::Bilinear,
        );
        assert!(result.is_err());
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_unwritable_destination_fails() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let original = temp_dir.path().join("scene.tif");
        write_test_raster(&original, 4, 4, 1)?;

        let destination = temp_dir.path().join("no_such_dir").join("out.tif");
        let result = create_tiff_with_metadata(&original, &mask(4, 0.5), &destination, Interpolation::Bilinear);
        assert!(matches!(result, Err(RoadSegError::FileSystem { .. })));
        Ok(())
    }
}

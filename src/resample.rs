//! Single-band resampling between the model grid and the raster grid.

use image::{imageops, imageops::FilterType, ImageBuffer, Luma};
use ndarray::Array2;

use crate::config::Interpolation;
use crate::errors::Result;

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
        }
    }
}

/// Resamples a `(height, width)` grid of values in `[0, 1]` to the requested
/// size. The image filters clamp `f32` samples into `[0, 1]`, so inputs must
/// already be normalized.
pub fn resample(
    grid: &Array2<f32>,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> Result<Array2<f32>> {
    let (rows, cols) = grid.dim();
    if (cols as u32, rows as u32) == (width, height) {
        return Ok(grid.clone());
    }

    let samples = grid.as_standard_layout().iter().copied().collect::<Vec<_>>();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, samples).ok_or_else(|| {
            crate::RoadSegError::DimensionMismatch {
                width: cols as u32,
                height: rows as u32,
                expected: rows * cols,
                actual: grid.len(),
            }
        })?;

    let resized = imageops::resize(&buffer, width, height, interpolation.filter());
    Ok(Array2::from_shape_vec(
        (height as usize, width as usize),
        resized.into_raw(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_same_size_is_identity() -> Result<()> {
        let grid = array![[0.0, 0.25], [0.5, 1.0]];
        assert_eq!(resample(&grid, 2, 2, Interpolation::Bilinear)?, grid);
        Ok(())
    }

    #[test]
    fn test_nearest_upscale_replicates_cells() -> Result<()> {
        let grid = array![[0.0, 1.0], [1.0, 0.0]];
        let out = resample(&grid, 4, 4, Interpolation::Nearest)?;
        assert_eq!(out.dim(), (4, 4));
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 3]], 1.0);
        assert_eq!(out[[3, 0]], 1.0);
        assert_eq!(out[[3, 3]], 0.0);
        Ok(())
    }

    #[test]
    fn test_bilinear_stays_in_unit_range() -> Result<()> {
        let grid = Array2::from_shape_fn((7, 5), |(r, c)| ((r * 5 + c) % 3) as f32 / 2.0);
        let out = resample(&grid, 13, 29, Interpolation::Bilinear)?;
        assert_eq!(out.dim(), (29, 13));
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
        Ok(())
    }

    #[test]
    fn test_constant_grid_downscale() -> Result<()> {
        let grid = Array2::from_elem((16, 16), 0.5f32);
        let out = resample(&grid, 3, 5, Interpolation::Bilinear)?;
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-5));
        Ok(())
    }
}

//! Raster → tensor → probability mask.

use std::path::Path;

use ndarray::prelude::*;
use rayon::prelude::*;

use crate::config::{Interpolation, TensorLayout};
use crate::errors::{Result, RoadSegError};
use crate::raster::Raster;
use crate::resample::resample;
use crate::traits::RoadSegmentationModel;

/// Per-pixel road probability at the model's output resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionMask {
    probabilities: Array2<f32>,
}

impl PredictionMask {
    /// Wraps a `(height, width)` grid, clamping every value into `[0, 1]`.
    /// NaN reads as background.
    pub fn new(mut probabilities: Array2<f32>) -> Self {
        probabilities.mapv_inplace(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) });
        Self { probabilities }
    }

    /// Extracts the first channel of the model output tensor.
    pub fn from_output(output: Array4<f32>, layout: TensorLayout) -> Result<Self> {
        let channel_axis = match layout {
            TensorLayout::Nhwc => Axis(3),
            TensorLayout::Nchw => Axis(1),
        };
        if output.shape()[0] == 0 || output.len_of(channel_axis) == 0 {
            return Err(RoadSegError::Validation {
                field: "model output".to_string(),
                reason: format!("has empty shape {:?}", output.shape()),
            });
        }
        let grid = output
            .index_axis(Axis(0), 0)
            .index_axis(Axis(channel_axis.index() - 1), 0)
            .to_owned();
        Ok(Self::new(grid))
    }

    pub fn width(&self) -> u32 {
        self.probabilities.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.probabilities.nrows() as u32
    }

    pub fn probabilities(&self) -> ArrayView2<'_, f32> {
        self.probabilities.view()
    }

    /// Resamples to `width` × `height`.
    pub fn resized(&self, width: u32, height: u32, interpolation: Interpolation) -> Result<Self> {
        resample(&self.probabilities, width, height, interpolation).map(Self::new)
    }

    /// `(p * 255)` truncated to `u8`, row-major.
    pub fn quantize(&self) -> Vec<u8> {
        self.probabilities.iter().map(|&p| quantize(p)).collect()
    }
}

/// Maps a probability onto `0..=255`. Monotonic non-decreasing in `p`.
pub fn quantize(p: f32) -> u8 {
    (p.clamp(0.0, 1.0) * 255.0) as u8
}

/// Reads the raster at `path` and runs the model over it.
pub fn predict_from_raster(model: &dyn RoadSegmentationModel, path: &Path) -> Result<PredictionMask> {
    let raster = Raster::open(path)?;
    predict(model, &raster)
}

pub fn predict(model: &dyn RoadSegmentationModel, raster: &Raster) -> Result<PredictionMask> {
    let tensor = preprocess(raster, model)?;
    let _span = tracing::debug_span!("forward_pass", shape = ?tensor.shape()).entered();
    let output = model.predict(tensor.view())?;
    PredictionMask::from_output(output, model.layout())
}

/// Builds the batch-of-one input tensor: channel selection, normalization to
/// `[0, 1]`, bilinear resampling to the model grid, then layout.
pub fn preprocess(raster: &Raster, model: &dyn RoadSegmentationModel) -> Result<Array4<f32>> {
    let (width, height) = model.input_size();
    let bands = raster.info.bands;
    let channels = model.input_channels().unwrap_or(bands);
    if bands == 0 || channels == 0 {
        return Err(RoadSegError::Validation {
            field: "raster".to_string(),
            reason: "must contain at least one band".to_string(),
        });
    }

    let scale = normalization_scale(raster);
    let planes = (0..channels)
        .into_par_iter()
        .map(|c| {
            // extra model channels repeat the last band
            let band = raster.pixels.index_axis(Axis(2), c.min(bands - 1));
            let plane = band.mapv(|v| (v / scale).clamp(0.0, 1.0));
            resample(&plane, width, height, Interpolation::Bilinear)
        })
        .collect::<Result<Vec<_>>>()?;

    let views = planes.iter().map(|p| p.view()).collect::<Vec<_>>();
    let axis = match model.layout() {
        TensorLayout::Nhwc => Axis(2),
        TensorLayout::Nchw => Axis(0),
    };
    let stacked = ndarray::stack(axis, &views)?;
    Ok(stacked.insert_axis(Axis(0)))
}

/// Divisor that maps the raster's samples into `[0, 1]`: the sample type's
/// maximum for integers, the observed maximum for floats that exceed 1.
fn normalization_scale(raster: &Raster) -> f32 {
    match raster.info.sample_type.full_scale() {
        Some(scale) => scale,
        None => raster.max_value().max(1.0),
    }
}

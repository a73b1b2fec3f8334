use std::path::Path;

use ndarray::prelude::*;
use parking_lot::Mutex;

use crate::config::TensorLayout;
use crate::errors::{Result, RoadSegError};
use crate::geo::{GeoReference, GeoTransform, EPSG_WGS84};
use crate::traits::{RemoteFetcher, RoadSegmentationModel};

/// Stand-in model for tests: predicts the per-pixel mean of the input
/// channels, so brighter pixels read as "road".
#[derive(Debug)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub channels: Option<usize>,
    pub layout: TensorLayout,
    calls: Mutex<usize>,
}

impl MockSegmentationModel {
    pub const fn new(image_size: u32) -> Self {
        Self {
            image_size,
            channels: Some(3),
            layout: TensorLayout::Nhwc,
            calls: Mutex::new(0),
        }
    }

    pub const fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    pub const fn with_channels(mut self, channels: Option<usize>) -> Self {
        self.channels = channels;
        self
    }

    /// Number of forward passes run so far.
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl RoadSegmentationModel for MockSegmentationModel {
    fn input_size(&self) -> (u32, u32) {
        (self.image_size, self.image_size)
    }

    fn input_channels(&self) -> Option<usize> {
        self.channels
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        *self.calls.lock() += 1;
        let channel_axis = match self.layout {
            TensorLayout::Nhwc => Axis(3),
            TensorLayout::Nchw => Axis(1),
        };
        let mean = tensor
            .mean_axis(channel_axis)
            .ok_or_else(|| RoadSegError::Validation {
                field: "tensor".to_string(),
                reason: "has no channels".to_string(),
            })?;
        Ok(mean.insert_axis(channel_axis))
    }
}

/// Model whose forward pass always fails.
#[derive(Debug, Default)]
pub struct FailingModel;

impl RoadSegmentationModel for FailingModel {
    fn input_size(&self) -> (u32, u32) {
        (8, 8)
    }

    fn input_channels(&self) -> Option<usize> {
        None
    }

    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }

    fn predict(&self, _tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        Err(RoadSegError::Model {
            operation: "forward pass".to_string(),
            source: "mock failure".into(),
        })
    }
}

/// Fetcher that writes a small georeferenced raster for every id, or fails
/// for every id when `reachable` is false.
#[derive(Debug)]
pub struct MockFetcher {
    pub reachable: bool,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub const fn new(reachable: bool) -> Self {
        Self {
            reachable,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl RemoteFetcher for MockFetcher {
    fn fetch(&self, id: &str, destination: &Path) -> Result<()> {
        self.fetched.lock().push(id.to_string());
        if !self.reachable {
            return Err(RoadSegError::Fetch {
                url: format!("mock://{id}"),
                source: "host unreachable".into(),
            });
        }
        write_test_raster(destination, 16, 16, 3)
    }
}

/// Writes a gradient raster in WGS84 anchored at (2.0E, 6.5N).
pub fn write_test_raster(path: &Path, width: u32, height: u32, bands: usize) -> Result<()> {
    let data: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .flat_map(|(x, y)| {
            let value = ((x + y) * 255 / (width + height).saturating_sub(2).max(1)).min(255) as u8;
            std::iter::repeat(value).take(bands)
        })
        .collect();
    crate::raster::write_u8(path, width, height, bands, &data, &test_georeference())
}

pub fn test_georeference() -> GeoReference {
    GeoReference::from_transform(GeoTransform::north_up(2.0, 6.5, 0.0001, 0.0001), EPSG_WGS84)
}

pub const fn create_mock_model() -> MockSegmentationModel {
    MockSegmentationModel::new(256)
}

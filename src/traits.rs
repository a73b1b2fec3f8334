use std::path::Path;

use ndarray::prelude::*;

use crate::config::TensorLayout;
use crate::errors::Result;

/// Pre-trained segmentation model behind the inference adapter.
///
/// Loaded once and shared read-only; implementations must be safe to call
/// from any thread.
pub trait RoadSegmentationModel: Send + Sync {
    /// Fixed spatial input size `(width, height)` the model consumes.
    fn input_size(&self) -> (u32, u32);

    /// Channel count the model declares, `None` when the dimension is dynamic.
    fn input_channels(&self) -> Option<usize>;

    /// Axis order of input and output tensors.
    fn layout(&self) -> TensorLayout;

    /// Forward pass on a batch tensor, returns the raw probability tensor.
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

/// Retrieves a file identified by an opaque id from a remote content host.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, id: &str, destination: &Path) -> Result<()>;
}

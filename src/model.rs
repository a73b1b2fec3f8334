use std::path::Path;

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::{
    config::TensorLayout,
    errors::{Result, RoadSegError},
    traits::RoadSegmentationModel,
};

/// ONNX Runtime session wrapping the exported road segmentation network.
pub struct OnnxModel {
    image_size: u32,
    channels: Option<usize>,
    layout: TensorLayout,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxModel {
    /// Loads the model and runs one warm-up pass.
    ///
    /// `fallback_size` is used when the exported graph has a dynamic spatial
    /// dimension.
    pub fn new(
        model_path: &Path,
        device_id: i32,
        layout: TensorLayout,
        fallback_size: u32,
    ) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| RoadSegError::model("session builder init", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| RoadSegError::model("register execution providers", e))?
            .with_memory_pattern(true)
            .map_err(|e| RoadSegError::model("enable memory pattern", e))?
            .commit_from_file(model_path)
            .map_err(|e| RoadSegError::Model {
                operation: format!("load model file {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input = session.inputs.first().ok_or_else(|| RoadSegError::Validation {
            field: "model".to_string(),
            reason: "declares no inputs".to_string(),
        })?;
        let output = session.outputs.first().ok_or_else(|| RoadSegError::Validation {
            field: "model".to_string(),
            reason: "declares no outputs".to_string(),
        })?;
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let shape = input
            .input_type
            .tensor_shape()
            .ok_or_else(|| RoadSegError::Validation {
                field: "model input".to_string(),
                reason: "is not a tensor".to_string(),
            })?
            .to_vec();
        let (image_size, channels) = input_geometry(&shape, layout, fallback_size)?;

        tracing::info!(
            model = %model_path.display(),
            input = %input_name,
            output = %output_name,
            image_size,
            channels = ?channels,
            "model loaded"
        );

        // warm up
        let warmup = zeros(layout, image_size, channels.unwrap_or(3));
        session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&warmup)?])
            .map_err(|e| RoadSegError::model("warm-up run", e))?;

        Ok(Self {
            image_size,
            channels,
            layout,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl RoadSegmentationModel for OnnxModel {
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
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

/// Spatial size and channel count from a declared input shape. Dynamic
/// dimensions are reported by ONNX Runtime as `-1`.
fn input_geometry(
    shape: &[i64],
    layout: TensorLayout,
    fallback_size: u32,
) -> Result<(u32, Option<usize>)> {
    if shape.len() != 4 {
        return Err(RoadSegError::Validation {
            field: "model input".to_string(),
            reason: format!("has rank {}, expected 4", shape.len()),
        });
    }
    let (height, width, channels) = match layout {
        TensorLayout::Nhwc => (shape[1], shape[2], shape[3]),
        TensorLayout::Nchw => (shape[2], shape[3], shape[1]),
    };
    let size = match (height, width) {
        (h, w) if h > 0 && w > 0 && h != w => {
            return Err(RoadSegError::Validation {
                field: "model input".to_string(),
                reason: format!("is {w}x{h}, only square inputs are supported"),
            })
        }
        (h, _) if h > 0 => h as u32,
        (_, w) if w > 0 => w as u32,
        _ => fallback_size,
    };
    let channels = (channels > 0).then_some(channels as usize);
    Ok((size, channels))
}

fn zeros(layout: TensorLayout, size: u32, channels: usize) -> Array4<f32> {
    let size = size as usize;
    match layout {
        TensorLayout::Nhwc => Array4::zeros((1, size, size, channels)),
        TensorLayout::Nchw => Array4::zeros((1, channels, size, size)),
    }
}

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod fetch;
pub mod geo;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod presentation;
pub mod raster;
pub mod resample;
pub mod server;
pub mod storage;
pub mod traits;
pub mod writer;

pub mod mocks;

pub use acquisition::{DefaultPair, Upload};
pub use catalog::{CatalogScan, PairRecord};
pub use config::{Config, Interpolation, TensorLayout};
pub use dashboard::{Dashboard, UploadOutcome};
pub use errors::{Result, RoadSegError};
pub use fetch::HttpFetcher;
pub use geo::{Crs, GeoReference, GeoTransform};
pub use inference::PredictionMask;
pub use model::OnnxModel;
pub use pipeline::SegmentationPipeline;
pub use presentation::SplitMapView;
pub use raster::{Raster, RasterInfo};
pub use storage::Storage;
pub use traits::*;
pub use writer::create_tiff_with_metadata;

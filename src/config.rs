use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Image id of the default "before" scene on the remote content host.
pub const DEFAULT_BEFORE_ID: &str = "1NSS_Xsv48fSucMtNHfqolP1R3HK7gK7O";
/// Image id of the pre-computed road mask for the default scene.
pub const DEFAULT_AFTER_ID: &str = "10PeRkH6LU5AUxnCtSUUnrJ8mOa_30elb";
pub const DEFAULT_DOWNLOAD_URL: &str = "https://drive.google.com/uc?id={id}";

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Road segmentation dashboard for GeoTIFF imagery", long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// ONNX export of the road segmentation model
    #[arg(short, long, global = true, default_value = "unet_model_3k.onnx")]
    pub model_path: PathBuf,

    /// Root of the original/output/defaults storage areas
    #[arg(short, long, global = true, default_value = "uploaded_files")]
    pub storage_dir: PathBuf,

    #[arg(short, long, global = true, default_value_t = 0)]
    pub device_id: i32,

    /// Axis order of the model tensors
    #[arg(long, global = true, value_enum, default_value_t = TensorLayout::Nhwc)]
    pub layout: TensorLayout,

    /// Input size used when the model declares a dynamic spatial shape
    #[arg(long, global = true, default_value_t = 256)]
    pub model_input_size: u32,

    /// Resampling used to bring the mask back to the raster resolution
    #[arg(long, global = true, value_enum, default_value_t = Interpolation::Bilinear)]
    pub interpolation: Interpolation,

    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Serve the split-map dashboard
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: IpAddr,

        #[arg(short, long, default_value_t = 8501)]
        port: u16,

        #[arg(long, default_value = DEFAULT_BEFORE_ID)]
        before_id: String,

        #[arg(long, default_value = DEFAULT_AFTER_ID)]
        after_id: String,

        /// Download URL template, `{id}` is replaced by the image id
        #[arg(long, default_value = DEFAULT_DOWNLOAD_URL, value_parser = check_url_template)]
        download_url: String,
    },

    /// Segment one raster and write the georeferenced mask
    Predict {
        input: PathBuf,

        /// Defaults to the output area of the storage directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Segment every TIFF under a directory and register the pairs
    Batch { input_dir: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `(batch, height, width, channels)`, as exported from Keras
    #[default]
    Nhwc,
    /// `(batch, channels, height, width)`
    Nchw,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

fn check_url_template(s: &str) -> Result<String, String> {
    if !s.contains("{id}") {
        return Err(format!("`{s}` must contain the `{{id}}` placeholder"));
    }
    if !(s.starts_with("http://") || s.starts_with("https://")) {
        return Err(format!("`{s}` is not an http(s) URL"));
    }
    Ok(s.to_string())
}

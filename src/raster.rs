//! GeoTIFF reading and writing on top of the `tiff` crate.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array3;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::errors::{Result, RoadSegError};
use crate::geo::{Crs, GeoReference, GeoTransform};

/// Sample type of the stored pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl SampleType {
    /// Value that maps to 1.0 when normalizing, `None` for floating point.
    pub fn full_scale(self) -> Option<f32> {
        match self {
            Self::U8 => Some(u8::MAX as f32),
            Self::U16 => Some(u16::MAX as f32),
            Self::U32 => Some(u32::MAX as f32),
            Self::I8 => Some(i8::MAX as f32),
            Self::I16 => Some(i16::MAX as f32),
            Self::I32 => Some(i32::MAX as f32),
            Self::F32 | Self::F64 => None,
        }
    }
}

/// Shape and referencing of a raster, without pixel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    pub width: u32,
    pub height: u32,
    pub bands: usize,
    pub sample_type: SampleType,
    pub georeference: GeoReference,
}

impl RasterInfo {
    pub fn transform(&self) -> Option<GeoTransform> {
        self.georeference.transform()
    }

    pub fn crs(&self) -> Option<Crs> {
        self.georeference.crs()
    }
}

/// A decoded raster. Pixels are `f32` in `(height, width, band)` order, i.e.
/// row-major and pixel-interleaved, holding the original sample values.
#[derive(Debug, Clone)]
pub struct Raster {
    pub info: RasterInfo,
    pub pixels: Array3<f32>,
}

impl Raster {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        let info = read_info(path, &mut decoder)?;

        let (samples, sample_type) = match decoder
            .read_image()
            .map_err(|e| RoadSegError::raster(path, "read pixels", e))?
        {
            DecodingResult::U8(v) => (widen(&v), SampleType::U8),
            DecodingResult::U16(v) => (widen(&v), SampleType::U16),
            DecodingResult::U32(v) => (widen(&v), SampleType::U32),
            DecodingResult::I8(v) => (widen(&v), SampleType::I8),
            DecodingResult::I16(v) => (widen(&v), SampleType::I16),
            DecodingResult::I32(v) => (widen(&v), SampleType::I32),
            DecodingResult::F32(v) => (v, SampleType::F32),
            DecodingResult::F64(v) => (widen(&v), SampleType::F64),
            _ => return Err(unsupported(path, "64-bit integer samples".to_string())),
        };

        let shape = (info.height as usize, info.width as usize, info.bands);
        let expected = shape.0 * shape.1 * shape.2;
        if samples.len() != expected {
            return Err(RoadSegError::DimensionMismatch {
                width: info.width,
                height: info.height,
                expected,
                actual: samples.len(),
            });
        }
        let pixels = Array3::from_shape_vec(shape, samples)?;

        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            bands = info.bands,
            "raster decoded"
        );

        Ok(Self {
            info: RasterInfo { sample_type, ..info },
            pixels,
        })
    }

    /// Largest sample value, used to normalize floating point rasters.
    pub fn max_value(&self) -> f32 {
        self.pixels.iter().copied().fold(0.0, f32::max)
    }
}

/// Reads the shape and georeference without decoding the pixels.
pub fn read_info(path: &Path, decoder: &mut Decoder<BufReader<File>>) -> Result<RasterInfo> {
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| RoadSegError::raster(path, "read dimensions", e))?;

    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(|e| RoadSegError::raster(path, "read planar configuration", e))?;
    if planar == Some(2) {
        return Err(unsupported(path, "planar-separate sample layout".to_string()));
    }

    let color = decoder
        .colortype()
        .map_err(|e| RoadSegError::raster(path, "read color type", e))?;
    let bands = match color {
        ColorType::Gray(_) | ColorType::Palette(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        ColorType::Multiband { num_samples, .. } => num_samples as usize,
        other => return Err(unsupported(path, format!("color type {other:?}"))),
    };
    if bands == 0 {
        return Err(RoadSegError::Validation {
            field: path.display().to_string(),
            reason: "has no bands".to_string(),
        });
    }

    let sample_type = sample_type_of(path, decoder, color)?;
    let georeference = read_georeference(path, decoder)?;

    Ok(RasterInfo {
        width,
        height,
        bands,
        sample_type,
        georeference,
    })
}

/// Opens a raster and returns its metadata only.
pub fn inspect(path: impl AsRef<Path>) -> Result<RasterInfo> {
    let path = path.as_ref();
    let mut decoder = open_decoder(path)?;
    read_info(path, &mut decoder)
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| RoadSegError::file_system(path, "open raster", e))?;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| RoadSegError::raster(path, "open decoder", e))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn sample_type_of(
    path: &Path,
    decoder: &mut Decoder<BufReader<File>>,
    color: ColorType,
) -> Result<SampleType> {
    let bits = match color {
        ColorType::Gray(b)
        | ColorType::GrayA(b)
        | ColorType::RGB(b)
        | ColorType::RGBA(b)
        | ColorType::CMYK(b)
        | ColorType::YCbCr(b)
        | ColorType::Palette(b) => b,
        ColorType::Multiband { bit_depth, .. } => bit_depth,
        other => return Err(unsupported(path, format!("color type {other:?}"))),
    };
    // SampleFormat: 1 = unsigned, 2 = signed, 3 = IEEE float.
    let format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)
        .map_err(|e| RoadSegError::raster(path, "read sample format", e))?
        .and_then(|v| v.first().copied())
        .unwrap_or(1);

    Ok(match (format, bits) {
        (1, 8) => SampleType::U8,
        (1, 16) => SampleType::U16,
        (1, 32) => SampleType::U32,
        (2, 8) => SampleType::I8,
        (2, 16) => SampleType::I16,
        (2, 32) => SampleType::I32,
        (3, 32) => SampleType::F32,
        (3, 64) => SampleType::F64,
        _ => {
            return Err(unsupported(
                path,
                format!("{bits}-bit samples with sample format {format}"),
            ))
        }
    })
}

fn read_georeference(path: &Path, decoder: &mut Decoder<BufReader<File>>) -> Result<GeoReference> {
    let mut f64_tag = |tag: Tag| -> Result<Option<Vec<f64>>> {
        decoder
            .find_tag(tag)
            .and_then(|value| value.map(|v| v.into_f64_vec()).transpose())
            .map_err(|e| RoadSegError::raster(path, "read geotiff tag", e))
    };
    let pixel_scale = f64_tag(Tag::ModelPixelScaleTag)?;
    let tiepoints = f64_tag(Tag::ModelTiepointTag)?;
    let transformation = f64_tag(Tag::ModelTransformationTag)?;
    let geo_double_params = f64_tag(Tag::GeoDoubleParamsTag)?;

    let geo_key_directory = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)
        .and_then(|value| value.map(|v| v.into_u16_vec()).transpose())
        .map_err(|e| RoadSegError::raster(path, "read geokey directory", e))?;
    let geo_ascii_params = decoder
        .find_tag(Tag::GeoAsciiParamsTag)
        .and_then(|value| value.map(|v| v.into_string()).transpose())
        .map_err(|e| RoadSegError::raster(path, "read geo ascii params", e))?;

    Ok(GeoReference {
        pixel_scale,
        tiepoints,
        transformation,
        geo_key_directory,
        geo_double_params,
        geo_ascii_params,
    })
}

fn widen<T: AsPrimitive<f32>>(samples: &[T]) -> Vec<f32> {
    samples.iter().map(|v| v.as_()).collect()
}

fn unsupported(path: &Path, what: String) -> RoadSegError {
    RoadSegError::Raster {
        path: path.display().to_string(),
        operation: "decode".to_string(),
        source: what.into(),
    }
}

/// Writes an 8-bit raster with 1, 3 or 4 interleaved bands and stamps it with
/// `georeference`. `data` must hold exactly `width * height * bands` samples.
pub fn write_u8(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    bands: usize,
    data: &[u8],
    georeference: &GeoReference,
) -> Result<()> {
    let path = path.as_ref();
    let expected = width as usize * height as usize * bands;
    if data.len() != expected {
        return Err(RoadSegError::DimensionMismatch {
            width,
            height,
            expected,
            actual: data.len(),
        });
    }

    let file = File::create(path).map_err(|e| RoadSegError::file_system(path, "create raster", e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))
        .map_err(|e| RoadSegError::raster(path, "create encoder", e))?;

    match bands {
        1 => write_image::<colortype::Gray8>(path, &mut encoder, width, height, data, georeference),
        3 => write_image::<colortype::RGB8>(path, &mut encoder, width, height, data, georeference),
        4 => write_image::<colortype::RGBA8>(path, &mut encoder, width, height, data, georeference),
        n => Err(RoadSegError::Validation {
            field: "bands".to_string(),
            reason: format!("{n}-band 8-bit output is not supported"),
        }),
    }
}

fn write_image<C>(
    path: &Path,
    encoder: &mut TiffEncoder<BufWriter<File>>,
    width: u32,
    height: u32,
    data: &[u8],
    georeference: &GeoReference,
) -> Result<()>
where
    C: colortype::ColorType<Inner = u8>,
{
    let mut image = encoder
        .new_image::<C>(width, height)
        .map_err(|e| RoadSegError::raster(path, "start image", e))?;

    let tags = image.encoder();
    let mut write = |result: tiff::TiffResult<()>| {
        result.map_err(|e| RoadSegError::raster(path, "write geotiff tag", e))
    };
    if let Some(v) = &georeference.pixel_scale {
        write(tags.write_tag(Tag::ModelPixelScaleTag, &v[..]))?;
    }
    if let Some(v) = &georeference.tiepoints {
        write(tags.write_tag(Tag::ModelTiepointTag, &v[..]))?;
    }
    if let Some(v) = &georeference.transformation {
        write(tags.write_tag(Tag::ModelTransformationTag, &v[..]))?;
    }
    if let Some(v) = &georeference.geo_key_directory {
        write(tags.write_tag(Tag::GeoKeyDirectoryTag, &v[..]))?;
    }
    if let Some(v) = &georeference.geo_double_params {
        write(tags.write_tag(Tag::GeoDoubleParamsTag, &v[..]))?;
    }
    if let Some(v) = &georeference.geo_ascii_params {
        write(tags.write_tag(Tag::GeoAsciiParamsTag, v.as_str()))?;
    }

    image
        .write_data(data)
        .map_err(|e| RoadSegError::raster(path, "write pixels", e))
}

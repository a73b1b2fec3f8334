//! GeoTIFF spatial referencing.
//!
//! The georeference is kept as the raw GeoTIFF tag payloads so an output
//! raster can be stamped with exactly what the original carried. The affine
//! transform and CRS are derived views over those payloads.

use serde::{Deserialize, Serialize};

/// GeoKey ids used to identify the coordinate reference system.
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const GT_CITATION_GEO_KEY: u16 = 1026;

/// `user-defined` marker in GeoKey values.
const USER_DEFINED: u16 = 32767;

pub const EPSG_WGS84: u16 = 4326;

/// Six-parameter affine transform in GDAL order:
/// `x = c[0] + col * c[1] + row * c[2]`, `y = c[3] + col * c[4] + row * c[5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform with the given top-left origin and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height])
    }
}

/// Coordinate reference system as read from the GeoKey directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: Option<u16>,
    pub citation: Option<String>,
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.epsg, &self.citation) {
            (Some(code), _) => write!(f, "EPSG:{code}"),
            (None, Some(citation)) => f.write_str(citation),
            (None, None) => f.write_str("unknown"),
        }
    }
}

/// Raw GeoTIFF tag payloads of one raster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoints: Option<Vec<f64>>,
    pub transformation: Option<Vec<f64>>,
    pub geo_key_directory: Option<Vec<u16>>,
    pub geo_double_params: Option<Vec<f64>>,
    pub geo_ascii_params: Option<String>,
}

impl GeoReference {
    /// Builds a north-up georeference in the given EPSG code, as written by
    /// GDAL for a plain `PixelIsArea` raster.
    pub fn from_transform(transform: GeoTransform, epsg: u16) -> Self {
        let [origin_x, pixel_w, _, origin_y, _, pixel_h] = transform.0;
        let geographic = (4000..5000).contains(&epsg);
        let (model_type, crs_key) = if geographic {
            (2, GEOGRAPHIC_TYPE_GEO_KEY)
        } else {
            (1, PROJECTED_CS_TYPE_GEO_KEY)
        };
        Self {
            pixel_scale: Some(vec![pixel_w, -pixel_h, 0.0]),
            tiepoints: Some(vec![0.0, 0.0, 0.0, origin_x, origin_y, 0.0]),
            transformation: None,
            geo_key_directory: Some(vec![
                1, 1, 0, 3,
                GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
                1025, 0, 1, 1,
                crs_key, 0, 1, epsg,
            ]),
            geo_double_params: None,
            geo_ascii_params: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Affine transform derived from ModelTransformation, or from the first
    /// tiepoint plus pixel scale.
    pub fn transform(&self) -> Option<GeoTransform> {
        if let Some(m) = self.transformation.as_deref().filter(|m| m.len() >= 16) {
            return Some(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }

        let tie = self.tiepoints.as_deref().filter(|t| t.len() >= 6)?;
        let scale = self.pixel_scale.as_deref().filter(|s| s.len() >= 2)?;
        let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
        let (sx, sy) = (scale[0], scale[1]);
        Some(GeoTransform([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
    }

    /// CRS derived from the GeoKey directory.
    pub fn crs(&self) -> Option<Crs> {
        let dir = self.geo_key_directory.as_deref()?;
        if dir.len() < 4 {
            return None;
        }
        let key_count = dir[3] as usize;
        let entries = dir[4..].chunks_exact(4).take(key_count);

        let mut epsg = None;
        let mut citation = None;
        for entry in entries {
            let (key, location, count, value) = (entry[0], entry[1], entry[2], entry[3]);
            match key {
                PROJECTED_CS_TYPE_GEO_KEY if location == 0 && value != USER_DEFINED => {
                    epsg = Some(value);
                }
                GEOGRAPHIC_TYPE_GEO_KEY
                    if location == 0 && value != USER_DEFINED && epsg.is_none() =>
                {
                    epsg = Some(value);
                }
                GT_CITATION_GEO_KEY => citation = self.ascii_param(value, count),
                _ => {}
            }
        }
        Some(Crs { epsg, citation })
    }

    fn ascii_param(&self, offset: u16, count: u16) -> Option<String> {
        let ascii = self.geo_ascii_params.as_deref()?;
        let start = offset as usize;
        let end = (start + count as usize).min(ascii.len());
        ascii
            .get(start..end)
            .map(|s| s.trim_end_matches(['|', '\0']).to_string())
    }
}

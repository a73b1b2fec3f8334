//! Directory scan of the storage areas and the explicit pair manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::errors::{Result, RoadSegError};
use crate::storage::Storage;

/// Raster files currently present in the original and output areas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogScan {
    pub originals: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

/// One original raster and the mask produced from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRecord {
    pub id: String,
    pub original: PathBuf,
    pub output: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    pairs: BTreeMap<String, PairRecord>,
}

pub fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "tif" | "tiff"))
        .unwrap_or(false)
}

/// Lists `.tif`/`.tiff` files directly inside the original and output areas,
/// sorted by path. Missing directories read as empty.
pub fn scan(storage: &Storage) -> CatalogScan {
    CatalogScan {
        originals: list_rasters(&storage.original_dir()),
        outputs: list_rasters(&storage.output_dir()),
    }
}

fn list_rasters(dir: &Path) -> Vec<PathBuf> {
    let mut files = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_raster_file(e.path()))
        .map(|e| e.into_path())
        .collect::<Vec<_>>();
    files.sort();
    files
}

/// Loads the pair manifest of `storage`; an absent manifest is empty.
pub fn load_pairs(storage: &Storage) -> Result<Vec<PairRecord>> {
    Ok(read_manifest(&storage.manifest_path())?
        .pairs
        .into_values()
        .collect())
}

/// Pairs whose two files both still exist. Orphaned halves are skipped.
pub fn complete_pairs(storage: &Storage) -> Result<Vec<PairRecord>> {
    Ok(load_pairs(storage)?
        .into_iter()
        .filter(|pair| pair.original.is_file() && pair.output.is_file())
        .collect())
}

/// Records a finished pair. Both files must exist; the manifest is replaced
/// atomically so readers see either the old or the new set of pairs.
pub fn record_pair(storage: &Storage, id: &str, original: &Path, output: &Path) -> Result<PairRecord> {
    for path in [original, output] {
        if !path.is_file() {
            return Err(RoadSegError::Validation {
                field: path.display().to_string(),
                reason: "does not exist, refusing to record a partial pair".to_string(),
            });
        }
    }

    let manifest_path = storage.manifest_path();
    let mut manifest = read_manifest(&manifest_path)?;
    let record = PairRecord {
        id: id.to_string(),
        original: original.to_path_buf(),
        output: output.to_path_buf(),
        created_at: Utc::now(),
    };
    manifest.pairs.insert(record.id.clone(), record.clone());
    write_manifest(&manifest_path, &manifest)?;

    tracing::debug!(id, pairs = manifest.pairs.len(), "pair recorded");
    Ok(record)
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
        Err(e) => Err(RoadSegError::file_system(path, "read catalog manifest", e)),
    }
}

fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(manifest)?;
    fs::write(&tmp, bytes).map_err(|e| RoadSegError::file_system(&tmp, "write catalog manifest", e))?;
    fs::rename(&tmp, path).map_err(|e| RoadSegError::file_system(path, "replace catalog manifest", e))
}

//! Split-map view handed to the browser map widget.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogScan, PairRecord};
use crate::storage::Storage;

pub const BASEMAP: &str = "CartoDB.DarkMatter";

/// Map overlay group a layer belongs to, named after its storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerGroup {
    Original,
    Processed,
    Defaults,
}

impl LayerGroup {
    fn area(self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Processed => "output",
            Self::Defaults => "defaults",
        }
    }

    /// Group of a file sitting directly inside one of the storage areas.
    fn of(storage: &Storage, path: &Path) -> Option<Self> {
        let parent = path.parent()?;
        [
            (Self::Original, storage.original_dir()),
            (Self::Processed, storage.output_dir()),
            (Self::Defaults, storage.defaults_dir()),
        ]
        .into_iter()
        .find(|(_, dir)| dir.as_path() == parent)
        .map(|(group, _)| group)
    }
}

/// One raster layer as the map widget sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    /// `None` when the file lies outside storage.
    pub group: Option<LayerGroup>,
    /// URL the browser fetches the raster from, `None` when outside storage.
    pub url: Option<String>,
    pub available: bool,
}

impl Layer {
    pub fn new(storage: &Storage, path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let group = LayerGroup::of(storage, path);
        let url = group
            .zip(path.file_name().and_then(|n| n.to_str()))
            .map(|(group, file)| format!("/rasters/{}/{file}", group.area()));
        Self {
            group,
            url,
            available: path.is_file(),
            name,
            path: path.to_path_buf(),
        }
    }
}

/// Everything the split map renders: both layer groups, the two layers on
/// either side of the divider, and the notice from the last acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitMapView {
    pub basemap: String,
    pub original_layers: Vec<Layer>,
    pub processed_layers: Vec<Layer>,
    pub left: Option<Layer>,
    pub right: Option<Layer>,
    pub pairs: Vec<PairRecord>,
    pub notice: Option<String>,
}

impl SplitMapView {
    pub fn new(
        storage: &Storage,
        scan: &CatalogScan,
        pairs: Vec<PairRecord>,
        split: Option<(&Path, &Path)>,
        notice: Option<String>,
    ) -> Self {
        let layers = |paths: &[PathBuf]| paths.iter().map(|p| Layer::new(storage, p)).collect();
        Self {
            basemap: BASEMAP.to_string(),
            original_layers: layers(&scan.originals),
            processed_layers: layers(&scan.outputs),
            left: split.map(|(left, _)| Layer::new(storage, left)),
            right: split.map(|(_, right)| Layer::new(storage, right)),
            pairs,
            notice,
        }
    }
}

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Smart Infrastructure and Roads</title>
<meta name="viewport" content="width=device-width, initial-scale=1">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<link rel="stylesheet" href="https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.css">
<style>
  body { margin: 0; font-family: sans-serif; display: flex; height: 100vh; }
  aside { width: 280px; padding: 1rem; background: #f3f4f6; overflow-y: auto; }
  main { flex: 1; display: flex; flex-direction: column; }
  #map { flex: 1; min-height: 700px; }
  .notice { padding: .5rem; background: #fff4d6; border: 1px solid #e5c07b; margin: .5rem 0; }
  .empty { color: #6b7280; }
</style>
</head>
<body>
<aside>
  <h2>About</h2>
  <p>A SIR map. Upload a GeoTIFF to detect and segment roads; the predicted
  mask is written back with the scene's georeference and shown beside it.</p>
  <form id="upload" enctype="multipart/form-data">
    <label>Upload an image <input type="file" name="file" accept=".tif,.tiff"></label>
    <button type="submit">Segment</button>
  </form>
  <div id="notice"></div>
  <h3>Layers</h3>
  <ul id="layers"></ul>
</aside>
<main>
  <h1 style="margin:.5rem 1rem">Split-panel Map</h1>
  <div id="map"></div>
</main>
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<script src="https://unpkg.com/leaflet-side-by-side@2.2.0/leaflet-side-by-side.min.js"></script>
<script src="https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.js"></script>
<script src="https://unpkg.com/georaster@1.6.0/dist/georaster.browser.bundle.min.js"></script>
<script src="https://unpkg.com/georaster-layer-for-leaflet@3.10.0/dist/georaster-layer-for-leaflet.min.js"></script>
<script>
const view = __VIEW_JSON__;

function showNotice(text) {
  const box = document.getElementById("notice");
  box.innerHTML = "";
  if (text) {
    const div = document.createElement("div");
    div.className = "notice";
    div.textContent = text;
    box.appendChild(div);
  }
}
showNotice(view.notice);

const list = document.getElementById("layers");
const all = view.original_layers.concat(view.processed_layers);
if (all.length === 0) {
  list.innerHTML = '<li class="empty">No rasters yet</li>';
}
for (const layer of all) {
  const li = document.createElement("li");
  li.textContent = layer.name;
  list.appendChild(li);
}

const map = L.map("map").setView([0, 0], 2);
const tiles = "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png";
const tileOptions = {
  attribution: "&copy; OpenStreetMap contributors &copy; CARTO",
  subdomains: "abcd",
  maxZoom: 20,
};
const basemap = L.tileLayer(tiles, tileOptions).addTo(map);
new L.Control.MiniMap(L.tileLayer(tiles, tileOptions), { toggleDisplay: true }).addTo(map);

async function rasterLayer(layer) {
  if (!layer || !layer.available || !layer.url) return null;
  try {
    const response = await fetch(layer.url);
    const georaster = await parseGeoraster(await response.arrayBuffer());
    return new GeoRasterLayer({ georaster, opacity: 1, resolution: 256 });
  } catch (err) {
    console.warn("cannot render", layer.name, err);
    return null;
  }
}

async function overlayGroup(layers) {
  const group = L.layerGroup();
  for (const layer of layers) {
    const raster = await rasterLayer(layer);
    if (raster) group.addLayer(raster);
  }
  return group;
}

(async () => {
  const originals = await overlayGroup(view.original_layers);
  const processed = await overlayGroup(view.processed_layers);
  L.control.layers(
    { "CartoDB DarkMatter": basemap },
    { "original": originals, "processed": processed },
    { collapsed: false },
  ).addTo(map);

  const left = await rasterLayer(view.left);
  const right = await rasterLayer(view.right);
  const leftPane = left ? left.addTo(map) : basemap;
  const rightPane = right ? right.addTo(map) : basemap;
  if (left || right) {
    L.control.sideBySide(leftPane, rightPane).addTo(map);
    map.fitBounds((left || right).getBounds());
  }
})();

document.getElementById("upload").addEventListener("submit", async (event) => {
  event.preventDefault();
  showNotice("Segmenting...");
  const response = await fetch("/api/upload", { method: "POST", body: new FormData(event.target) });
  const body = await response.json();
  if (body.status === "processed") {
    window.location.reload();
  } else {
    showNotice(body.notice || body.message || "Upload failed");
  }
});
</script>
</body>
</html>
"#;

/// Renders the dashboard page with `view` embedded as JSON.
pub fn render_page(view: &SplitMapView) -> serde_json::Result<String> {
    let json = serde_json::to_string(view)?.replace("</", "<\\/");
    Ok(PAGE.replace("__VIEW_JSON__", &json))
}

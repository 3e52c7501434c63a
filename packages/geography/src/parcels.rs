//! Parcel dataset loading.
//!
//! A dataset is one local authority's cadastral parcel file. Only the
//! polygons matter; feature properties are ignored.

use std::path::{Path, PathBuf};
use std::process::Command;

use cambs_market_config::{ResolvedDataset, ensure_dir};
use cambs_market_spatial::{Crs, geometry_to_multipolygon};
use geo::Polygon;
use geojson::GeoJson;

use crate::GeoError;

/// Polygons loaded from one parcel dataset.
#[derive(Debug, Clone)]
pub struct ParcelSet {
    pub name: String,
    pub crs: Crs,
    pub polygons: Vec<Polygon<f64>>,
    /// Features without usable polygon geometry.
    pub skipped: usize,
}

/// Loads one parcel dataset.
///
/// `.gml` files are converted to `GeoJSON` under `cache_dir` with
/// `ogr2ogr` before parsing. A `crs` member in the `GeoJSON` overrides the
/// configured CRS.
///
/// # Errors
///
/// Returns [`GeoError`] if the file is missing, conversion fails, the
/// `GeoJSON` is malformed, or no polygons are found.
pub fn load_dataset(dataset: &ResolvedDataset, cache_dir: &Path) -> Result<ParcelSet, GeoError> {
    if !dataset.path.exists() {
        return Err(GeoError::MissingFile {
            name: dataset.name.clone(),
            path: dataset.path.display().to_string(),
        });
    }

    let geojson_path = if is_gml(&dataset.path) {
        convert_gml(&dataset.path, cache_dir, &dataset.name)?
    } else {
        dataset.path.clone()
    };

    let text = std::fs::read_to_string(&geojson_path).map_err(|source| GeoError::Io {
        path: geojson_path.display().to_string(),
        source,
    })?;

    let configured: Crs = dataset.crs.parse()?;
    let set = parse_parcels(&dataset.name, &text, configured)?;

    if set.polygons.is_empty() {
        return Err(GeoError::EmptyDataset {
            name: dataset.name.clone(),
        });
    }

    if set.skipped > 0 {
        log::info!(
            "{}: skipped {} features without polygon geometry",
            set.name,
            set.skipped
        );
    }

    Ok(set)
}

/// Parses parcel polygons out of a `GeoJSON` document.
///
/// # Errors
///
/// Returns [`GeoError::GeoJson`] if the text is not valid `GeoJSON`.
pub fn parse_parcels(name: &str, text: &str, configured: Crs) -> Result<ParcelSet, GeoError> {
    let geojson: GeoJson = text.parse()?;

    let mut crs = configured;
    let geometries: Vec<Option<geojson::Geometry>> = match geojson {
        GeoJson::FeatureCollection(fc) => {
            if let Some(declared) = declared_crs(fc.foreign_members.as_ref()) {
                if declared != configured {
                    log::warn!("{name}: file declares {declared}, overriding configured {configured}");
                }
                crs = declared;
            }
            fc.features.into_iter().map(|f| f.geometry).collect()
        }
        GeoJson::Feature(f) => vec![f.geometry],
        GeoJson::Geometry(g) => vec![Some(g)],
    };

    let mut polygons = Vec::new();
    let mut skipped = 0usize;

    for geometry in geometries {
        let Some(geometry) = geometry else {
            skipped += 1;
            continue;
        };

        let converted: Result<geo::Geometry<f64>, _> = geometry.try_into();
        match converted.ok().and_then(geometry_to_multipolygon) {
            Some(mp) => polygons.extend(mp.0),
            None => skipped += 1,
        }
    }

    Ok(ParcelSet {
        name: name.to_string(),
        crs,
        polygons,
        skipped,
    })
}

/// Reads the legacy `{"crs": {"properties": {"name": ...}}}` member that
/// `ogr2ogr` writes for non-WGS84 output.
fn declared_crs(foreign_members: Option<&geojson::JsonObject>) -> Option<Crs> {
    foreign_members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?
        .parse()
        .ok()
}

fn is_gml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gml"))
}

/// Converts a GML file to `GeoJSON` with `ogr2ogr`, keeping the source CRS.
fn convert_gml(path: &Path, cache_dir: &Path, name: &str) -> Result<PathBuf, GeoError> {
    ensure_dir(cache_dir).map_err(|source| GeoError::Io {
        path: cache_dir.display().to_string(),
        source,
    })?;

    let output_path = cache_dir.join(format!("{name}.geojson"));
    if output_path.exists() {
        log::info!("{name}: using cached conversion {}", output_path.display());
        return Ok(output_path);
    }

    log::info!("{name}: running ogr2ogr to convert GML to GeoJSON...");

    let status = Command::new("ogr2ogr")
        .arg("-f")
        .arg("GeoJSON")
        .arg(&output_path)
        .arg(path)
        .status()
        .map_err(|e| GeoError::ExternalTool {
            message: format!("could not run ogr2ogr: {e}"),
        })?;

    if !status.success() {
        // Don't leave a partial file behind for the cache check.
        std::fs::remove_file(&output_path).ok();
        return Err(GeoError::ExternalTool {
            message: format!("ogr2ogr exited with {status} for {}", path.display()),
        });
    }

    Ok(output_path)
}

//! Dissolving parcel datasets into one county boundary.

use std::path::Path;

use cambs_market_config::{ResolvedDataset, ensure_dir};
use cambs_market_spatial::CountyBoundary;
use geo::{MapCoords, Polygon, unary_union};

use crate::parcels::{ParcelSet, load_dataset};
use crate::GeoError;

/// Loads every dataset and unions their polygons into the county boundary.
///
/// A dataset that fails to load is logged and skipped.
///
/// # Errors
///
/// Returns [`GeoError::NoDatasetsLoaded`] if no dataset could be loaded, or
/// [`GeoError::Spatial`] if the datasets' CRSs cannot be reconciled.
pub fn build_boundary(
    datasets: &[ResolvedDataset],
    cache_dir: &Path,
) -> Result<CountyBoundary, GeoError> {
    log::info!(
        "Loading {} parcel datasets to build the county boundary...",
        datasets.len()
    );

    let mut loaded = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        match load_dataset(dataset, cache_dir) {
            Ok(set) => {
                log::info!(
                    " -> Loaded {} parcels for {} ({})",
                    set.polygons.len(),
                    set.name,
                    set.crs
                );
                loaded.push(set);
            }
            Err(e) => {
                log::warn!(" -> Could not load parcels for {}: {e}", dataset.name);
            }
        }
    }

    union_parcels(loaded)
}

/// Unions the polygons of all parcel sets.
///
/// The result is tagged with the first set's CRS; later sets in another CRS
/// are reprojected into it first. A set with a parcel that cannot be
/// reprojected is logged and skipped.
///
/// # Errors
///
/// Returns [`GeoError::NoDatasetsLoaded`] if no set contributes any parcels,
/// or [`GeoError::Spatial`] if the target projection cannot be built.
pub fn union_parcels(sets: Vec<ParcelSet>) -> Result<CountyBoundary, GeoError> {
    let Some(target) = sets.first().map(|s| s.crs) else {
        return Err(GeoError::NoDatasetsLoaded);
    };

    let mut pieces: Vec<Polygon<f64>> = Vec::new();
    for set in sets {
        let transform = set.crs.transform_to(target)?;
        let reprojected: Result<Vec<Polygon<f64>>, _> = set
            .polygons
            .iter()
            .map(|p| p.try_map_coords(|c| transform.apply(c)))
            .collect();

        match reprojected {
            Ok(polygons) => pieces.extend(polygons),
            Err(e) => {
                log::warn!(
                    " -> Skipping {}: cannot reproject {} to {target}: {e}",
                    set.name,
                    set.crs
                );
            }
        }
    }

    if pieces.is_empty() {
        return Err(GeoError::NoDatasetsLoaded);
    }

    log::info!(
        " -> Dissolving {} parcels into a single county shape...",
        pieces.len()
    );
    let boundary = CountyBoundary::new(unary_union(&pieces), target);
    log::info!(
        " -> County boundary created: {} part(s), area {:.0} (CRS {})",
        boundary.part_count(),
        boundary.area(),
        boundary.crs()
    );

    Ok(boundary)
}

/// Writes the boundary as `GeoJSON`.
///
/// # Errors
///
/// Returns [`GeoError`] if serialisation or the write fails.
pub fn write_boundary_geojson(boundary: &CountyBoundary, path: &Path) -> Result<(), GeoError> {
    let io_err = |source| GeoError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(io_err)?;
    }
    std::fs::write(path, boundary.to_geojson_string()?).map_err(io_err)?;

    log::info!("Boundary written to {}", path.display());
    Ok(())
}

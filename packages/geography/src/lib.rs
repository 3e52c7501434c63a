#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! County boundary construction.
//!
//! Loads the cadastral parcel file of each configured local authority,
//! concatenates their polygons and dissolves the internal boundaries into a
//! single county shape. INSPIRE GML downloads are converted to `GeoJSON`
//! with `ogr2ogr` first; `GeoJSON` files are read directly.

pub mod boundary;
pub mod parcels;

use cambs_market_spatial::SpatialError;
use thiserror::Error;

pub use boundary::{build_boundary, union_parcels, write_boundary_geojson};
pub use parcels::{ParcelSet, load_dataset};

/// Errors that can occur during boundary construction.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A configured parcel file does not exist.
    #[error("Parcel file for {name} not found at {path}")]
    MissingFile {
        /// Dataset label.
        name: String,
        /// Path that was checked.
        path: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// CRS lookup or reprojection failed.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),

    /// `ogr2ogr` could not be run or exited unsuccessfully.
    #[error("External tool failed: {message}")]
    ExternalTool {
        /// Description of what went wrong.
        message: String,
    },

    /// A dataset loaded but contained no polygons.
    #[error("Parcel dataset {name} contains no polygons")]
    EmptyDataset {
        /// Dataset label.
        name: String,
    },

    /// Every configured dataset failed to load.
    #[error("No parcel datasets were loaded; cannot create a boundary")]
    NoDatasetsLoaded,
}

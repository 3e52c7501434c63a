#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filtering stages that reduce the national extracts to the county.
//!
//! [`sites`] keeps brownfield register entries that fall inside the county
//! boundary and writes the deduplicated master CSV. [`prices`] streams the
//! national price-paid log and keeps county postcodes within a date window.

pub mod parsing;
pub mod prices;
pub mod sites;

use cambs_market_models::schema::SchemaError;
use cambs_market_spatial::SpatialError;
use thiserror::Error;

pub use prices::{PriceCriteria, PriceFilterSummary, filter_prices};
pub use sites::{SiteFilterSummary, filter_sites};

/// Errors that can occur while filtering the input extracts.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required input file does not exist.
    #[error("Input file not found: {path}")]
    MissingInput {
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

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An input file does not have the expected columns.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Boundary reprojection failed.
    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),
}

impl IngestError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline configuration.
//!
//! The default configuration is baked into the binary from `pipeline.toml`
//! via [`include_str!`] and reproduces the fixed paths, date windows,
//! postcode prefixes and sector list of the Cambridgeshire study. A
//! different TOML file can be supplied at startup; every stage receives the
//! resulting [`PipelineConfig`] explicitly.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

/// Default configuration embedded at compile time.
const DEFAULT_TOML: &str = include_str!("../pipeline.toml");

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path to the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The config parsed but violates a constraint.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// Complete configuration for all pipeline stages.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub boundary: BoundaryConfig,
    pub sites: SitesConfig,
    pub prices: PricesConfig,
    pub analysis: AnalysisConfig,
    pub visuals: VisualsConfig,
}

/// Input and output directory roots.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the raw downloads, relative to the project root.
    pub raw_data_dir: PathBuf,
    /// Directory every stage writes into, relative to the project root.
    pub reports_dir: PathBuf,
}

/// Parcel datasets that make up the county boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryConfig {
    pub datasets: Vec<BoundaryDataset>,
    /// Whether to write the unioned boundary as `GeoJSON`.
    #[serde(default)]
    pub export_geojson: bool,
    /// File name for the exported boundary, inside the reports directory.
    pub output_geojson: String,
}

/// One local authority's parcel file.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryDataset {
    /// Label used in log output (e.g. `"South_Cambs"`).
    pub name: String,
    /// Path relative to the raw data directory.
    pub path: PathBuf,
    /// CRS identifier of the file's coordinates (e.g. `"EPSG:27700"`).
    pub crs: String,
}

/// Site register input and master CSV output.
#[derive(Debug, Clone, Deserialize)]
pub struct SitesConfig {
    /// National brownfield register, relative to the raw data directory.
    pub register: PathBuf,
    /// Master CSV file name inside the reports directory.
    pub master_csv: String,
}

/// Price-paid filtering rules.
#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    /// National price-paid CSV, relative to the raw data directory.
    pub source: PathBuf,
    /// Filtered CSV file name inside the reports directory.
    pub output_csv: String,
    /// Postcodes must start with one of these (case-sensitive).
    pub postcode_prefixes: Vec<String>,
    /// First transfer date kept (inclusive).
    pub start: NaiveDate,
    /// Last transfer date kept (inclusive).
    pub end: NaiveDate,
}

/// Market analysis rules.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Exact planning status to analyse.
    pub status: String,
    /// Earliest permission date kept (inclusive).
    pub since: NaiveDate,
    /// Report bundle file name inside the reports directory.
    pub report: String,
    /// Directory name for per-table CSV exports of the report.
    pub report_export_dir: String,
    /// Sector names in priority order.
    pub sectors: Vec<String>,
}

/// Chart and map outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct VisualsConfig {
    pub correlation_chart: String,
    pub growth_chart: String,
    pub map_html: String,
    /// Initial map center as `[lat, lon]`.
    pub map_center: [f64; 2],
    pub map_zoom: u8,
}

/// Absolute locations of every file the pipeline touches, resolved against
/// a project root.
#[derive(Debug, Clone)]
pub struct StagePaths {
    pub reports_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub boundary_datasets: Vec<ResolvedDataset>,
    pub boundary_geojson: PathBuf,
    pub site_register: PathBuf,
    pub master_csv: PathBuf,
    pub price_source: PathBuf,
    pub prices_csv: PathBuf,
    pub report: PathBuf,
    pub report_export_dir: PathBuf,
    pub correlation_chart: PathBuf,
    pub growth_chart: PathBuf,
    pub map_html: PathBuf,
}

/// A [`BoundaryDataset`] with its path resolved.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub name: String,
    pub path: PathBuf,
    pub crs: String,
}

impl PipelineConfig {
    /// Parses the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded TOML is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_TOML)
    }

    /// Loads configuration from `path`, or the embedded default when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            log::debug!("Using embedded pipeline configuration");
            return Self::embedded();
        };

        log::info!("Loading pipeline configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or invalid.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.boundary.datasets.is_empty() {
            return invalid("boundary.datasets must list at least one parcel dataset");
        }
        if self.analysis.sectors.iter().all(|s| s.trim().is_empty()) {
            return invalid("analysis.sectors must contain at least one sector name");
        }
        if self.prices.postcode_prefixes.iter().all(String::is_empty) {
            return invalid("prices.postcode_prefixes must contain at least one prefix");
        }
        if self.prices.start > self.prices.end {
            return Err(ConfigError::Invalid {
                message: format!(
                    "prices.start ({}) is after prices.end ({})",
                    self.prices.start, self.prices.end
                ),
            });
        }

        Ok(())
    }

    /// Resolves every configured path against `root`.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> StagePaths {
        let raw = root.join(&self.paths.raw_data_dir);
        let reports = root.join(&self.paths.reports_dir);

        StagePaths {
            cache_dir: reports.join("cache"),
            boundary_datasets: self
                .boundary
                .datasets
                .iter()
                .map(|d| ResolvedDataset {
                    name: d.name.clone(),
                    path: raw.join(&d.path),
                    crs: d.crs.clone(),
                })
                .collect(),
            boundary_geojson: reports.join(&self.boundary.output_geojson),
            site_register: raw.join(&self.sites.register),
            master_csv: reports.join(&self.sites.master_csv),
            price_source: raw.join(&self.prices.source),
            prices_csv: reports.join(&self.prices.output_csv),
            report: reports.join(&self.analysis.report),
            report_export_dir: reports.join(&self.analysis.report_export_dir),
            correlation_chart: reports.join(&self.visuals.correlation_chart),
            growth_chart: reports.join(&self.visuals.growth_chart),
            map_html: reports.join(&self.visuals.map_html),
            reports_dir: reports,
        }
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_parses() {
        let config = PipelineConfig::embedded().unwrap();
        assert_eq!(config.boundary.datasets.len(), 3);
        assert_eq!(config.prices.postcode_prefixes, vec!["CB", "PE", "SG"]);
        assert_eq!(config.prices.start, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
        assert_eq!(config.prices.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(config.analysis.status, "permissioned");
        assert_eq!(config.analysis.sectors.len(), 25);
        assert_eq!(config.analysis.sectors[0], "FULBOURN");
    }

    #[test]
    fn resolves_paths_against_root() {
        let config = PipelineConfig::embedded().unwrap();
        let paths = config.resolve(Path::new("/project"));
        assert_eq!(
            paths.master_csv,
            Path::new("/project/reports/Master_Cambridgeshire_Data.csv")
        );
        assert_eq!(
            paths.site_register,
            Path::new("/project/1_data_acquisition/raw_data/brownfield_registers/uk_brownfield_sites.csv")
        );
        assert_eq!(paths.cache_dir, Path::new("/project/reports/cache"));
    }

    #[test]
    fn rejects_inverted_date_window() {
        let text = DEFAULT_TOML.replace("start = \"2010-01-01\"", "start = \"2024-01-01\"");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn loads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let text = DEFAULT_TOML.replace("status = \"permissioned\"", "status = \"pending\"");
        std::fs::write(&path, text).unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.analysis.status, "pending");
    }

    #[test]
    fn missing_override_file_is_an_error() {
        let err = PipelineConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

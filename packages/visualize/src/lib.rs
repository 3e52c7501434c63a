#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Presentation of the market report.
//!
//! Produces three artifacts: a chart of development against market spend,
//! a chart of development growth per year, and an interactive map of
//! development hotspots.

pub mod chart;
pub mod map;
pub mod spend;

use std::path::Path;

use cambs_market_analytics::report::{read_development_growth, read_hotspot_analysis};
use cambs_market_analytics::{AnalyticsError, ReportError, SectorClassifier, analyzer};
use cambs_market_config::{StagePaths, VisualsConfig};
use cambs_market_models::schema::SchemaError;
use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Errors that can occur while producing the visuals.
#[derive(Debug, Error)]
pub enum VisualizeError {
    /// A required input file does not exist.
    #[error("Input not found at {path}; run the earlier stages first")]
    MissingInput {
        /// Path that was checked.
        path: String,
    },

    /// Filesystem I/O failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An input CSV does not have the expected columns.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Reading the report bundle failed.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Reading the master site data failed.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    /// Drawing or encoding a chart failed.
    #[error("Chart error: {0}")]
    Chart(String),

    /// Serialising the map data failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for VisualizeError {
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        Self::Chart(e.to_string())
    }
}

impl VisualizeError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Escapes text for HTML content and attributes.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Counts from one visualisation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisualSummary {
    /// Years plotted on the development-versus-spend chart.
    pub correlated_years: usize,
    /// Years plotted on the growth chart.
    pub growth_years: usize,
    /// Sector circles on the map.
    pub hotspot_circles: usize,
    /// Individual site markers on the map.
    pub project_markers: usize,
}

/// Reads the report, the filtered prices and the master sites, then writes
/// both charts and the map.
///
/// # Errors
///
/// Returns [`VisualizeError`] if an input is missing or malformed, or an
/// output cannot be written.
pub fn run_visuals(
    paths: &StagePaths,
    visuals: &VisualsConfig,
    classifier: &SectorClassifier,
) -> Result<VisualSummary, VisualizeError> {
    log::info!("Loading market report from {}", paths.report.display());
    let growth = read_development_growth(&paths.report)?;
    let hotspots = read_hotspot_analysis(&paths.report)?;

    log::info!("Summing market spend from {}", paths.prices_csv.display());
    let spend = spend::read_yearly_spend(&paths.prices_csv)?;
    let correlated = spend::correlate(&growth, &spend);
    if correlated.is_empty() {
        log::warn!("No year appears in both the development and price data");
    }

    let sites = analyzer::read_master_csv(&paths.master_csv)?;

    chart::draw_correlation_chart(&correlated, &paths.correlation_chart)?;
    chart::draw_growth_chart(&growth, &paths.growth_chart)?;

    let hotspot_map = map::build_map(
        &hotspots,
        &sites,
        classifier,
        visuals.map_center,
        visuals.map_zoom,
    );
    map::write_map(&hotspot_map, &paths.map_html)?;

    Ok(VisualSummary {
        correlated_years: correlated.len(),
        growth_years: growth.len(),
        hotspot_circles: hotspot_map.hotspots.len(),
        project_markers: hotspot_map.projects.len(),
    })
}

#[cfg(test)]
mod tests {
    use cambs_market_analytics::analyzer::AnalysisCriteria;
    use cambs_market_config::PipelineConfig;
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn missing_report_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::embedded().unwrap();
        let paths = config.resolve(dir.path());
        let classifier = SectorClassifier::new(&config.analysis.sectors);

        let err = run_visuals(&paths, &config.visuals, &classifier).unwrap_err();
        assert!(matches!(
            err,
            VisualizeError::Report(ReportError::MissingReport { .. })
        ));
    }

    #[test]
    fn renders_all_outputs_from_stage_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::embedded().unwrap();
        let paths = config.resolve(dir.path());
        let classifier = SectorClassifier::new(&["HISTON", "FULBOURN"]);

        std::fs::create_dir_all(&paths.reports_dir).unwrap();
        std::fs::write(
            &paths.master_csv,
            "SiteReference,Address,PermissionDate,Hectares,PlanningStatus,\
             Dwellings,Council,point,longitude,latitude\n\
             S1,\"Land at Histon\",2021-03-01,0.5,permissioned,40,SCDC,POINT(0.1 52.25),0.1,52.25\n\
             S2,\"Mill Lane, Fulbourn\",2022-07-15,0.2,permissioned,6,SCDC,POINT(0.22 52.18),0.22,52.18\n",
        )
        .unwrap();
        std::fs::write(
            &paths.prices_csv,
            "Price,DateOfTransfer,Postcode\n\
             450000,2021-05-05,CB24 9AA\n\
             300000,2022-01-09,CB21 5AA\n\
             275000,2015-01-09,CB21 5AA\n",
        )
        .unwrap();

        let criteria = AnalysisCriteria {
            status: "permissioned".to_string(),
            since: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        };
        cambs_market_analytics::run_analysis(
            &paths.master_csv,
            &criteria,
            &classifier,
            &paths.report,
            &paths.report_export_dir,
        )
        .unwrap();

        let summary = run_visuals(&paths, &config.visuals, &classifier).unwrap();
        assert_eq!(
            summary,
            VisualSummary {
                correlated_years: 2,
                growth_years: 2,
                hotspot_circles: 2,
                project_markers: 2,
            }
        );
        assert!(paths.correlation_chart.exists());
        assert!(paths.growth_chart.exists());
        assert!(paths.map_html.exists());
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Market analysis over the county's brownfield sites.
//!
//! Selects permissioned sites since the configured cutoff, assigns each one
//! to a town or village sector by address, and aggregates dwellings by year
//! and by sector. The result is persisted as a [`MarketReport`] bundle that
//! the visualizer reads back.

pub mod analyzer;
pub mod classifier;
pub mod report;

use std::path::Path;

use cambs_market_models::schema::SchemaError;
use thiserror::Error;

pub use analyzer::{AnalysisCriteria, AnalysisSummary, analyze_master, analyze_sites};
pub use classifier::SectorClassifier;
pub use report::{MarketReport, ReportError};

/// Errors that can occur during the analysis stage.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The master CSV does not exist.
    #[error("Master site data not found at {path}; run the site filter first")]
    MissingInput {
        /// Path that was checked.
        path: String,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The master CSV does not have the expected columns.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// `DuckDB` query failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// Writing or exporting the report failed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Runs the analysis over `master_csv`, writes the report bundle to
/// `report_path` and exports its tables as CSV under `export_dir`.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the analysis, the write or the export
/// fails.
pub fn run_analysis(
    master_csv: &Path,
    criteria: &AnalysisCriteria,
    classifier: &SectorClassifier,
    report_path: &Path,
    export_dir: &Path,
) -> Result<AnalysisSummary, AnalyticsError> {
    log::info!("Loading master data from {}", master_csv.display());
    let (report, summary) = analyze_master(master_csv, criteria, classifier)?;

    log::info!("Saving market report to {}", report_path.display());
    report.write(report_path)?;

    let exported = report::export_csv(report_path, export_dir)?;
    log::info!(
        "Exported {} report tables to {}",
        exported.len(),
        export_dir.display()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_report_from_master_csv() {
        let dir = tempfile::tempdir().unwrap();
        let master = dir.path().join("master.csv");
        std::fs::write(
            &master,
            "SiteReference,Address,PermissionDate,Hectares,PlanningStatus,Dwellings,Council,point,longitude,latitude\n\
             S1,\"14 High St, Fulbourn, CB21\",2021-07-09,0.4,permissioned,14.0,SCDC,POINT(0.22 52.18),0.22,52.18\n\
             S2,\"Mill Lane, Sawston\",2018-03-01,,permissioned,,SCDC,POINT(0.17 52.12),0.17,52.12\n",
        )
        .unwrap();

        let criteria = AnalysisCriteria {
            status: "permissioned".to_string(),
            since: chrono::NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        };
        let classifier = SectorClassifier::new(&["FULBOURN", "SAWSTON"]);
        let report_path = dir.path().join("report.duckdb");
        let export_dir = dir.path().join("report");

        let summary =
            run_analysis(&master, &criteria, &classifier, &report_path, &export_dir).unwrap();
        assert_eq!(summary.classified, 2);

        let hotspots = report::read_hotspot_analysis(&report_path).unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].sector, "FULBOURN");
        assert!((hotspots[0].percent_of_total_dwellings - 100.0).abs() < 1e-9);

        let growth = report::read_development_growth(&report_path).unwrap();
        let years: Vec<i32> = growth.iter().map(|g| g.year).collect();
        assert_eq!(years, vec![2021, 2018]);

        assert!(export_dir.join("cleaned_data.csv").exists());
    }
}

//! Stage runners wiring configuration into each library crate.
//!
//! Stages talk only through the files named in [`StagePaths`], so every
//! runner can also be invoked on its own.

use std::error::Error;

use cambs_market_analytics::{AnalysisCriteria, SectorClassifier, run_analysis};
use cambs_market_cli_utils::{IndicatifProgress, MultiProgress, ProgressCallback as _};
use cambs_market_config::{PipelineConfig, StagePaths};
use cambs_market_geography::{build_boundary, write_boundary_geojson};
use cambs_market_ingest::{PriceCriteria, filter_prices, filter_sites};
use cambs_market_spatial::CountyBoundary;

/// Stages run by [`run_all`], in order.
const STAGES: &[&str] = &["Boundary", "Sites", "Prices", "Analysis", "Visuals"];

/// Builds the county boundary, exporting it as `GeoJSON` when configured.
///
/// # Errors
///
/// Returns an error if no parcel dataset loads or the export fails.
pub fn run_boundary(
    config: &PipelineConfig,
    paths: &StagePaths,
) -> Result<CountyBoundary, Box<dyn Error>> {
    let boundary = build_boundary(&paths.boundary_datasets, &paths.cache_dir)?;
    if config.boundary.export_geojson {
        write_boundary_geojson(&boundary, &paths.boundary_geojson)?;
    }
    Ok(boundary)
}

/// Filters the brownfield register to sites inside `boundary`.
///
/// # Errors
///
/// Returns an error if the register is missing or malformed.
pub fn run_sites(
    paths: &StagePaths,
    boundary: &CountyBoundary,
    multi: &MultiProgress,
) -> Result<(), Box<dyn Error>> {
    let bar = IndicatifProgress::records_bar(multi, "Brownfield register");
    let result = filter_sites(&paths.site_register, boundary, &paths.master_csv, &bar);
    bar.finish_and_clear();

    let summary = result?;
    log::info!(
        "{} of {} register rows kept ({} bad coordinates, {} outside, {} duplicates)",
        summary.sites_written,
        summary.rows_read,
        summary.bad_coordinates,
        summary.outside_boundary,
        summary.duplicates_removed
    );
    Ok(())
}

/// Reduces the national price-paid file to the configured prefixes and
/// window.
///
/// # Errors
///
/// Returns an error if the source is missing or unreadable.
pub fn run_prices(
    config: &PipelineConfig,
    paths: &StagePaths,
    multi: &MultiProgress,
) -> Result<(), Box<dyn Error>> {
    let bar = IndicatifProgress::records_bar(multi, "Price-paid records");
    let result = filter_prices(
        &paths.price_source,
        &paths.prices_csv,
        &PriceCriteria::from(&config.prices),
        &bar,
    );
    bar.finish_and_clear();

    result?;
    Ok(())
}

/// Writes the market report from the master site data.
///
/// # Errors
///
/// Returns an error if the master data is missing or the report cannot be
/// written.
pub fn run_analyze(config: &PipelineConfig, paths: &StagePaths) -> Result<(), Box<dyn Error>> {
    let classifier = SectorClassifier::new(&config.analysis.sectors);
    let summary = run_analysis(
        &paths.master_csv,
        &AnalysisCriteria::from(&config.analysis),
        &classifier,
        &paths.report,
        &paths.report_export_dir,
    )?;

    log::info!(
        "{} of {} sites classified into sectors",
        summary.classified,
        summary.sites_loaded
    );
    Ok(())
}

/// Draws the charts and map from the report and the filtered prices.
///
/// # Errors
///
/// Returns an error if an input is missing or an output cannot be written.
pub fn run_visualize(config: &PipelineConfig, paths: &StagePaths) -> Result<(), Box<dyn Error>> {
    let classifier = SectorClassifier::new(&config.analysis.sectors);
    let summary = cambs_market_visualize::run_visuals(paths, &config.visuals, &classifier)?;

    log::info!(
        "Charts cover {} years; map has {} sectors and {} projects",
        summary.growth_years,
        summary.hotspot_circles,
        summary.project_markers
    );
    Ok(())
}

/// Runs every stage in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first stage error.
pub fn run_all(
    config: &PipelineConfig,
    paths: &StagePaths,
    multi: &MultiProgress,
) -> Result<(), Box<dyn Error>> {
    let total = STAGES.len();
    let stages = IndicatifProgress::steps_bar(multi, "Pipeline", total as u64);
    let announce = |i: usize| {
        let message = format!("[{}/{total}] {}", i + 1, STAGES[i]);
        log::info!("{message}");
        stages.set_message(message);
    };

    announce(0);
    let boundary = run_boundary(config, paths)?;
    stages.inc(1);

    announce(1);
    run_sites(paths, &boundary, multi)?;
    stages.inc(1);

    announce(2);
    run_prices(config, paths, multi)?;
    stages.inc(1);

    announce(3);
    run_analyze(config, paths)?;
    stages.inc(1);

    announce(4);
    run_visualize(config, paths)?;
    stages.inc(1);

    stages.finish(format!("[{total}/{total}] Pipeline complete"));
    Ok(())
}

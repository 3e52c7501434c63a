//! Spatial filtering of the national brownfield site register.
//!
//! Every register row whose WKT point falls strictly inside the county
//! boundary is renamed into a [`SiteRecord`]. Sites that appear more than
//! once keep only their most recently permissioned entry.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use cambs_market_config::ensure_dir;
use cambs_market_models::SiteRecord;
use cambs_market_models::progress::ProgressCallback;
use cambs_market_models::schema::{column_index, require_columns};
use cambs_market_spatial::{BoundaryIndex, CountyBoundary, Crs};
use csv::StringRecord;

use crate::IngestError;
use crate::parsing::{parse_number, parse_permission_date, parse_point, point_regex};

/// Register columns the filter reads. Any others are ignored.
pub const REGISTER_COLUMNS: &[&str] = &[
    "point",
    "reference",
    "site-address",
    "planning-permission-date",
    "hectares",
    "planning-permission-status",
    "maximum-net-dwellings",
    "organisation",
];

/// Row counts from one run of the site filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteFilterSummary {
    /// Data rows read from the register.
    pub rows_read: u64,
    /// Rows dropped because `point` did not parse.
    pub bad_coordinates: u64,
    /// Rows dropped because the point is not inside the boundary.
    pub outside_boundary: u64,
    /// Older entries removed for a repeated site reference.
    pub duplicates_removed: u64,
    /// Sites written to the master CSV.
    pub sites_written: u64,
}

/// Positions of the register columns in the header.
struct RegisterLayout {
    point: usize,
    reference: usize,
    address: usize,
    permission_date: usize,
    hectares: usize,
    status: usize,
    dwellings: usize,
    organisation: usize,
}

impl RegisterLayout {
    fn from_headers(headers: &StringRecord, artifact: &str) -> Result<Self, IngestError> {
        require_columns(headers, REGISTER_COLUMNS, artifact)?;
        // Presence was checked above.
        let idx = |name: &str| column_index(headers, name).unwrap_or_default();

        Ok(Self {
            point: idx("point"),
            reference: idx("reference"),
            address: idx("site-address"),
            permission_date: idx("planning-permission-date"),
            hectares: idx("hectares"),
            status: idx("planning-permission-status"),
            dwellings: idx("maximum-net-dwellings"),
            organisation: idx("organisation"),
        })
    }
}

/// Filters the register at `register` to the county and writes the master
/// CSV to `output`.
///
/// # Errors
///
/// Returns [`IngestError`] if the register is missing or lacks a required
/// column, the boundary cannot be reprojected to WGS84, or a read or write
/// fails.
pub fn filter_sites(
    register: &Path,
    boundary: &CountyBoundary,
    output: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<SiteFilterSummary, IngestError> {
    if !register.exists() {
        return Err(IngestError::MissingInput {
            path: register.display().to_string(),
        });
    }

    log::info!("Loading national brownfield register from {}", register.display());
    let file = std::fs::File::open(register).map_err(|e| IngestError::io(register, e))?;

    let wgs84 = boundary.reproject(Crs::Wgs84)?;
    let index = BoundaryIndex::new(&wgs84);

    let artifact = register.display().to_string();
    let (records, mut summary) = select_sites(file, &artifact, &index, progress)?;
    log::info!(
        " -> {} rows read, {} dropped for bad coordinates, {} outside the boundary",
        summary.rows_read,
        summary.bad_coordinates,
        summary.outside_boundary
    );

    let before = records.len();
    let records = dedup_latest(records);
    summary.duplicates_removed = (before - records.len()) as u64;
    summary.sites_written = records.len() as u64;
    log::info!(
        " -> {} unique sites remain after removing {} duplicates",
        summary.sites_written,
        summary.duplicates_removed
    );

    write_master_csv(output, &records)?;
    log::info!("Master site data written to {}", output.display());

    Ok(summary)
}

/// Reads register rows and keeps those inside `index`, renamed to
/// [`SiteRecord`]s in register order.
///
/// # Errors
///
/// Returns [`IngestError`] if the header lacks a required column or a row
/// cannot be read.
pub fn select_sites<R: Read>(
    reader: R,
    artifact: &str,
    index: &BoundaryIndex,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<(Vec<SiteRecord>, SiteFilterSummary), IngestError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let layout = RegisterLayout::from_headers(reader.headers()?, artifact)?;
    let re = point_regex();

    progress.set_message("Filtering brownfield register".to_string());

    let mut summary = SiteFilterSummary::default();
    let mut kept = Vec::new();
    let mut row = StringRecord::new();

    while reader.read_record(&mut row)? {
        summary.rows_read += 1;
        progress.inc(1);

        let cell = |i: usize| row.get(i).unwrap_or_default().trim();

        let point = cell(layout.point);
        let Some((longitude, latitude)) = parse_point(&re, point) else {
            summary.bad_coordinates += 1;
            continue;
        };
        if !index.contains(longitude, latitude) {
            summary.outside_boundary += 1;
            continue;
        }

        kept.push(SiteRecord {
            site_reference: cell(layout.reference).to_string(),
            address: cell(layout.address).to_string(),
            permission_date: parse_permission_date(cell(layout.permission_date)),
            hectares: parse_number(cell(layout.hectares)),
            planning_status: cell(layout.status).to_string(),
            dwellings: parse_number(cell(layout.dwellings)),
            council: cell(layout.organisation).to_string(),
            point: point.to_string(),
            longitude,
            latitude,
        });
    }

    progress.finish(format!(
        "{} of {} register rows inside the boundary",
        kept.len(),
        summary.rows_read
    ));

    Ok((kept, summary))
}

/// Keeps one record per site reference, preferring the latest permission
/// date.
///
/// Records are ordered by date descending with undated records last. When
/// dates tie, the record seen first in the input wins. The returned order
/// is the sorted order.
#[must_use]
pub fn dedup_latest(mut records: Vec<SiteRecord>) -> Vec<SiteRecord> {
    // `None < Some(_)`, so reversing puts undated records last. The sort is
    // stable.
    records.sort_by_key(|r| Reverse(r.permission_date));

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.site_reference.clone()));
    records
}

/// Writes the master CSV with the [`SiteRecord::COLUMNS`] header.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be created or written.
pub fn write_master_csv(path: &Path, records: &[SiteRecord]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(|e| IngestError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(SiteRecord::COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| IngestError::io(path, e))?;

    Ok(())
}

//! Permission, date and sector filtering of the master site data, followed
//! by the yearly and per-sector aggregates.
//!
//! The master CSV is loaded into an in-memory `DuckDB` table so the status
//! and date filters and both aggregates run as SQL. Sector classification
//! runs in Rust between the two.

use std::path::Path;

use cambs_market_config::AnalysisConfig;
use cambs_market_models::schema::require_columns;
use cambs_market_models::{ClassifiedSite, SectorAggregate, SiteRecord, YearlyAggregate};
use chrono::{Datelike as _, NaiveDate};
use duckdb::{Connection, params};

use crate::AnalyticsError;
use crate::classifier::SectorClassifier;
use crate::report::MarketReport;

/// Date format used when passing dates through SQL.
const SQL_DATE: &str = "%Y-%m-%d";

/// Which sites enter the analysis.
#[derive(Debug, Clone)]
pub struct AnalysisCriteria {
    /// Planning status to select, matched exactly.
    pub status: String,
    /// Earliest permission date, inclusive.
    pub since: NaiveDate,
}

impl From<&AnalysisConfig> for AnalysisCriteria {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            status: config.status.clone(),
            since: config.since,
        }
    }
}

/// Row counts from one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    /// Sites in the master CSV.
    pub sites_loaded: u64,
    /// Sites with the selected planning status.
    pub with_status: u64,
    /// Of those, sites permissioned on or after the cutoff.
    pub since_cutoff: u64,
    /// Sites dropped because no sector name occurs in the address.
    pub uncategorized: u64,
    /// Sites that made it into the report.
    pub classified: u64,
}

/// Loads the master CSV at `master_csv` and builds the market report.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the master CSV is missing, its header does
/// not match [`SiteRecord::COLUMNS`], or a query fails.
pub fn analyze_master(
    master_csv: &Path,
    criteria: &AnalysisCriteria,
    classifier: &SectorClassifier,
) -> Result<(MarketReport, AnalysisSummary), AnalyticsError> {
    let sites = read_master_csv(master_csv)?;
    log::info!(
        "Loaded {} sites from {}",
        sites.len(),
        master_csv.display()
    );
    analyze_sites(&sites, criteria, classifier)
}

/// Reads and validates the master CSV written by the site filter.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if the file is missing, lacks a master column,
/// or a row does not deserialise.
pub fn read_master_csv(path: &Path) -> Result<Vec<SiteRecord>, AnalyticsError> {
    if !path.exists() {
        return Err(AnalyticsError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    require_columns(reader.headers()?, SiteRecord::COLUMNS, &path.display().to_string())?;

    let mut sites = Vec::new();
    for row in reader.deserialize() {
        sites.push(row?);
    }
    Ok(sites)
}

/// Runs the status, date and sector filters and both aggregates over
/// `sites`.
///
/// # Errors
///
/// Returns [`AnalyticsError::Duckdb`] if a query fails.
pub fn analyze_sites(
    sites: &[SiteRecord],
    criteria: &AnalysisCriteria,
    classifier: &SectorClassifier,
) -> Result<(MarketReport, AnalysisSummary), AnalyticsError> {
    let conn = Connection::open_in_memory()?;
    load_sites(&conn, sites)?;

    let mut summary = AnalysisSummary {
        sites_loaded: sites.len() as u64,
        ..AnalysisSummary::default()
    };

    summary.with_status = conn
        .prepare("SELECT COUNT(*) FROM cambridge_sites WHERE planning_status = ?")?
        .query_row([&criteria.status], |row| row.get::<_, i64>(0))?
        .try_into()
        .unwrap_or_default();
    log::info!(
        " -> Found {} sites with status '{}'",
        summary.with_status,
        criteria.status
    );

    let candidates = select_candidates(&conn, criteria)?;
    summary.since_cutoff = candidates.len() as u64;
    log::info!(
        " -> Focusing on {} sites permissioned since {}",
        summary.since_cutoff,
        criteria.since
    );

    let cleaned: Vec<ClassifiedSite> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let sector = classifier.classify(&candidate.address)?.to_string();
            Some(candidate.into_classified(sector))
        })
        .collect();
    summary.classified = cleaned.len() as u64;
    summary.uncategorized = summary.since_cutoff - summary.classified;
    log::info!(
        " -> Removed {} sites that could not be categorized into a known sector",
        summary.uncategorized
    );
    log::info!(" -> {} categorized sites remain", summary.classified);

    load_cleaned(&conn, &cleaned)?;
    let development_growth = yearly_aggregate(&conn)?;
    let hotspot_analysis = sector_aggregate(&conn)?;

    Ok((
        MarketReport {
            development_growth,
            hotspot_analysis,
            cleaned_data: cleaned,
        },
        summary,
    ))
}

fn load_sites(conn: &Connection, sites: &[SiteRecord]) -> Result<(), AnalyticsError> {
    conn.execute_batch(
        "CREATE TABLE cambridge_sites (
            ord BIGINT NOT NULL,
            site_reference TEXT NOT NULL,
            address TEXT NOT NULL,
            permission_date DATE,
            hectares DOUBLE,
            planning_status TEXT NOT NULL,
            dwellings DOUBLE,
            council TEXT NOT NULL,
            longitude DOUBLE NOT NULL,
            latitude DOUBLE NOT NULL
        );",
    )?;

    conn.execute_batch("BEGIN TRANSACTION;")?;
    {
        let mut stmt = conn.prepare(
            "INSERT INTO cambridge_sites VALUES (?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?)",
        )?;
        for (ord, site) in (0_i64..).zip(sites) {
            stmt.execute(params![
                ord,
                site.site_reference,
                site.address,
                site.permission_date.map(|d| d.format(SQL_DATE).to_string()),
                site.hectares,
                site.planning_status,
                site.dwellings,
                site.council,
                site.longitude,
                site.latitude,
            ])?;
        }
    }
    conn.execute_batch("COMMIT;")?;

    Ok(())
}

/// A site that passed the status and date filters.
struct Candidate {
    site_reference: String,
    address: String,
    permission_date: NaiveDate,
    hectares: Option<f64>,
    planning_status: String,
    dwellings: f64,
    council: String,
    longitude: f64,
    latitude: f64,
}

impl Candidate {
    fn into_classified(self, sector: String) -> ClassifiedSite {
        ClassifiedSite {
            year: self.permission_date.year(),
            site_reference: self.site_reference,
            address: self.address,
            permission_date: self.permission_date,
            hectares: self.hectares,
            planning_status: self.planning_status,
            dwellings: self.dwellings,
            council: self.council,
            longitude: self.longitude,
            latitude: self.latitude,
            sector,
        }
    }
}

fn select_candidates(
    conn: &Connection,
    criteria: &AnalysisCriteria,
) -> Result<Vec<Candidate>, AnalyticsError> {
    let mut stmt = conn.prepare(
        "SELECT site_reference, address, strftime(permission_date, '%Y-%m-%d'),
                hectares, planning_status, COALESCE(dwellings, 0), council,
                longitude, latitude
         FROM cambridge_sites
         WHERE planning_status = ?
           AND permission_date >= CAST(? AS DATE)
         ORDER BY ord",
    )?;
    let mut rows = stmt.query(params![
        criteria.status,
        criteria.since.format(SQL_DATE).to_string()
    ])?;

    let mut candidates = Vec::new();
    while let Some(row) = rows.next()? {
        let date: String = row.get(2)?;
        let Ok(permission_date) = NaiveDate::parse_from_str(&date, SQL_DATE) else {
            log::warn!("Skipping site with unreadable permission date {date:?}");
            continue;
        };

        candidates.push(Candidate {
            site_reference: row.get(0)?,
            address: row.get(1)?,
            permission_date,
            hectares: row.get(3)?,
            planning_status: row.get(4)?,
            dwellings: row.get(5)?,
            council: row.get(6)?,
            longitude: row.get(7)?,
            latitude: row.get(8)?,
        });
    }

    Ok(candidates)
}

fn load_cleaned(conn: &Connection, cleaned: &[ClassifiedSite]) -> Result<(), AnalyticsError> {
    conn.execute_batch(
        "CREATE TABLE classified_sites (
            site_reference TEXT NOT NULL,
            dwellings DOUBLE NOT NULL,
            sector TEXT NOT NULL,
            year INTEGER NOT NULL
        );",
    )?;

    conn.execute_batch("BEGIN TRANSACTION;")?;
    {
        let mut stmt = conn.prepare("INSERT INTO classified_sites VALUES (?, ?, ?, ?)")?;
        for site in cleaned {
            stmt.execute(params![
                site.site_reference,
                site.dwellings,
                site.sector,
                site.year
            ])?;
        }
    }
    conn.execute_batch("COMMIT;")?;

    Ok(())
}

fn yearly_aggregate(conn: &Connection) -> Result<Vec<YearlyAggregate>, AnalyticsError> {
    let mut stmt = conn.prepare(
        "SELECT year, COUNT(site_reference), SUM(dwellings)
         FROM classified_sites
         GROUP BY year
         ORDER BY year DESC",
    )?;
    let mut rows = stmt.query([])?;

    let mut yearly = Vec::new();
    while let Some(row) = rows.next()? {
        let count: i64 = row.get(1)?;
        yearly.push(YearlyAggregate {
            year: row.get(0)?,
            total_permissions_granted: count.try_into().unwrap_or_default(),
            total_dwellings_in_plans: row.get(2)?,
        });
    }

    Ok(yearly)
}

fn sector_aggregate(conn: &Connection) -> Result<Vec<SectorAggregate>, AnalyticsError> {
    let mut stmt = conn.prepare(
        "SELECT sector, SUM(dwellings) AS total, COUNT(*)
         FROM classified_sites
         WHERE dwellings >= 1
         GROUP BY sector
         ORDER BY total DESC, sector ASC",
    )?;
    let mut rows = stmt.query([])?;

    let mut sectors = Vec::new();
    while let Some(row) = rows.next()? {
        let count: i64 = row.get(2)?;
        sectors.push(SectorAggregate {
            sector: row.get(0)?,
            total_dwellings_approved: row.get(1)?,
            number_of_projects: count.try_into().unwrap_or_default(),
            percent_of_total_dwellings: 0.0,
        });
    }

    let grand_total: f64 = sectors.iter().map(|s| s.total_dwellings_approved).sum();
    if grand_total > 0.0 {
        for sector in &mut sectors {
            sector.percent_of_total_dwellings =
                round_to(sector.total_dwellings_approved / grand_total * 100.0, 2);
        }
    }

    Ok(sectors)
}

/// Rounds `value` to `places` decimal places, halves away from zero.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(
        reference: &str,
        address: &str,
        date: Option<&str>,
        status: &str,
        dwellings: Option<f64>,
    ) -> SiteRecord {
        SiteRecord {
            site_reference: reference.to_string(),
            address: address.to_string(),
            permission_date: date.map(|d| NaiveDate::parse_from_str(d, SQL_DATE).unwrap()),
            hectares: Some(0.5),
            planning_status: status.to_string(),
            dwellings,
            council: "South Cambridgeshire".to_string(),
            point: "POINT(0.2 52.2)".to_string(),
            longitude: 0.2,
            latitude: 52.2,
        }
    }

    fn criteria() -> AnalysisCriteria {
        AnalysisCriteria {
            status: "permissioned".to_string(),
            since: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
        }
    }

    fn classifier() -> SectorClassifier {
        SectorClassifier::new(&["FULBOURN", "HISTON", "MILTON", "SAWSTON"])
    }

    fn sample() -> Vec<SiteRecord> {
        vec![
            site("A", "14 High St, Fulbourn, CB21", Some("2021-04-01"), "permissioned", Some(12.0)),
            site("B", "Station Rd, Histon", Some("2021-09-30"), "permissioned", Some(30.0)),
            site("C", "Mill Lane, Sawston", Some("2019-01-15"), "permissioned", None),
            site("D", "Church St, Milton", Some("2019-06-01"), "permissioned", Some(8.0)),
            site("E", "Old Road, Fulbourn", Some("2009-12-31"), "permissioned", Some(99.0)),
            site("F", "Regent St, Cambridge", Some("2020-01-01"), "permissioned", Some(5.0)),
            site("G", "Green End, Histon", Some("2020-02-02"), "not permissioned", Some(50.0)),
            site("H", "The Street, Fulbourn", None, "permissioned", Some(7.0)),
            site("I", "Back Lane, Histon", Some("2019-03-03"), "Permissioned", Some(4.0)),
        ]
    }

    #[test]
    fn filters_and_classifies() {
        let (report, summary) = analyze_sites(&sample(), &criteria(), &classifier()).unwrap();

        assert_eq!(
            summary,
            AnalysisSummary {
                sites_loaded: 9,
                with_status: 7,
                since_cutoff: 5,
                uncategorized: 1,
                classified: 4,
            }
        );

        let refs: Vec<&str> = report
            .cleaned_data
            .iter()
            .map(|s| s.site_reference.as_str())
            .collect();
        assert_eq!(refs, vec!["A", "B", "C", "D"]);

        let sawston = &report.cleaned_data[2];
        assert_eq!(sawston.sector, "SAWSTON");
        assert!(sawston.dwellings.abs() < f64::EPSILON);
        assert_eq!(sawston.year, 2019);
    }

    #[test]
    fn single_fulbourn_site_feeds_year_and_sector() {
        let sites = [site(
            "F1",
            "14 High St, Fulbourn, CB21",
            Some("2021-06-01"),
            "permissioned",
            Some(5.0),
        )];
        let (report, _) = analyze_sites(&sites, &criteria(), &classifier()).unwrap();

        assert_eq!(report.cleaned_data[0].sector, "FULBOURN");
        assert_eq!(
            report.development_growth,
            vec![YearlyAggregate {
                year: 2021,
                total_permissions_granted: 1,
                total_dwellings_in_plans: 5.0,
            }]
        );
        assert_eq!(
            report.hotspot_analysis,
            vec![SectorAggregate {
                sector: "FULBOURN".to_string(),
                total_dwellings_approved: 5.0,
                number_of_projects: 1,
                percent_of_total_dwellings: 100.0,
            }]
        );
    }

    #[test]
    fn yearly_totals_match_input_dwellings() {
        let (report, _) = analyze_sites(&sample(), &criteria(), &classifier()).unwrap();

        let years: Vec<i32> = report.development_growth.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2021, 2019]);

        let y2021 = &report.development_growth[0];
        assert_eq!(y2021.total_permissions_granted, 2);
        assert!((y2021.total_dwellings_in_plans - 42.0).abs() < 1e-9);

        let y2019 = &report.development_growth[1];
        assert_eq!(y2019.total_permissions_granted, 2);
        assert!((y2019.total_dwellings_in_plans - 8.0).abs() < 1e-9);

        let yearly_sum: f64 = report
            .development_growth
            .iter()
            .map(|y| y.total_dwellings_in_plans)
            .sum();
        let input_sum: f64 = report.cleaned_data.iter().map(|s| s.dwellings).sum();
        assert!((yearly_sum - input_sum).abs() < 1e-9);
    }

    #[test]
    fn sector_aggregate_skips_zero_dwelling_sites() {
        let (report, _) = analyze_sites(&sample(), &criteria(), &classifier()).unwrap();

        let sectors: Vec<(&str, u64)> = report
            .hotspot_analysis
            .iter()
            .map(|s| (s.sector.as_str(), s.number_of_projects))
            .collect();
        assert_eq!(sectors, vec![("HISTON", 1), ("FULBOURN", 1), ("MILTON", 1)]);

        let pct: Vec<f64> = report
            .hotspot_analysis
            .iter()
            .map(|s| s.percent_of_total_dwellings)
            .collect();
        assert_eq!(pct, vec![60.0, 24.0, 16.0]);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let sites: Vec<SiteRecord> = ["FULBOURN", "HISTON", "MILTON"]
            .iter()
            .map(|town| site(town, town, Some("2015-05-05"), "permissioned", Some(1.0)))
            .collect();
        let (report, _) = analyze_sites(&sites, &criteria(), &classifier()).unwrap();

        let total: f64 = report
            .hotspot_analysis
            .iter()
            .map(|s| s.percent_of_total_dwellings)
            .sum();
        assert!((total - 100.0).abs() <= 0.01 * report.hotspot_analysis.len() as f64);

        // Equal totals fall back to alphabetical order.
        let names: Vec<&str> = report
            .hotspot_analysis
            .iter()
            .map(|s| s.sector.as_str())
            .collect();
        assert_eq!(names, vec!["FULBOURN", "HISTON", "MILTON"]);
    }

    #[test]
    fn nothing_classified_gives_empty_report() {
        let sites = vec![site("X", "Nowhere", Some("2015-01-01"), "permissioned", Some(3.0))];
        let (report, summary) = analyze_sites(&sites, &criteria(), &classifier()).unwrap();

        assert_eq!(summary.uncategorized, 1);
        assert!(report.development_growth.is_empty());
        assert!(report.hotspot_analysis.is_empty());
        assert!(report.cleaned_data.is_empty());
    }

    #[test]
    fn reads_master_csv_written_by_the_site_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.csv");
        let mut writer = csv::Writer::from_path(&path).unwrap();
        for record in sample() {
            writer.serialize(record).unwrap();
        }
        writer.flush().unwrap();
        drop(writer);

        let (report, summary) = analyze_master(&path, &criteria(), &classifier()).unwrap();
        assert_eq!(summary.sites_loaded, 9);
        assert_eq!(report.cleaned_data.len(), 4);
    }

    #[test]
    fn master_csv_with_wrong_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.csv");
        std::fs::write(&path, "reference,site-address\nA,Somewhere\n").unwrap();

        let err = read_master_csv(&path).unwrap_err();
        assert!(matches!(err, AnalyticsError::Schema(_)));
    }

    #[test]
    fn missing_master_csv_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_master_csv(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingInput { .. }));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert!((round_to(12.345_6, 2) - 12.35).abs() < 1e-12);
        assert!((round_to(1_234.56, 1) - 1_234.6).abs() < 1e-12);
    }
}

//! The market report bundle.
//!
//! A report is a `DuckDB` file with one table per [`ReportTable`]. It is
//! rebuilt from scratch on every run. Each table can also be exported as a
//! CSV file named after the table.

use std::path::{Path, PathBuf};

use cambs_market_config::ensure_dir;
use cambs_market_models::{ClassifiedSite, ReportTable, SectorAggregate, YearlyAggregate};
use duckdb::{AccessMode, Config, Connection, params};
use strum::IntoEnumIterator as _;
use thiserror::Error;

/// Errors that can occur while writing or reading the report bundle.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file does not exist.
    #[error("Market report not found at {path}; run the analysis stage first")]
    MissingReport {
        /// Path that was checked.
        path: String,
    },

    /// The report exists but lacks a table.
    #[error("Market report {path} has no table '{table}'")]
    MissingTable {
        /// Table that was expected.
        table: ReportTable,
        /// Report path.
        path: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// `DuckDB` query failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),
}

/// The three report tables, in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketReport {
    /// Yearly totals, newest year first.
    pub development_growth: Vec<YearlyAggregate>,
    /// Sector totals, largest first.
    pub hotspot_analysis: Vec<SectorAggregate>,
    /// The classified sites the aggregates were computed from.
    pub cleaned_data: Vec<ClassifiedSite>,
}

impl MarketReport {
    /// Writes the report to a fresh `DuckDB` file at `path`, replacing any
    /// previous report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if the old file cannot be removed or a
    /// statement fails.
    pub fn write(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent).map_err(|e| io_error(parent, e))?;
        }
        for stale in [path.to_path_buf(), wal_path(path)] {
            if stale.exists() {
                std::fs::remove_file(&stale).map_err(|e| io_error(&stale, e))?;
            }
        }

        let conn = Connection::open(path)?;
        create_tables(&conn)?;

        conn.execute_batch("BEGIN TRANSACTION;")?;
        self.insert_development_growth(&conn)?;
        self.insert_hotspot_analysis(&conn)?;
        self.insert_cleaned_data(&conn)?;
        conn.execute_batch("COMMIT;")?;

        for table in ReportTable::iter() {
            log::info!(" -> Wrote table '{table}' ({})", table.title());
        }
        Ok(())
    }

    fn insert_development_growth(&self, conn: &Connection) -> Result<(), ReportError> {
        let mut stmt = conn.prepare("INSERT INTO development_growth VALUES (?, ?, ?)")?;
        for row in &self.development_growth {
            stmt.execute(params![
                row.year,
                i64::try_from(row.total_permissions_granted).unwrap_or(i64::MAX),
                row.total_dwellings_in_plans,
            ])?;
        }
        Ok(())
    }

    fn insert_hotspot_analysis(&self, conn: &Connection) -> Result<(), ReportError> {
        let mut stmt = conn.prepare("INSERT INTO hotspot_analysis VALUES (?, ?, ?, ?)")?;
        for row in &self.hotspot_analysis {
            stmt.execute(params![
                row.sector,
                row.total_dwellings_approved,
                i64::try_from(row.number_of_projects).unwrap_or(i64::MAX),
                row.percent_of_total_dwellings,
            ])?;
        }
        Ok(())
    }

    fn insert_cleaned_data(&self, conn: &Connection) -> Result<(), ReportError> {
        let mut stmt = conn.prepare(
            "INSERT INTO cleaned_data VALUES (?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for row in &self.cleaned_data {
            stmt.execute(params![
                row.site_reference,
                row.address,
                row.permission_date.format("%Y-%m-%d").to_string(),
                row.hectares,
                row.planning_status,
                row.dwellings,
                row.council,
                row.longitude,
                row.latitude,
                row.sector,
                row.year,
            ])?;
        }
        Ok(())
    }
}

fn create_tables(conn: &Connection) -> Result<(), ReportError> {
    conn.execute_batch(
        r#"CREATE TABLE development_growth (
            "Year" INTEGER NOT NULL,
            "Total_Permissions_Granted" BIGINT NOT NULL,
            "Total_Dwellings_in_Plans" DOUBLE NOT NULL
        );

        CREATE TABLE hotspot_analysis (
            "Sector" TEXT NOT NULL,
            "Total_Dwellings_Approved" DOUBLE NOT NULL,
            "Number_of_Projects" BIGINT NOT NULL,
            "%_of_Total_Dwellings" DOUBLE NOT NULL
        );

        CREATE TABLE cleaned_data (
            "SiteReference" TEXT NOT NULL,
            "Address" TEXT NOT NULL,
            "PermissionDate" DATE NOT NULL,
            "Hectares" DOUBLE,
            "PlanningStatus" TEXT NOT NULL,
            "Dwellings" DOUBLE NOT NULL,
            "Council" TEXT NOT NULL,
            "longitude" DOUBLE NOT NULL,
            "latitude" DOUBLE NOT NULL,
            "Sector" TEXT NOT NULL,
            "Year" INTEGER NOT NULL
        );"#,
    )?;
    Ok(())
}

/// Exports every report table in `report` to `{dir}/{table}.csv`.
///
/// Returns the paths written.
///
/// # Errors
///
/// Returns [`ReportError`] if the report is missing or a table cannot be
/// exported.
pub fn export_csv(report: &Path, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    ensure_dir(dir).map_err(|e| io_error(dir, e))?;
    let conn = open_report(report)?;

    let mut written = Vec::new();
    for table in ReportTable::iter() {
        require_table(&conn, table, report)?;
        let out = dir.join(format!("{table}.csv"));
        let target = out.display().to_string().replace('\'', "''");
        conn.execute_batch(&format!(
            "COPY {table} TO '{target}' (HEADER, DELIMITER ',');"
        ))?;
        log::debug!("Exported {table} to {}", out.display());
        written.push(out);
    }

    Ok(written)
}

/// Opens an existing report read-only.
///
/// # Errors
///
/// Returns [`ReportError::MissingReport`] if the file does not exist.
pub fn open_report(path: &Path) -> Result<Connection, ReportError> {
    if !path.exists() {
        return Err(ReportError::MissingReport {
            path: path.display().to_string(),
        });
    }
    Ok(Connection::open_with_flags(
        path,
        Config::default().access_mode(AccessMode::ReadOnly)?,
    )?)
}

/// Fails with [`ReportError::MissingTable`] unless `table` exists.
///
/// # Errors
///
/// Returns [`ReportError`] if the table is absent or the lookup fails.
pub fn require_table(conn: &Connection, table: ReportTable, path: &Path) -> Result<(), ReportError> {
    let count: i64 = conn
        .prepare("SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?")?
        .query_row([table.as_ref()], |row| row.get(0))?;

    if count > 0 {
        Ok(())
    } else {
        Err(ReportError::MissingTable {
            table,
            path: path.display().to_string(),
        })
    }
}

/// Reads the yearly development totals, newest year first.
///
/// # Errors
///
/// Returns [`ReportError`] if the report or table is missing.
pub fn read_development_growth(path: &Path) -> Result<Vec<YearlyAggregate>, ReportError> {
    let conn = open_report(path)?;
    require_table(&conn, ReportTable::DevelopmentGrowth, path)?;

    let mut stmt = conn.prepare(
        r#"SELECT "Year", "Total_Permissions_Granted", "Total_Dwellings_in_Plans"
           FROM development_growth
           ORDER BY "Year" DESC"#,
    )?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let count: i64 = row.get(1)?;
        out.push(YearlyAggregate {
            year: row.get(0)?,
            total_permissions_granted: count.try_into().unwrap_or_default(),
            total_dwellings_in_plans: row.get(2)?,
        });
    }
    Ok(out)
}

/// Reads the sector totals, largest first.
///
/// # Errors
///
/// Returns [`ReportError`] if the report or table is missing.
pub fn read_hotspot_analysis(path: &Path) -> Result<Vec<SectorAggregate>, ReportError> {
    let conn = open_report(path)?;
    require_table(&conn, ReportTable::HotspotAnalysis, path)?;

    let mut stmt = conn.prepare(
        r#"SELECT "Sector", "Total_Dwellings_Approved", "Number_of_Projects",
                  "%_of_Total_Dwellings"
           FROM hotspot_analysis
           ORDER BY "Total_Dwellings_Approved" DESC, "Sector" ASC"#,
    )?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let count: i64 = row.get(2)?;
        out.push(SectorAggregate {
            sector: row.get(0)?,
            total_dwellings_approved: row.get(1)?,
            number_of_projects: count.try_into().unwrap_or_default(),
            percent_of_total_dwellings: row.get(3)?,
        });
    }
    Ok(out)
}

fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.display().to_string(),
        source,
    }
}

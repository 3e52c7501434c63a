#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row schemas shared across the Cambridgeshire market pipeline.
//!
//! Every stage persists its output as a flat file that the next stage reads
//! back. The structs in this crate are the single definition of those file
//! layouts, so a producer and its consumer can never disagree on a column
//! or table name.

pub mod progress;
pub mod schema;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// A brownfield site as written to the master CSV by the site filter.
///
/// Column names are the report-facing names, not the national register's
/// kebab-case headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// Register reference, unique after deduplication.
    #[serde(rename = "SiteReference")]
    pub site_reference: String,
    /// Free-text site address.
    #[serde(rename = "Address")]
    pub address: String,
    /// Planning permission date, `None` when the register value did not parse.
    #[serde(rename = "PermissionDate")]
    pub permission_date: Option<NaiveDate>,
    /// Site area in hectares.
    #[serde(rename = "Hectares")]
    pub hectares: Option<f64>,
    /// Planning status category (e.g. `"permissioned"`).
    #[serde(rename = "PlanningStatus")]
    pub planning_status: String,
    /// Maximum net dwellings.
    #[serde(rename = "Dwellings")]
    pub dwellings: Option<f64>,
    /// Owning council or organisation.
    #[serde(rename = "Council")]
    pub council: String,
    /// Raw WKT point string from the register.
    pub point: String,
    /// WGS84 longitude parsed from `point`.
    pub longitude: f64,
    /// WGS84 latitude parsed from `point`.
    pub latitude: f64,
}

impl SiteRecord {
    /// Master CSV header, in file order.
    pub const COLUMNS: &[&str] = &[
        "SiteReference",
        "Address",
        "PermissionDate",
        "Hectares",
        "PlanningStatus",
        "Dwellings",
        "Council",
        "point",
        "longitude",
        "latitude",
    ];
}

/// A site that survived the analyzer's status, date and sector filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSite {
    pub site_reference: String,
    pub address: String,
    pub permission_date: NaiveDate,
    pub hectares: Option<f64>,
    pub planning_status: String,
    /// Dwellings with nulls coerced to zero.
    pub dwellings: f64,
    pub council: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Matched sector name.
    pub sector: String,
    /// Year of `permission_date`.
    pub year: i32,
}

/// A single sale from the price-paid log after postcode and date filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sale price in pounds, `None` when the source value was not numeric.
    #[serde(rename = "Price")]
    pub price: Option<u64>,
    /// Date of transfer.
    #[serde(rename = "DateOfTransfer")]
    pub date_of_transfer: NaiveDate,
    /// Full postcode.
    #[serde(rename = "Postcode")]
    pub postcode: String,
}

impl Transaction {
    /// Reduced transaction CSV header, in file order.
    pub const COLUMNS: &[&str] = &["Price", "DateOfTransfer", "Postcode"];
}

/// Development activity for one permission year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyAggregate {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Total_Permissions_Granted")]
    pub total_permissions_granted: u64,
    #[serde(rename = "Total_Dwellings_in_Plans")]
    pub total_dwellings_in_plans: f64,
}

/// Dwelling totals for one sector, restricted to sites with at least one
/// dwelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorAggregate {
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Total_Dwellings_Approved")]
    pub total_dwellings_approved: f64,
    #[serde(rename = "Number_of_Projects")]
    pub number_of_projects: u64,
    /// Share of all sectors' dwellings, rounded to 2 decimals.
    #[serde(rename = "%_of_Total_Dwellings")]
    pub percent_of_total_dwellings: f64,
}

/// Total market spend for one transfer year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlySpend {
    #[serde(rename = "Year")]
    pub year: i32,
    /// Sum of sale prices in pounds.
    #[serde(rename = "Price")]
    pub total_price: u64,
    /// `total_price` in millions, rounded to 1 decimal.
    #[serde(rename = "Total_Spend_Millions")]
    pub total_spend_millions: f64,
}

/// The named tables that make up the market report bundle.
///
/// The analyzer writes these and the visualizer reads them, so both sides
/// resolve names through this enum rather than string literals.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportTable {
    /// Yearly permission and dwelling totals.
    DevelopmentGrowth,
    /// Per-sector dwelling totals and share.
    HotspotAnalysis,
    /// The classified rows the aggregates were computed from.
    CleanedData,
}

impl ReportTable {
    /// Human-readable title, used for exported file names and logs.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::DevelopmentGrowth => "Development Growth by Year",
            Self::HotspotAnalysis => "Hotspot Analysis by Sector",
            Self::CleanedData => "Cleaned Data Used in Report",
        }
    }
}

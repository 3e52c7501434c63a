//! Postcode and date filtering of the national price-paid log.
//!
//! The national file has sixteen positional columns and no header. Only
//! price, transfer date and postcode are read, one record at a time, so the
//! multi-gigabyte source never has to fit in memory. The reduced output of
//! a previous run is also accepted as input.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use cambs_market_config::{PricesConfig, ensure_dir};
use cambs_market_models::Transaction;
use cambs_market_models::progress::ProgressCallback;
use chrono::NaiveDate;
use csv::StringRecord;

use crate::IngestError;
use crate::parsing::parse_transfer_date;

/// Rows between progress updates.
const PROGRESS_BATCH: u64 = 50_000;

/// Row counts from one run of the price filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceFilterSummary {
    /// Data rows read from the source.
    pub rows_read: u64,
    /// Rows dropped for an empty postcode.
    pub missing_postcode: u64,
    /// Rows dropped because the postcode has none of the target prefixes.
    pub outside_area: u64,
    /// Area rows dropped for a missing, unparsable or out-of-window date.
    pub outside_window: u64,
    /// Transactions written.
    pub rows_written: u64,
}

/// Which columns hold price, date and postcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// The national 16-column file.
    National,
    /// A file previously written by this filter.
    Reduced,
}

impl Layout {
    const fn columns(self) -> (usize, usize, usize) {
        match self {
            Self::National => (1, 2, 3),
            Self::Reduced => (0, 1, 2),
        }
    }

    fn detect(first: &StringRecord) -> Self {
        let is_reduced_header = first.len() == Transaction::COLUMNS.len()
            && first
                .iter()
                .zip(Transaction::COLUMNS)
                .all(|(cell, column)| cell.trim() == *column);

        if is_reduced_header {
            Self::Reduced
        } else {
            Self::National
        }
    }
}

/// Postcode prefixes and the inclusive transfer-date window.
#[derive(Debug, Clone)]
pub struct PriceCriteria {
    pub postcode_prefixes: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl From<&PricesConfig> for PriceCriteria {
    fn from(config: &PricesConfig) -> Self {
        Self {
            postcode_prefixes: config.postcode_prefixes.clone(),
            start: config.start,
            end: config.end,
        }
    }
}

impl PriceCriteria {
    fn in_area(&self, postcode: &str) -> bool {
        self.postcode_prefixes
            .iter()
            .any(|prefix| postcode.starts_with(prefix.as_str()))
    }

    fn in_window(&self, date: NaiveDate) -> bool {
        (self.start..=self.end).contains(&date)
    }
}

/// Filters the price-paid file at `source` and writes the reduced CSV to
/// `output`.
///
/// # Errors
///
/// Returns [`IngestError`] if the source is missing or a read or write
/// fails.
pub fn filter_prices(
    source: &Path,
    output: &Path,
    criteria: &PriceCriteria,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PriceFilterSummary, IngestError> {
    if !source.exists() {
        return Err(IngestError::MissingInput {
            path: source.display().to_string(),
        });
    }

    log::info!("Loading price-paid data from {}", source.display());
    log::info!(
        "Keeping postcodes starting with {} transferred {} to {}",
        criteria.postcode_prefixes.join(", "),
        criteria.start,
        criteria.end
    );

    // Buffer the output in a sibling file so an input equal to the output
    // path is not truncated before it is read.
    if let Some(parent) = output.parent() {
        ensure_dir(parent).map_err(|e| IngestError::io(parent, e))?;
    }
    let partial = output.with_extension("csv.partial");

    let input = std::fs::File::open(source).map_err(|e| IngestError::io(source, e))?;
    let out = std::fs::File::create(&partial).map_err(|e| IngestError::io(&partial, e))?;

    let summary = match select_transactions(input, out, criteria, progress) {
        Ok(summary) => summary,
        Err(e) => {
            std::fs::remove_file(&partial).ok();
            return Err(e);
        }
    };
    std::fs::rename(&partial, output).map_err(|e| IngestError::io(output, e))?;

    log::info!(
        " -> {} rows read, {} in the area, {} in the date window",
        summary.rows_read,
        summary.rows_read - summary.missing_postcode - summary.outside_area,
        summary.rows_written
    );
    log::info!("Price data written to {}", output.display());

    Ok(summary)
}

/// Streams transactions from `reader`, writing those that match `criteria`
/// to `writer` with the [`Transaction::COLUMNS`] header.
///
/// # Errors
///
/// Returns [`IngestError`] if a record cannot be read or written.
pub fn select_transactions<R: Read, W: Write>(
    reader: R,
    writer: W,
    criteria: &PriceCriteria,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PriceFilterSummary, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(Transaction::COLUMNS)?;

    progress.set_message("Filtering price-paid records".to_string());

    let mut summary = PriceFilterSummary::default();
    let mut row = StringRecord::new();
    let mut layout = None;

    while reader.read_record(&mut row)? {
        let (price_col, date_col, postcode_col) = match layout {
            Some(layout) => Layout::columns(layout),
            None => {
                let detected = Layout::detect(&row);
                layout = Some(detected);
                if detected == Layout::Reduced {
                    log::info!("Input is already in reduced layout");
                    continue;
                }
                detected.columns()
            }
        };

        summary.rows_read += 1;
        if summary.rows_read % PROGRESS_BATCH == 0 {
            progress.inc(PROGRESS_BATCH);
        }

        let postcode = row.get(postcode_col).unwrap_or_default();
        if postcode.trim().is_empty() {
            summary.missing_postcode += 1;
            continue;
        }
        if !criteria.in_area(postcode) {
            summary.outside_area += 1;
            continue;
        }

        let Some(date) = row
            .get(date_col)
            .and_then(parse_transfer_date)
            .filter(|date| criteria.in_window(*date))
        else {
            summary.outside_window += 1;
            continue;
        };

        writer.serialize(Transaction {
            price: row.get(price_col).and_then(|p| p.trim().parse().ok()),
            date_of_transfer: date,
            postcode: postcode.to_string(),
        })?;
        summary.rows_written += 1;
    }

    writer.flush().map_err(csv::Error::from)?;
    progress.inc(summary.rows_read % PROGRESS_BATCH);
    progress.finish(format!(
        "{} of {} price records kept",
        summary.rows_written, summary.rows_read
    ));

    Ok(summary)
}

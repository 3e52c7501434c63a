//! Yearly market spend and its join with development activity.

use std::collections::BTreeMap;
use std::path::Path;

use cambs_market_analytics::analyzer::round_to;
use cambs_market_models::schema::require_columns;
use cambs_market_models::{Transaction, YearlyAggregate, YearlySpend};
use chrono::Datelike as _;

use crate::VisualizeError;

/// One year present in both the development report and the price data.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationRow {
    pub year: i32,
    pub total_dwellings_in_plans: f64,
    pub total_spend_millions: f64,
}

#[derive(Default)]
struct SpendTotals(BTreeMap<i32, u64>);

impl SpendTotals {
    /// Transactions without a price still open their year with a zero total.
    fn add(&mut self, transaction: &Transaction) {
        let total = self.0.entry(transaction.date_of_transfer.year()).or_default();
        *total = total.saturating_add(transaction.price.unwrap_or(0));
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Vec<YearlySpend> {
        self.0
            .into_iter()
            .map(|(year, total_price)| YearlySpend {
                year,
                total_price,
                total_spend_millions: round_to(total_price as f64 / 1_000_000.0, 1),
            })
            .collect()
    }
}

/// Sums sale prices by transfer year, oldest year first.
#[must_use]
pub fn yearly_spend(transactions: &[Transaction]) -> Vec<YearlySpend> {
    let mut totals = SpendTotals::default();
    for transaction in transactions {
        totals.add(transaction);
    }
    totals.finish()
}

/// Streams the filtered price CSV and sums it by year.
///
/// # Errors
///
/// Returns [`VisualizeError`] if the file is missing, its header is not the
/// reduced transaction layout, or a row does not parse.
pub fn read_yearly_spend(path: &Path) -> Result<Vec<YearlySpend>, VisualizeError> {
    if !path.exists() {
        return Err(VisualizeError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let mut reader = csv::Reader::from_path(path)?;
    require_columns(reader.headers()?, Transaction::COLUMNS, &path.display().to_string())?;

    let mut totals = SpendTotals::default();
    let mut rows = 0u64;
    for row in reader.deserialize() {
        let transaction: Transaction = row?;
        totals.add(&transaction);
        rows += 1;
    }
    log::info!(" -> Summed {rows} transactions from {}", path.display());

    Ok(totals.finish())
}

/// Inner-joins yearly development totals with yearly spend, oldest year
/// first.
#[must_use]
pub fn correlate(growth: &[YearlyAggregate], spend: &[YearlySpend]) -> Vec<CorrelationRow> {
    let spend_by_year: BTreeMap<i32, f64> = spend
        .iter()
        .map(|s| (s.year, s.total_spend_millions))
        .collect();

    let mut rows: Vec<CorrelationRow> = growth
        .iter()
        .filter_map(|g| {
            spend_by_year.get(&g.year).map(|&millions| CorrelationRow {
                year: g.year,
                total_dwellings_in_plans: g.total_dwellings_in_plans,
                total_spend_millions: millions,
            })
        })
        .collect();
    rows.sort_by_key(|r| r.year);
    rows
}

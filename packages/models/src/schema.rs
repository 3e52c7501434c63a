//! Header validation for the flat files exchanged between stages.
//!
//! A stage that reads another stage's output checks the header before
//! deserialising any rows, so a renamed or missing column fails with the
//! artifact name and the offending columns instead of a per-row error.

use csv::StringRecord;

/// Errors raised when a file does not match its expected layout.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Required columns are absent from the header.
    #[error("{artifact} is missing required columns: {}", missing.join(", "))]
    MissingColumns {
        /// Name of the file or table being validated.
        artifact: String,
        /// Columns that were required but not found.
        missing: Vec<String>,
    },

    /// The file has no header row at all.
    #[error("{artifact} has no header row")]
    EmptyHeader {
        /// Name of the file or table being validated.
        artifact: String,
    },
}

/// Checks that every column in `required` appears in `headers`.
///
/// Extra columns are allowed. Header cells are compared after trimming
/// surrounding whitespace.
///
/// # Errors
///
/// Returns [`SchemaError`] if the header is empty or a required column is
/// missing.
pub fn require_columns(
    headers: &StringRecord,
    required: &[&str],
    artifact: &str,
) -> Result<(), SchemaError> {
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SchemaError::EmptyHeader {
            artifact: artifact.to_string(),
        });
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|h| h.trim() == **column))
        .map(|column| (*column).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingColumns {
            artifact: artifact.to_string(),
            missing,
        })
    }
}

/// Returns the position of `column` in `headers`, if present.
#[must_use]
pub fn column_index(headers: &StringRecord, column: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == column)
}

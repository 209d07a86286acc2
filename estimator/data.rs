//! # Data Loading
//!
//! Reads sample files for fitting and evaluation. The on-disk format is a CSV file with a
//! header row and one row per sample, one numeric column per dimension. Estimators work
//! on the transposed layout, so the loader returns a `[D, N]` matrix with one sample per
//! column.
//!
//! Failures are assumed to be user-input errors and are reported with the offending row
//! and column so the file can be fixed by hand.

use csv::ReaderBuilder;
use ndarray::Array2;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A comprehensive error type for all data loading failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed CSV input: {0}")]
    CsvError(#[from] csv::Error),
    #[error("The input file has a header row but no columns.")]
    NoColumns,
    #[error("The input file contains no data rows.")]
    Empty,
    #[error(
        "Row {row}, column '{column}' contains '{value}', which is not a finite number. All cells must be numeric."
    )]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
}

/// Loads a sample file into a `[D, N]` matrix.
///
/// `row` in [`DataError::NonNumeric`] is 1-based and counts data rows only.
pub fn load_samples(path: impl AsRef<Path>) -> Result<Array2<f64>, DataError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(DataError::NoColumns);
    }
    let dimension = headers.len();

    // Row-major values; the csv reader rejects rows whose width differs from the header.
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for (cell, column) in record.iter().zip(&headers) {
            let value = cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DataError::NonNumeric {
                    row: row + 1,
                    column: column.clone(),
                    value: cell.to_string(),
                })?;
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(DataError::Empty);
    }
    let num_samples = values.len() / dimension;
    log::debug!("Loaded {num_samples} samples with {dimension} dimensions");

    Ok(Array2::from_shape_fn((dimension, num_samples), |(dim, sample)| {
        values[sample * dimension + dim]
    }))
}

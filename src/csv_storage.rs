//! CSV storage for posterior tables
//!
//! One header row with the column names, then one row per sample. Non-finite
//! values use the `NA`, `Inf` and `-Inf` spellings common to R and Stan
//! tooling so the files load directly in pandas or R.

use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::result::Posterior;

/// Configuration for writing posterior CSV files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvConfig {
    /// Significant digits after the leading one, `None` for exact values
    precision: Option<usize>,
}

impl CsvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Round values to `precision` digits after the leading one, in
    /// scientific notation.
    ///
    /// By default values are written in the shortest form that reads back
    /// to the same float.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    fn format_value(&self, value: f64) -> String {
        if value.is_nan() {
            "NA".to_string()
        } else if value.is_infinite() {
            if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
        } else if let Some(prec) = self.precision {
            format!("{:.prec$e}", value)
        } else if value == 0. || (1e-4..1e16).contains(&value.abs()) {
            format!("{}", value)
        } else {
            format!("{:e}", value)
        }
    }

    /// Write `posterior` to `path`, creating parent directories.
    pub fn write_posterior<P: AsRef<Path>>(&self, posterior: &Posterior, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file: {:?}", path))?;

        let keys = posterior.keys().collect_vec();
        writer.write_record(&keys)?;

        let columns = keys
            .iter()
            .map(|key| posterior.column(key).unwrap_or_default())
            .collect_vec();
        for idx in 0..posterior.len() {
            writer.write_record(columns.iter().map(|column| self.format_value(column[idx])))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write CSV file: {:?}", path))?;
        Ok(())
    }
}

fn parse_value(text: &str) -> Option<f64> {
    match text.trim() {
        "NA" | "NaN" | "nan" => Some(f64::NAN),
        "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

/// Read a posterior table written by [`CsvConfig::write_posterior`].
pub fn read_posterior<P: AsRef<Path>>(path: P) -> Result<Posterior> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let keys = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .iter()
        .map(str::to_string)
        .collect_vec();
    let mut columns = vec![Vec::new(); keys.len()];

    for (idx, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read row {} of {:?}", idx + 1, path))?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let value = parse_value(field).with_context(|| {
                format!("Invalid value '{field}' in row {} of {:?}", idx + 1, path)
            })?;
            column.push(value);
        }
    }
    Posterior::from_columns(keys.into_iter().zip(columns))
}

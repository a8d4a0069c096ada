//! OHLCV bar loader for CSV exports.
//!
//! Required columns: `timestamp, open, high, low, close, volume` (any order,
//! case-insensitive). `timestamp` is epoch milliseconds or an RFC 3339 /
//! `YYYY-MM-DD HH:MM:SS` UTC string. Every other column is parsed as a
//! number and carried along as an opaque indicator column.

use crate::domain::errors::DataError;
use crate::domain::market::MarketBar;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use std::io::Read;
use std::path::Path;
use tracing::info;

const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Bars plus the extra numeric columns found in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarData {
    pub bars: Vec<MarketBar>,
    pub extra_columns: Vec<(String, Vec<f64>)>,
}

impl BarData {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

pub fn load_bars(path: impl AsRef<Path>) -> Result<BarData> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).context(format!("Failed to open {:?}", path))?;
    let data = read_bars(file).context(format!("Failed to load bars from {:?}", path))?;
    info!("Loaded {} bars from {:?}", data.len(), path);
    Ok(data)
}

pub fn read_bars<R: Read>(source: R) -> Result<BarData> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut required = [0usize; 6];
    for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))?;
    }
    let [ts_idx, open_idx, high_idx, low_idx, close_idx, volume_idx] = required;

    let extra_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !required.contains(i))
        .collect();
    let mut extra: Vec<Vec<f64>> = vec![Vec::new(); extra_idx.len()];
    let mut bars = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record.context(format!("CSV parse error at row {}", row))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |idx: usize| parse_number(field(idx), &headers[idx], row);

        let bar = MarketBar::new(
            parse_timestamp(field(ts_idx), row)?,
            number(open_idx)?,
            number(high_idx)?,
            number(low_idx)?,
            number(close_idx)?,
            number(volume_idx)?,
        );
        if let Some(previous) = bars.last().map(|b: &MarketBar| b.timestamp)
            && bar.timestamp <= previous
        {
            return Err(DataError::NonMonotonicTimestamp {
                index: row,
                timestamp: bar.timestamp,
                previous,
            }
            .into());
        }
        bars.push(bar);

        for (column, &idx) in extra.iter_mut().zip(&extra_idx) {
            column.push(parse_optional_number(field(idx), &headers[idx], row)?);
        }
    }

    let extra_columns = extra_idx
        .iter()
        .map(|&idx| headers[idx].clone())
        .zip(extra)
        .collect();

    Ok(BarData {
        bars,
        extra_columns,
    })
}

fn parse_number(raw: &str, column: &str, row: usize) -> Result<f64, DataError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DataError::InvalidValue {
            column: column.to_string(),
            row,
            value: raw.to_string(),
        })
}

/// Empty cells in extra columns are missing values, not errors.
fn parse_optional_number(raw: &str, column: &str, row: usize) -> Result<f64, DataError> {
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| DataError::InvalidValue {
        column: column.to_string(),
        row,
        value: raw.to_string(),
    })
}

fn parse_timestamp(raw: &str, row: usize) -> Result<i64, DataError> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    Err(DataError::InvalidValue {
        column: "timestamp".to_string(),
        row,
        value: raw.to_string(),
    })
}

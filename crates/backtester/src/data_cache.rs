//! File-backed historical kline cache.
//!
//! One CSV file per symbol, interval and day range:
//! `<root>/<symbol>/<interval>/<from>_<to>.csv` with the columns
//! `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339 or epoch
//! milliseconds; prices are read as exact decimals.

use crate::error::BacktestError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use core_types::Kline;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Debug, Deserialize)]
struct Row {
    timestamp: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

#[derive(Debug, Clone)]
pub struct KlineCache {
    root: PathBuf,
}

impl KlineCache {
    /// Creates the cache, creating `root` if it does not exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, BacktestError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|source| BacktestError::Io { path: root.clone(), source })?;
        Ok(Self { root })
    }

    pub fn path_for(&self, symbol: &str, interval: &str, from: NaiveDate, to: NaiveDate) -> PathBuf {
        self.root
            .join(symbol)
            .join(interval)
            .join(format!("{}_{}.csv", from.format("%Y-%m-%d"), to.format("%Y-%m-%d")))
    }

    pub fn contains(&self, symbol: &str, interval: &str, from: NaiveDate, to: NaiveDate) -> bool {
        self.path_for(symbol, interval, from, to).is_file()
    }

    /// Loads a cached range, sorted and de-duplicated by timestamp.
    pub fn load(
        &self,
        symbol: &str,
        interval: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Kline>, BacktestError> {
        let path = self.path_for(symbol, interval, from, to);
        if !path.is_file() {
            return Err(BacktestError::DataUnavailable(path));
        }
        read_klines(&path)
    }

    /// Writes `klines` to the cache and returns the file path.
    pub fn store(
        &self,
        symbol: &str,
        interval: &str,
        from: NaiveDate,
        to: NaiveDate,
        klines: &[Kline],
    ) -> Result<PathBuf, BacktestError> {
        let path = self.path_for(symbol, interval, from, to);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| BacktestError::Io { path: dir.to_path_buf(), source })?;
        }
        write_klines(&path, klines)?;
        tracing::info!(path = %path.display(), bars = klines.len(), "Klines cached");
        Ok(path)
    }
}

/// Reads a kline CSV file.
///
/// Rows are ordered by timestamp and a repeated timestamp keeps the last row.
/// Rows whose prices do not form a valid bar are skipped with a warning; rows that
/// cannot be parsed at all fail the whole read.
pub fn read_klines(path: &Path) -> Result<Vec<Kline>, BacktestError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut by_time: BTreeMap<DateTime<Utc>, Kline> = BTreeMap::new();
    let mut rows = 0usize;
    let mut skipped = 0usize;

    for (index, record) in reader.deserialize::<Row>().enumerate() {
        // Line 1 is the header.
        let line = index as u64 + 2;
        let row = record?;
        rows += 1;
        let kline = parse_row(&row).map_err(|reason| BacktestError::InvalidRow {
            path: path.to_path_buf(),
            line,
            reason,
        })?;
        if let Err(e) = kline.validate() {
            tracing::warn!(path = %path.display(), line, error = %e, "Skipping invalid bar");
            skipped += 1;
            continue;
        }
        by_time.insert(kline.timestamp, kline);
    }

    let klines: Vec<Kline> = by_time.into_values().collect();
    let duplicates = rows - skipped - klines.len();
    if duplicates > 0 || skipped > 0 {
        tracing::warn!(path = %path.display(), duplicates, skipped, "Kline file needed cleaning");
    }
    tracing::debug!(path = %path.display(), bars = klines.len(), "Klines loaded");
    Ok(klines)
}

pub fn write_klines(path: &Path, klines: &[Kline]) -> Result<(), BacktestError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;
    for k in klines {
        writer.write_record([
            k.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            k.open.to_string(),
            k.high.to_string(),
            k.low.to_string(),
            k.close.to_string(),
            k.volume.to_string(),
        ])?;
    }
    writer.flush().map_err(|source| BacktestError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

fn parse_row(row: &Row) -> Result<Kline, String> {
    Ok(Kline {
        timestamp: parse_timestamp(&row.timestamp)?,
        open: parse_decimal("open", &row.open)?,
        high: parse_decimal("high", &row.high)?,
        low: parse_decimal("low", &row.low)?,
        close: parse_decimal("close", &row.close)?,
        volume: parse_decimal("volume", &row.volume)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| format!("timestamp {raw} is out of range"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("timestamp {raw:?}: {e}"))
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("{field} {raw:?}: {e}"))
}

use crate::domain::market::Bar;
use crate::domain::ports::DataModule;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CsvRecord {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Daily bars from a `date,open,high,low,close,volume` CSV file.
///
/// Rows with non-finite or non-positive prices are dropped, the rest sorted
/// by date. A date that appears twice keeps its last row.
pub struct CsvDataModule {
    path: PathBuf,
}

impl CsvDataModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_all(&self) -> Result<Vec<Bar>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open data file {:?}", self.path))?;
        let bars = parse_bars(BufReader::new(file))
            .with_context(|| format!("Failed to parse data file {:?}", self.path))?;
        info!("CsvData: Loaded {} bars from {:?}", bars.len(), self.path);
        Ok(bars)
    }
}

impl DataModule for CsvDataModule {
    fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect())
    }
}

fn parse_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    let mut dropped = 0usize;
    for (line, result) in rdr.deserialize().enumerate() {
        let record: CsvRecord = result.with_context(|| format!("Bad record at row {}", line + 1))?;
        let bar = Bar::new(
            record.date,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        );
        if bar.is_valid() {
            bars.push(bar);
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("CsvData: Dropped {} invalid rows", dropped);
    }

    // Stable sort, then keep the last row of each date
    bars.sort_by_key(|b| b.date);
    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => deduped.push(bar),
        }
    }
    Ok(deduped)
}

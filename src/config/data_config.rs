//! `[data]` section: where bars come from and which period to load.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub index_code: String,
    pub frequency: String,
    /// CSV with date,open,high,low,close,volume; synthetic data when unset
    pub csv_path: Option<PathBuf>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Seed of the synthetic series
    pub synthetic_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            index_code: "SHSE.000905".to_string(),
            frequency: "1d".to_string(),
            csv_path: None,
            start_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 19).unwrap_or_default(),
            synthetic_seed: 42,
        }
    }
}

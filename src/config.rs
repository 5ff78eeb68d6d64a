//! Run configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or a missing section) gives the stock
//! thresholds: one click, one impression, more than one conversion, a 50 click floor
//! for already targeted locations and modifiers between 0.5 and 3.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{GeoBidError, Result};
use crate::policy::BidBounds;

/// Reporting windows understood by the ad platform
pub const DATE_RANGES: [&str; 12] = [
    "TODAY",
    "YESTERDAY",
    "LAST_7_DAYS",
    "THIS_WEEK_SUN_TODAY",
    "LAST_WEEK",
    "LAST_14_DAYS",
    "LAST_30_DAYS",
    "LAST_BUSINESS_WEEK",
    "LAST_WEEK_SUN_SAT",
    "THIS_MONTH",
    "LAST_MONTH",
    "ALL_TIME",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoBidConfig {
    pub thresholds: ThresholdConfig,
    pub bounds: BoundsConfig,
    pub run: RunConfig,
    pub paths: PathsConfig,
}

/// Eligibility floors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub min_clicks: u64,
    pub min_impressions: u64,
    pub min_cost: f64,
    /// Conversions must be strictly greater than this
    pub min_conversions: f64,
    /// Click floor for locations that are already targeted
    pub min_location_clicks: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_clicks: 1,
            min_impressions: 1,
            min_cost: 0.0,
            min_conversions: 1.0,
            min_location_clicks: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsConfig {
    pub min_bid: f64,
    pub max_bid: f64,
    pub epsilon: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min_bid: 0.5,
            max_bid: 3.0,
            epsilon: crate::policy::DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub date_range: String,
    pub exclude_campaigns: Vec<String>,
    /// Hours east of UTC used to decide which weekday a run belongs to
    pub local_offset_hours: i32,
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            date_range: "LAST_30_DAYS".to_string(),
            exclude_campaigns: Vec::new(),
            local_offset_hours: 2,
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn is_excluded(&self, campaign_name: &str) -> bool {
        self.exclude_campaigns.iter().any(|name| name == campaign_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub account: PathBuf,
    pub report: PathBuf,
    pub locations: PathBuf,
    pub audit: PathBuf,
    /// Appended to by every run
    pub run_log: PathBuf,
    /// Where the updated account snapshot goes; the input snapshot is overwritten when unset
    pub account_out: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            account: PathBuf::from("account.toml"),
            report: PathBuf::from("geo_report.csv"),
            locations: PathBuf::from("locations.csv"),
            audit: PathBuf::from("audit.csv"),
            run_log: PathBuf::from("log/run.log"),
            account_out: None,
        }
    }
}

impl PathsConfig {
    pub fn account_out(&self) -> &Path {
        self.account_out.as_deref().unwrap_or(&self.account)
    }

    /// Resolve relative paths against the directory the config file lives in
    fn rebase(&mut self, base: &Path) {
        for path in [&mut self.account, &mut self.report, &mut self.locations, &mut self.audit, &mut self.run_log] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(path) = self.account_out.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

impl GeoBidConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GeoBidError::MissingConfig { path: path.to_path_buf() });
        }
        let text = fs::read_to_string(path).map_err(|e| GeoBidError::io(path, e))?;
        let mut config = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            config.paths.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bid_bounds()?;
        let epsilon = self.bounds.epsilon;
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(GeoBidError::invalid_config(format!("epsilon must be a positive number, got {}", epsilon)));
        }
        let thresholds = &self.thresholds;
        if thresholds.min_cost < 0.0 || thresholds.min_cost.is_nan() {
            return Err(GeoBidError::invalid_config(format!("min_cost must not be negative, got {}", thresholds.min_cost)));
        }
        if thresholds.min_conversions < 0.0 || thresholds.min_conversions.is_nan() {
            return Err(GeoBidError::invalid_config(format!(
                "min_conversions must not be negative, got {}",
                thresholds.min_conversions
            )));
        }
        if !DATE_RANGES.contains(&self.run.date_range.as_str()) {
            return Err(GeoBidError::invalid_config(format!(
                "unknown date_range '{}', expected one of {}",
                self.run.date_range,
                DATE_RANGES.join(", ")
            )));
        }
        if !(-12..=14).contains(&self.run.local_offset_hours) {
            return Err(GeoBidError::invalid_config(format!(
                "local_offset_hours {} is not a real timezone offset",
                self.run.local_offset_hours
            )));
        }
        Ok(())
    }

    pub fn bid_bounds(&self) -> Result<BidBounds> {
        BidBounds::new(self.bounds.min_bid, self.bounds.max_bid)
    }
}

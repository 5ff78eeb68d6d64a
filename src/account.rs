use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{GeoBidError, Result};
use crate::locations::{LocationEntry, LocationId};
use crate::metrics::MetricAggregate;
use crate::policy::{BidModifier, CampaignBaseline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Enabled,
    Paused,
    Removed,
}

/// Performance over the configured date range, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub clicks: u64,
    pub conversions: f64,
    pub impressions: u64,
    pub cost: f64,
}

impl Stats {
    pub fn metrics(&self) -> MetricAggregate {
        MetricAggregate::new(self.clicks, self.conversions, self.cost, self.impressions)
    }
}

fn no_change() -> f64 {
    1.0
}

/// A geo target the campaign already bids on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedLocation {
    pub id: LocationId,
    pub name: String,
    #[serde(default = "no_change")]
    pub bid_modifier: f64,
    #[serde(default)]
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub targeted_locations: Vec<TargetedLocation>,
}

impl Campaign {
    pub fn is_enabled(&self) -> bool {
        self.status == CampaignStatus::Enabled
    }

    /// Campaign-wide conversion rate; None without clicks
    pub fn baseline(&self) -> Option<CampaignBaseline> {
        CampaignBaseline::from_metrics(&self.stats.metrics())
    }

    pub fn is_targeting(&self, location_id: LocationId) -> bool {
        self.targeted_locations.iter().any(|location| location.id == location_id)
    }

    /// Start targeting a location; it has no stats of its own yet
    /// Returns false when the location is already targeted
    pub fn add_location(&mut self, entry: &LocationEntry, modifier: BidModifier) -> bool {
        if self.is_targeting(entry.id) {
            return false;
        }
        self.targeted_locations.push(TargetedLocation {
            id: entry.id,
            name: entry.name.clone(),
            bid_modifier: modifier.value(),
            stats: Stats::default(),
        });
        true
    }
}

/// Snapshot of the account's campaigns and their geo targets
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
}

impl Account {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| GeoBidError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let account: Self = toml::from_str(text).map_err(|e| GeoBidError::Serialization { details: e.to_string() })?;
        Ok(account)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = self.to_toml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| GeoBidError::io(parent, e))?;
            }
        }
        fs::write(path, text).map_err(|e| GeoBidError::io(path, e))
    }
}

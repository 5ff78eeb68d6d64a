use std::fs::File;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::config::ThresholdConfig;
use crate::errors::{GeoBidError, Result};
use crate::metrics::{CriterionId, GeoAggregates, LocationKey, MetricAggregate};
use crate::policy::qualifies_as_new_location;

/// One row of the geo performance report, column names as exported by the platform
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeoReportRow {
    pub campaign_id: u64,
    pub country_criteria_id: CriterionId,
    pub region_criteria_id: CriterionId,
    pub city_criteria_id: CriterionId,
    pub clicks: u64,
    pub conversions: f64,
    pub impressions: u64,
    #[serde(default)]
    pub cost: f64,
}

impl GeoReportRow {
    pub fn key(&self) -> LocationKey {
        LocationKey::new(self.city_criteria_id, self.region_criteria_id, self.country_criteria_id)
    }

    pub fn metrics(&self) -> MetricAggregate {
        MetricAggregate::new(self.clicks, self.conversions, self.cost, self.impressions)
    }

    /// Same filter the platform report query applies per row before anything is summed
    pub fn qualifies(&self, thresholds: &ThresholdConfig) -> bool {
        let metrics = self.metrics();
        qualifies_as_new_location(&metrics, thresholds.min_clicks, thresholds.min_impressions, thresholds.min_conversions)
            && metrics.cost >= thresholds.min_cost
    }
}

/// All rows of a geo performance report over the configured date range
#[derive(Debug, Clone, Default)]
pub struct GeoReport {
    pub rows: Vec<GeoReportRow>,
}

impl GeoReport {
    pub fn new(rows: Vec<GeoReportRow>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| GeoBidError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in csv_reader.deserialize::<GeoReportRow>() {
            let row = result.map_err(|e| GeoBidError::MalformedRecord {
                context: "geo report",
                line: e.position().map(|p| p.line()).unwrap_or(0),
                details: e.to_string(),
            })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// Sum the qualifying rows of one campaign by location
    pub fn aggregate_for_campaign(&self, campaign_id: u64, thresholds: &ThresholdConfig) -> GeoAggregates {
        self.rows
            .iter()
            .filter(|row| row.campaign_id == campaign_id && row.qualifies(thresholds))
            .map(|row| (row.key(), row.metrics()))
            .collect()
    }
}

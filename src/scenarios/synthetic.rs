/// Random but reproducible accounts, reports and location tables for scenarios.
///
/// Every campaign converts at its own baseline rate; each location converts at that rate times a
/// log-normal lift, so most modifiers land near 1.0 with tails that hit the bounds.

use std::error::Error;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::Distribution;

use crate::account::{Account, Campaign, CampaignStatus, Stats, TargetedLocation};
use crate::locations::{LocationEntry, LocationTable};
use crate::metrics::LocationKey;
use crate::report::{GeoReport, GeoReportRow};
use crate::utils::{current_seed, lognormal_dist, seed_with};

pub const COUNTRY: u64 = 2276;

pub struct SyntheticParams {
    pub campaigns: usize,
    /// Size of the location table
    pub locations: usize,
    /// Report rows per campaign
    pub rows_per_campaign: usize,
    /// Already targeted locations per campaign
    pub targeted_per_campaign: usize,
    pub clicks_mean: f64,
    pub clicks_stddev: f64,
    /// Standard deviation of the per-location conversion-rate lift (mean 1.0)
    pub lift_stddev: f64,
    /// Share of report rows whose key is missing from the location table
    pub unresolved_share: f64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            campaigns: 4,
            locations: 60,
            rows_per_campaign: 40,
            targeted_per_campaign: 8,
            clicks_mean: 120.0,
            clicks_stddev: 150.0,
            lift_stddev: 0.6,
            unresolved_share: 0.05,
        }
    }
}

pub struct SyntheticWorld {
    pub account: Account,
    pub report: GeoReport,
    pub table: LocationTable,
}

pub fn location_key(index: usize) -> LocationKey {
    LocationKey::new(1_000_000 + index as u64, 20_000 + (index % 16) as u64, COUNTRY)
}

impl SyntheticWorld {
    /// Generate from the seed of the current scenario iteration
    pub fn generate(params: &SyntheticParams) -> Result<Self, Box<dyn Error>> {
        Self::generate_with_seed(params, current_seed())
    }

    pub fn generate_with_seed(params: &SyntheticParams, seed: u64) -> Result<Self, Box<dyn Error>> {
        let mut rng_clicks = StdRng::seed_from_u64(seed_with(seed, 1991));
        let mut rng_rates = StdRng::seed_from_u64(seed_with(seed, 2992));
        let mut rng_pick = StdRng::seed_from_u64(seed_with(seed, 3993));
        let clicks_dist = lognormal_dist(params.clicks_mean, params.clicks_stddev)?;
        let lift_dist = lognormal_dist(1.0, params.lift_stddev)?;

        let mut table = LocationTable::new();
        for index in 0..params.locations {
            let key = location_key(index);
            table.insert(key, LocationEntry { id: key.city, name: format!("City {}", index) });
        }

        let mut campaigns = Vec::with_capacity(params.campaigns);
        let mut rows = Vec::new();
        for campaign_index in 0..params.campaigns {
            let campaign_id = 100 + campaign_index as u64;
            let baseline_rate: f64 = rng_rates.gen_range(0.01..0.06);

            let mut total_clicks = 0u64;
            for _ in 0..params.rows_per_campaign {
                let key = if rng_pick.gen_bool(params.unresolved_share) {
                    LocationKey::new(9_000_000 + rng_pick.gen_range(0..1000), 99_999, COUNTRY)
                } else {
                    location_key(rng_pick.gen_range(0..params.locations))
                };
                let clicks = clicks_dist.sample(&mut rng_clicks).round() as u64;
                let rate = (baseline_rate * lift_dist.sample(&mut rng_rates)).min(1.0);
                let conversions = ((clicks as f64 * rate) * 100.0).round() / 100.0;
                let impressions = clicks * rng_pick.gen_range(10..40);
                total_clicks += clicks;
                rows.push(GeoReportRow {
                    campaign_id,
                    country_criteria_id: key.country,
                    region_criteria_id: key.region,
                    city_criteria_id: key.city,
                    clicks,
                    conversions,
                    impressions,
                    cost: clicks as f64 * 0.4,
                });
            }

            let mut targeted_locations = Vec::with_capacity(params.targeted_per_campaign);
            for offset in 0..params.targeted_per_campaign.min(params.locations) {
                let index = (campaign_index * 7 + offset) % params.locations;
                let key = location_key(index);
                let clicks = clicks_dist.sample(&mut rng_clicks).round() as u64;
                let rate = (baseline_rate * lift_dist.sample(&mut rng_rates)).min(1.0);
                targeted_locations.push(TargetedLocation {
                    id: key.city,
                    name: format!("City {}", index),
                    bid_modifier: 1.0,
                    stats: Stats {
                        clicks,
                        conversions: ((clicks as f64 * rate) * 100.0).round() / 100.0,
                        impressions: clicks * 20,
                        cost: clicks as f64 * 0.4,
                    },
                });
            }

            let clicks = total_clicks.max(1) * 3;
            campaigns.push(Campaign {
                id: campaign_id,
                name: format!("Campaign {}", campaign_index),
                status: CampaignStatus::Enabled,
                stats: Stats {
                    clicks,
                    conversions: clicks as f64 * baseline_rate,
                    impressions: clicks * 25,
                    cost: clicks as f64 * 0.4,
                },
                targeted_locations,
            });
        }

        Ok(Self {
            account: Account { campaigns },
            report: GeoReport::new(rows),
            table,
        })
    }
}

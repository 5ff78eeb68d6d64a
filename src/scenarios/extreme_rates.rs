/// Locations converting far above or below their campaign land exactly on the bounds.
///
/// Bounds are drawn at random inside the platform range. One campaign converts at 2%; its
/// targeted and candidate locations convert at 50% (way above), 0.01% and 0% (way below).
/// Every one of them must end up on max_bid or min_bid exactly, on both the percent-scaled
/// new-location path and the fraction-scaled existing-location path.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::account::{Account, Campaign, CampaignStatus, Stats, TargetedLocation};
use crate::config::GeoBidConfig;
use crate::locations::{LocationEntry, LocationTable};
use crate::logger::Logger;
use crate::report::{GeoReport, GeoReportRow};
use crate::scenarios::synthetic::{location_key, COUNTRY};
use crate::scenarios::{check, finish, run_batch};
use crate::utils::{current_seed, seed_with};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "extreme_rates",
    run,
});

fn targeted(index: usize, clicks: u64, conversions: f64) -> TargetedLocation {
    TargetedLocation {
        id: location_key(index).city,
        name: format!("City {}", index),
        bid_modifier: 1.0,
        stats: Stats { clicks, conversions, impressions: clicks * 20, cost: 0.0 },
    }
}

fn report_row(index: usize, clicks: u64, conversions: f64) -> GeoReportRow {
    let key = location_key(index);
    GeoReportRow {
        campaign_id: 1,
        country_criteria_id: COUNTRY,
        region_criteria_id: key.region,
        city_criteria_id: key.city,
        clicks,
        conversions,
        impressions: clicks * 20,
        cost: 0.0,
    }
}

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed_with(current_seed(), 4994));

    let mut config = GeoBidConfig::default();
    config.bounds.min_bid = (rng.gen_range(0.1..0.95_f64) * 100.0).round() / 100.0;
    config.bounds.max_bid = (rng.gen_range(1.5..10.0_f64) * 100.0).round() / 100.0;
    let (min_bid, max_bid) = (config.bounds.min_bid, config.bounds.max_bid);

    // scale traffic so the ratios, not the volumes, drive the outcome
    let scale: u64 = rng.gen_range(1..20);
    let clicks = 1000 * scale;

    let mut table = LocationTable::new();
    for index in 0..6 {
        let key = location_key(index);
        table.insert(key, LocationEntry { id: key.city, name: format!("City {}", index) });
    }

    let mut account = Account {
        campaigns: vec![Campaign {
            id: 1,
            name: "Extremes".to_string(),
            status: CampaignStatus::Enabled,
            stats: Stats { clicks: clicks * 10, conversions: (clicks * 10) as f64 * 0.02, impressions: 0, cost: 0.0 },
            targeted_locations: vec![
                targeted(0, clicks, clicks as f64 * 0.5),
                targeted(1, clicks, clicks as f64 * 0.0001),
                targeted(2, clicks, 0.0),
            ],
        }],
    };
    let report = GeoReport::new(vec![
        report_row(3, clicks, clicks as f64 * 0.5),
        report_row(4, clicks, (clicks as f64 * 0.0001).max(1.5)),
    ]);

    let (summary, _) = run_batch(&config, &mut account, &report, &table, logger)?;
    let modifier = |index: usize| {
        account.campaigns[0]
            .targeted_locations
            .iter()
            .find(|location| location.id == location_key(index).city)
            .map(|location| location.bid_modifier)
    };

    let mut errors: Vec<String> = Vec::new();
    check(
        logger,
        &mut errors,
        modifier(0) == Some(max_bid),
        format!("Targeted location at 25x the campaign rate lands on max_bid {}: {:?}", max_bid, modifier(0)),
    );
    check(
        logger,
        &mut errors,
        modifier(1) == Some(min_bid),
        format!("Targeted location at 1/200 of the campaign rate lands on min_bid {}: {:?}", min_bid, modifier(1)),
    );
    check(
        logger,
        &mut errors,
        modifier(2) == Some(min_bid),
        format!("Targeted location without conversions lands on min_bid {}: {:?}", min_bid, modifier(2)),
    );
    check(
        logger,
        &mut errors,
        modifier(3) == Some(max_bid),
        format!("New location at 25x the campaign rate is added at max_bid {}: {:?}", max_bid, modifier(3)),
    );
    check(
        logger,
        &mut errors,
        modifier(4) == Some(min_bid),
        format!("New location far below the campaign rate is added at min_bid {}: {:?}", min_bid, modifier(4)),
    );
    check(
        logger,
        &mut errors,
        summary.added == 2 && summary.updated == 3,
        format!("Added {} and updated {} locations", summary.added, summary.updated),
    );

    finish(scenario_name, errors)
}

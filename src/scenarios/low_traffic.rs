/// Targeted locations under the click floor are left alone.
///
/// The floor is drawn at random; every targeted location with fewer clicks keeps its modifier and
/// gets no audit record, however far its conversion rate is from the campaign's.

use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::GeoBidConfig;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::scenarios::synthetic::{SyntheticParams, SyntheticWorld};
use crate::scenarios::{check, finish, run_batch};
use crate::utils::{current_seed, seed_with};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "low_traffic",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(seed_with(current_seed(), 5995));
    let mut config = GeoBidConfig::default();
    config.thresholds.min_location_clicks = rng.gen_range(50..300);
    let floor = config.thresholds.min_location_clicks;

    let params = SyntheticParams { targeted_per_campaign: 20, lift_stddev: 2.0, ..SyntheticParams::default() };
    let mut world = SyntheticWorld::generate(&params)?;
    for campaign in world.account.campaigns.iter_mut() {
        for location in campaign.targeted_locations.iter_mut() {
            location.bid_modifier = 1.25;
        }
    }

    // (campaign, location) pairs under the floor before the run
    let mut quiet: HashSet<(String, u64)> = HashSet::new();
    for campaign in &world.account.campaigns {
        for location in &campaign.targeted_locations {
            if location.stats.clicks < floor {
                quiet.insert((campaign.name.clone(), location.id));
            }
        }
    }
    logln!(logger, LogEvent::Run, "Click floor {}, {} targeted locations under it", floor, quiet.len());

    let (summary, sink) = run_batch(&config, &mut world.account, &world.report, &world.table, logger)?;

    let mut touched = 0;
    for campaign in &world.account.campaigns {
        for location in &campaign.targeted_locations {
            if quiet.contains(&(campaign.name.clone(), location.id)) && location.bid_modifier != 1.25 {
                touched += 1;
            }
        }
    }
    let recorded = sink
        .records
        .iter()
        .filter(|record| quiet.contains(&(record.campaign.clone(), record.location_id)))
        .count();

    let mut errors: Vec<String> = Vec::new();
    check(
        logger,
        &mut errors,
        touched == 0,
        format!("No location under {} clicks changed its modifier ({} did)", floor, touched),
    );
    check(
        logger,
        &mut errors,
        recorded == 0,
        format!("No location under {} clicks was audited ({} were)", floor, recorded),
    );
    check(
        logger,
        &mut errors,
        summary.skipped_low_traffic >= quiet.len(),
        format!("Low traffic skips {} cover the {} quiet locations", summary.skipped_low_traffic, quiet.len()),
    );

    finish(scenario_name, errors)
}

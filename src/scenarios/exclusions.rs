/// Excluded and paused campaigns are never touched.
///
/// The first campaign is on the exclusion list and the second is paused; both must come out of the
/// run exactly as they went in, with no audit records, while the remaining campaigns still get
/// decisions.

use crate::account::CampaignStatus;
use crate::config::GeoBidConfig;
use crate::logger::Logger;
use crate::scenarios::synthetic::{SyntheticParams, SyntheticWorld};
use crate::scenarios::{check, finish, run_batch};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "exclusions",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut world = SyntheticWorld::generate(&SyntheticParams::default())?;
    world.account.campaigns[1].status = CampaignStatus::Paused;

    let mut config = GeoBidConfig::default();
    let excluded_name = world.account.campaigns[0].name.clone();
    let paused_name = world.account.campaigns[1].name.clone();
    config.run.exclude_campaigns = vec![excluded_name.clone()];

    let before = world.account.clone();
    let (summary, sink) = run_batch(&config, &mut world.account, &world.report, &world.table, logger)?;

    let mut errors: Vec<String> = Vec::new();
    check(
        logger,
        &mut errors,
        world.account.campaigns[0] == before.campaigns[0] && sink.for_campaign(&excluded_name).count() == 0,
        format!("Excluded campaign '{}' is untouched", excluded_name),
    );
    check(
        logger,
        &mut errors,
        world.account.campaigns[1] == before.campaigns[1] && sink.for_campaign(&paused_name).count() == 0,
        format!("Paused campaign '{}' is untouched", paused_name),
    );

    let others_with_decisions = world.account.campaigns[2..]
        .iter()
        .filter(|campaign| sink.for_campaign(&campaign.name).count() > 0)
        .count();
    check(
        logger,
        &mut errors,
        others_with_decisions == world.account.campaigns.len() - 2,
        format!("{} of {} remaining campaigns got decisions", others_with_decisions, world.account.campaigns.len() - 2),
    );
    check(
        logger,
        &mut errors,
        summary.campaigns_excluded == 1 && summary.campaigns_visited == world.account.campaigns.len() - 2,
        format!("Visited {} campaigns, excluded {}", summary.campaigns_visited, summary.campaigns_excluded),
    );

    finish(scenario_name, errors)
}

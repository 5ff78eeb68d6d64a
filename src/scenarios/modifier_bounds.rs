/// Every modifier a run writes stays inside the configured bounds.
///
/// Generates a random account where location conversion rates scatter log-normally around each
/// campaign's baseline, runs the batch once and checks:
///
/// - every added or updated modifier lies in [min_bid, max_bid] and is finite
/// - every "unchanged" decision really is within epsilon of the current modifier
/// - the run found something to do at all

use crate::audit::Outcome;
use crate::config::GeoBidConfig;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::scenarios::synthetic::{SyntheticParams, SyntheticWorld};
use crate::scenarios::{check, finish, run_batch};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "modifier_bounds",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = GeoBidConfig::default();
    let params = SyntheticParams { lift_stddev: 1.5, ..SyntheticParams::default() };
    let mut world = SyntheticWorld::generate(&params)?;

    let (summary, sink) = run_batch(&config, &mut world.account, &world.report, &world.table, logger)?;

    let mut errors: Vec<String> = Vec::new();
    let (min_bid, max_bid) = (config.bounds.min_bid, config.bounds.max_bid);

    let out_of_bounds = sink
        .records
        .iter()
        .filter(|record| record.outcome != Outcome::Unchanged)
        .filter(|record| !(record.new_modifier.is_finite() && record.new_modifier >= min_bid && record.new_modifier <= max_bid))
        .count();
    check(
        logger,
        &mut errors,
        out_of_bounds == 0,
        format!("All {} written modifiers lie in [{}, {}] ({} outside)", summary.changes(), min_bid, max_bid, out_of_bounds),
    );

    let churn = sink
        .records
        .iter()
        .filter(|record| record.outcome == Outcome::Unchanged)
        .filter(|record| record.old_modifier.map_or(true, |old| (old - record.new_modifier).abs() >= config.bounds.epsilon))
        .count();
    check(
        logger,
        &mut errors,
        churn == 0,
        format!("Unchanged decisions are within epsilon {} of the current modifier ({} are not)", config.bounds.epsilon, churn),
    );

    let clamped = sink
        .records
        .iter()
        .filter(|record| record.new_modifier == min_bid || record.new_modifier == max_bid)
        .count();
    logln!(logger, LogEvent::Run, "{} of {} decisions landed on a bound", clamped, sink.records.len());

    check(
        logger,
        &mut errors,
        summary.added > 0 && summary.updated + summary.unchanged > 0,
        format!("Run added {} and revisited {} locations", summary.added, summary.updated + summary.unchanged),
    );

    finish(scenario_name, errors)
}

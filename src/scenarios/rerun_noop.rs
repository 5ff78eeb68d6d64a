/// Running twice over the same stats changes nothing the second time.
///
/// After the first run every qualifying location holds exactly the modifier its stats imply, so
/// the second run must neither add nor update anything and must leave the account as it was.

use crate::audit::Outcome;
use crate::config::GeoBidConfig;
use crate::logger::Logger;
use crate::scenarios::synthetic::{SyntheticParams, SyntheticWorld};
use crate::scenarios::{check, finish, run_batch};

// Register this scenario in the catalog
inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "rerun_noop",
    run,
});

pub fn run(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let config = GeoBidConfig::default();
    let mut world = SyntheticWorld::generate(&SyntheticParams::default())?;

    let (first, _) = run_batch(&config, &mut world.account, &world.report, &world.table, logger)?;
    let after_first = world.account.clone();
    let (second, sink) = run_batch(&config, &mut world.account, &world.report, &world.table, logger)?;

    let mut errors: Vec<String> = Vec::new();
    check(
        logger,
        &mut errors,
        first.changes() > 0,
        format!("First run changed {} modifiers", first.changes()),
    );
    check(
        logger,
        &mut errors,
        second.changes() == 0 && sink.count(Outcome::Updated) == 0,
        format!("Second run added {} and updated {}", second.added, second.updated),
    );
    check(
        logger,
        &mut errors,
        second.unchanged == first.updated + first.unchanged,
        format!(
            "Second run saw {} unchanged locations, first run revisited {}",
            second.unchanged,
            first.updated + first.unchanged
        ),
    );
    check(
        logger,
        &mut errors,
        world.account == after_first,
        "Account is identical after the second run".to_string(),
    );

    finish(scenario_name, errors)
}

use std::error::Error;
use std::sync::atomic::Ordering;

use crate::account::Account;
use crate::audit::{MemoryAuditSink, RunStamp};
use crate::batch::{BatchRun, RunSummary};
use crate::config::GeoBidConfig;
use crate::locations::LocationResolverTrait;
use crate::logger::{LogEvent, Logger};
use crate::report::GeoReport;
use crate::utils::TOTAL_SCENARIO_RUNS;
use crate::{errln, logln};

/// Function type for scenario entry functions
pub type ScenarioFn = fn(scenario_name: &str, logger: &mut Logger) -> Result<(), Box<dyn Error>>;

/// Entry in the scenario catalog
#[derive(Clone)]
pub struct ScenarioEntry {
    pub short_name: &'static str,
    pub run: ScenarioFn,
}

// Create an inventory collection for scenario entries
inventory::collect!(ScenarioEntry);

/// Get all registered scenarios from the catalog, sorted by name
pub fn get_scenario_catalog() -> Vec<ScenarioEntry> {
    let mut catalog: Vec<ScenarioEntry> = inventory::iter::<ScenarioEntry>
        .into_iter()
        .cloned()
        .collect();
    catalog.sort_by_key(|entry| entry.short_name);
    catalog
}

/// Run the batch job into a memory sink and count it
pub fn run_batch(
    config: &GeoBidConfig,
    account: &mut Account,
    report: &GeoReport,
    resolver: &dyn LocationResolverTrait,
    logger: &mut Logger,
) -> Result<(RunSummary, MemoryAuditSink), Box<dyn Error>> {
    let batch = BatchRun::new(config, RunStamp::now(config.run.local_offset_hours))?;
    let mut sink = MemoryAuditSink::new();
    let summary = batch.run(account, report, resolver, &mut sink, logger)?;
    TOTAL_SCENARIO_RUNS.fetch_add(1, Ordering::Relaxed);
    Ok((summary, sink))
}

/// Log one validation line and remember it if it failed
pub fn check(logger: &mut Logger, errors: &mut Vec<String>, passed: bool, msg: String) {
    if passed {
        logln!(logger, LogEvent::Run, "✓ {}", msg);
    } else {
        errln!(logger, LogEvent::Run, "✗ {}", msg);
        errors.push(msg);
    }
}

/// Turn collected failures into the scenario result
pub fn finish(scenario_name: &str, errors: Vec<String>) -> Result<(), Box<dyn Error>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Scenario '{}' validation failed:\n{}", scenario_name, errors.join("\n")).into())
    }
}

// Users can register scenarios directly using inventory::submit!
// Example:
// inventory::submit!(scenarios::ScenarioEntry {
//     short_name: "name",
//     run: function,
// });

pub mod synthetic;

// Scenario modules
pub mod modifier_bounds;
pub mod rerun_noop;
pub mod exclusions;
pub mod extreme_rates;
pub mod low_traffic;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lists_every_scenario() {
        let names: Vec<&str> = get_scenario_catalog().iter().map(|entry| entry.short_name).collect();
        assert_eq!(names, vec!["exclusions", "extreme_rates", "low_traffic", "modifier_bounds", "rerun_noop"]);
    }

    #[test]
    fn test_every_scenario_passes_on_a_few_seeds() {
        // scenarios read the shared seed, so they run one after another here
        for entry in get_scenario_catalog() {
            for seed in 0..3 {
                crate::utils::RAND_SEED.store(seed, Ordering::Relaxed);
                let mut logger = Logger::new();
                if let Err(e) = (entry.run)(entry.short_name, &mut logger) {
                    panic!("{} failed on seed {}: {}", entry.short_name, seed, e);
                }
            }
        }
    }

    #[test]
    fn test_finish() {
        assert!(finish("x", Vec::new()).is_ok());
        let error = finish("x", vec!["a".to_string(), "b".to_string()]).unwrap_err();
        assert_eq!(error.to_string(), "Scenario 'x' validation failed:\na\nb");
    }
}

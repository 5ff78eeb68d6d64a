mod account;
mod audit;
mod batch;
mod charts;
mod config;
mod errors;
mod locations;
mod logger;
mod metrics;
mod policy;
mod report;
mod scenarios;
mod utils;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use config::GeoBidConfig;
use errors::GeoBidError;
use logger::{sanitize_filename, ConsoleReceiver, FileReceiver, LogEvent, Logger};
use scenarios::get_scenario_catalog;
use utils::{RAND_SEED, TOTAL_SCENARIO_RUNS};

const USAGE: &str = "Usage:
  geobid run <config.toml> [--dry-run] [--verbose]
  geobid scenario <name|all> [iterations] [start] [--fastbreak]
  geobid charts <audit.csv>";

fn main() {
    let raw_args: Vec<String> = std::env::args().collect();

    // Parse and filter out flags
    let mut args = Vec::new();
    let mut fastbreak = false;
    let mut dry_run = false;
    let mut verbose = false;
    for arg in raw_args.iter().skip(1) {
        match arg.as_str() {
            "--fastbreak" => fastbreak = true,
            "--dry-run" => dry_run = true,
            "--verbose" => verbose = true,
            _ => args.push(arg.clone()),
        }
    }

    match args.first().map(String::as_str) {
        Some("run") if args.len() > 1 => {
            if let Err(e) = run_batch_job(Path::new(&args[1]), dry_run, verbose) {
                eprintln!("Error: {}", e);
                std::process::exit(e.exit_code());
            }
        }
        Some("scenario") if args.len() > 1 => run_scenarios(&args[1..], fastbreak),
        Some("charts") if args.len() > 1 => {
            match charts::generate_modifier_histogram(Path::new(&args[1])) {
                Ok(()) => {
                    println!("Histogram generation completed successfully.");
                }
                Err(e) => {
                    eprintln!("Error generating histogram: {}", e);
                    std::process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Load the config, wire up console and run-log receivers, run the job
fn run_batch_job(config_path: &Path, dry_run: bool, verbose: bool) -> Result<(), GeoBidError> {
    let mut config = GeoBidConfig::load(config_path)?;
    config.run.dry_run |= dry_run;

    let mut logger = Logger::new();
    let mut console_events = vec![LogEvent::Run, LogEvent::Campaign];
    if verbose {
        console_events.push(LogEvent::Decision);
    }
    logger.add_receiver(ConsoleReceiver::new(console_events));
    let log_path = config.paths.run_log.clone();
    let file_receiver = FileReceiver::append(&log_path, vec![LogEvent::Run, LogEvent::Campaign, LogEvent::Decision])
        .map_err(|e| GeoBidError::io(&log_path, e))?;
    logger.add_receiver(file_receiver);

    logln!(&mut logger, LogEvent::Run, "Config {} (date range {})", config_path.display(), config.run.date_range);
    batch::run_job(&config, &mut logger)?;
    logger.flush().map_err(|e| GeoBidError::io(&log_path, e))?;
    Ok(())
}

fn run_scenarios(args: &[String], fastbreak: bool) {
    let scenario_arg = &args[0];

    // Parse iterations parameter if present
    let iterations = if args.len() > 1 {
        match args[1].parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("Error: Invalid iterations parameter '{}'. Expected a number.", args[1]);
                std::process::exit(1);
            }
        }
    } else {
        1
    };

    // Parse optional starting iteration index if present
    let start_iteration = if args.len() > 2 {
        match args[2].parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("Error: Invalid start iteration parameter '{}'. Expected a number.", args[2]);
                std::process::exit(1);
            }
        }
    } else {
        0
    };

    let all_scenarios = get_scenario_catalog();
    let scenarios: Vec<_> = if scenario_arg == "all" {
        all_scenarios.clone()
    } else {
        match all_scenarios.iter().find(|s| s.short_name == scenario_arg) {
            Some(scenario) => vec![scenario.clone()],
            None => {
                eprintln!("Error: Scenario '{}' not found.", scenario_arg);
                eprintln!("Available scenarios:");
                for s in &all_scenarios {
                    eprintln!("  - {}", s.short_name);
                }
                std::process::exit(1);
            }
        }
    };

    // Individual checks only reach the console for a single scenario run once
    let mut logger = Logger::new();
    if scenario_arg != "all" && iterations == 1 {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation, LogEvent::Run]));
    } else {
        logger.add_receiver(ConsoleReceiver::new(vec![LogEvent::Validation]));
    }

    let summary_receiver_id = match FileReceiver::new(Path::new("log/summary.log"), vec![LogEvent::Validation]) {
        Ok(receiver) => Some(logger.add_receiver(receiver)),
        Err(e) => {
            eprintln!("Warning: cannot write log/summary.log: {}", e);
            None
        }
    };

    TOTAL_SCENARIO_RUNS.store(0, Ordering::Relaxed);
    if scenario_arg == "all" {
        logln!(&mut logger, LogEvent::Validation, "Running all scenarios {} time(s)...\n", iterations);
    } else {
        logln!(&mut logger, LogEvent::Validation, "Running scenario '{}' {} time(s)...\n", scenario_arg, iterations);
    }

    let mut failures = 0u64;
    'scenarios: for scenario in &scenarios {
        log!(&mut logger, LogEvent::Validation, "{}: ", scenario.short_name);

        let scenario_log = PathBuf::from(format!("log/{}/scenario.log", sanitize_filename(scenario.short_name)));
        let scenario_receiver_id = FileReceiver::new(&scenario_log, vec![LogEvent::Run, LogEvent::Campaign, LogEvent::Decision])
            .ok()
            .map(|receiver| logger.add_receiver(receiver));

        for i in start_iteration..(start_iteration + iterations) {
            if iterations > 1 {
                log!(&mut logger, LogEvent::Validation, "[{}/{}] ", i - start_iteration + 1, iterations);
            }

            // Set RAND_SEED to iteration number
            RAND_SEED.store(i, Ordering::Relaxed);

            match (scenario.run)(scenario.short_name, &mut logger) {
                Ok(()) => {
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✓");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✓ PASSED");
                    }
                }
                Err(e) => {
                    failures += 1;
                    if iterations > 1 {
                        logln!(&mut logger, LogEvent::Validation, "✗");
                    } else {
                        logln!(&mut logger, LogEvent::Validation, "✗ FAILED: {}", e);
                    }

                    if fastbreak {
                        if let Some(id) = scenario_receiver_id {
                            logger.remove_receiver(id);
                        }
                        logln!(&mut logger, LogEvent::Validation, "\nStopping scenario execution due to failure (--fastbreak enabled)");
                        logln!(&mut logger, LogEvent::Validation, "Error at seed {}: {}", i, e);
                        break 'scenarios;
                    }
                }
            }

            // Flush to ensure validation is written to summary.log
            let _ = logger.flush();
        }

        if let Some(id) = scenario_receiver_id {
            logger.remove_receiver(id);
        }
    }

    let total_runs = TOTAL_SCENARIO_RUNS.load(Ordering::Relaxed);
    logln!(&mut logger, LogEvent::Validation, "\nBatch runs completed: {}, failures: {}", total_runs, failures);
    let _ = logger.flush();
    if let Some(id) = summary_receiver_id {
        logger.remove_receiver(id);
    }
    if failures > 0 {
        std::process::exit(1);
    }
}

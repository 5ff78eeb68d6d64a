//! One linear pass over the account, in two phases:
//!
//! - New locations: for every enabled, non-excluded campaign, sum the qualifying report rows per
//!   location, resolve each to a geo target and start targeting it with a percent-scaled modifier.
//!   Locations the campaign already targets are left to the second phase.
//!
//! - Existing locations: for every enabled, non-excluded campaign with conversions and enough
//!   clicks, recompute each targeted location's modifier from its own stats and write it back
//!   unless it is within epsilon of the current one.
//!
//! Every skip is a value (see `policy::Unqualified`); only I/O on the audit sink can fail a run.
//!
//! `run_job` wraps one pass with the file collaborators named in the config.

use crate::account::{Account, Campaign};
use crate::audit::{AuditRecord, AuditSinkTrait, CsvAuditSink, MemoryAuditSink, Outcome, RunStamp};
use crate::config::GeoBidConfig;
use crate::errors::Result;
use crate::locations::{LocationResolverTrait, LocationTable};
use crate::logger::{LogEvent, Logger};
use crate::policy::{
    existing_location_modifier, new_location_modifier, qualifies_as_existing_location,
    should_update_existing_modifier, BidBounds, Unqualified,
};
use crate::report::GeoReport;
use crate::{logln, warnln};

/// Counts of what a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub campaigns_visited: usize,
    pub campaigns_excluded: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_unresolved: usize,
    pub skipped_already_targeted: usize,
    pub skipped_unqualified: usize,
    pub skipped_low_traffic: usize,
}

impl RunSummary {
    /// Number of modifiers written to the account
    pub fn changes(&self) -> usize {
        self.added + self.updated
    }
}

/// Load the location table, report and account, run once, save the account, then append the audit log
///
/// Records are staged in memory and reach the audit log only after the account is saved, or
/// marked as dry run when nothing is saved. A failed save leaves the audit log untouched.
pub fn run_job(config: &GeoBidConfig, logger: &mut Logger) -> Result<RunSummary> {
    let table = LocationTable::load(&config.paths.locations, logger)?;
    if table.is_empty() {
        warnln!(
            logger,
            LogEvent::Run,
            "Location table {} is empty, no new locations can be added",
            config.paths.locations.display()
        );
    }
    let report = GeoReport::load(&config.paths.report)?;
    let mut account = Account::load(&config.paths.account)?;
    logln!(
        logger,
        LogEvent::Run,
        "Loaded {} locations, {} report rows, {} campaigns",
        table.len(),
        report.rows.len(),
        account.campaigns.len()
    );

    let batch = BatchRun::new(config, RunStamp::now(config.run.local_offset_hours))?;
    let mut staged = MemoryAuditSink::new();
    let summary = batch.run(&mut account, &report, &table, &mut staged, logger)?;

    if config.run.dry_run {
        logln!(logger, LogEvent::Run, "Dry run, {} changes not saved", summary.changes());
    } else {
        let out = config.paths.account_out();
        account.save(out)?;
        logln!(logger, LogEvent::Run, "Saved {} changes to {}", summary.changes(), out.display());
    }

    let mut audit = CsvAuditSink::open(&config.paths.audit)?;
    staged.drain_into(&mut audit)?;
    Ok(summary)
}

pub struct BatchRun<'a> {
    config: &'a GeoBidConfig,
    bounds: BidBounds,
    stamp: RunStamp,
}

impl<'a> BatchRun<'a> {
    pub fn new(config: &'a GeoBidConfig, stamp: RunStamp) -> Result<Self> {
        config.validate()?;
        let bounds = config.bid_bounds()?;
        Ok(Self { config, bounds, stamp })
    }

    pub fn run(
        &self,
        account: &mut Account,
        report: &GeoReport,
        resolver: &dyn LocationResolverTrait,
        sink: &mut dyn AuditSinkTrait,
        logger: &mut Logger,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        logln!(
            logger,
            LogEvent::Run,
            "Run {} (weekday {}): bounds [{}, {}], epsilon {}",
            self.stamp.date,
            self.stamp.weekday(),
            self.bounds.min_bid(),
            self.bounds.max_bid(),
            self.config.bounds.epsilon
        );

        for campaign in account.campaigns.iter_mut() {
            if !campaign.is_enabled() {
                continue;
            }
            if self.config.run.is_excluded(&campaign.name) {
                summary.campaigns_excluded += 1;
                logln!(logger, LogEvent::Campaign, "Campaign '{}' is excluded", campaign.name);
                continue;
            }
            summary.campaigns_visited += 1;
            self.add_new_locations(campaign, report, resolver, sink, logger, &mut summary)?;
        }

        logln!(logger, LogEvent::Campaign, "Updating targeted locations");
        for campaign in account.campaigns.iter_mut() {
            if !self.is_eligible_for_updates(campaign) {
                continue;
            }
            self.update_existing_locations(campaign, sink, logger, &mut summary)?;
        }

        sink.flush()?;
        logln!(
            logger,
            LogEvent::Run,
            "Run {}: {} added, {} updated, {} unchanged, {} unqualified, {} low traffic, {} unresolved",
            self.stamp.date,
            summary.added,
            summary.updated,
            summary.unchanged,
            summary.skipped_unqualified,
            summary.skipped_low_traffic,
            summary.skipped_unresolved
        );
        Ok(summary)
    }

    /// Enabled, not excluded, converting, and with more clicks than the floor
    fn is_eligible_for_updates(&self, campaign: &Campaign) -> bool {
        campaign.is_enabled()
            && !self.config.run.is_excluded(&campaign.name)
            && campaign.stats.conversions > 0.0
            && campaign.stats.clicks > self.config.thresholds.min_clicks
    }

    fn add_new_locations(
        &self,
        campaign: &mut Campaign,
        report: &GeoReport,
        resolver: &dyn LocationResolverTrait,
        sink: &mut dyn AuditSinkTrait,
        logger: &mut Logger,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let aggregates = report.aggregate_for_campaign(campaign.id, &self.config.thresholds);
        logln!(logger, LogEvent::Campaign, "Campaign '{}': {} candidate locations", campaign.name, aggregates.len());
        if aggregates.is_empty() {
            return Ok(());
        }

        let Some(baseline) = campaign.baseline() else {
            summary.skipped_unqualified += aggregates.len();
            logln!(logger, LogEvent::Campaign, "Campaign '{}' has no clicks, no new locations", campaign.name);
            return Ok(());
        };

        for (key, metrics) in aggregates.iter() {
            let Some(entry) = resolver.resolve(key) else {
                summary.skipped_unresolved += 1;
                warnln!(logger, LogEvent::Decision, "Location {} is not in the location table", key);
                continue;
            };

            let modifier = match new_location_modifier(metrics, &baseline, &self.bounds) {
                Ok(modifier) => modifier,
                Err(reason) => {
                    summary.skipped_unqualified += 1;
                    logln!(logger, LogEvent::Decision, "  skip {} ({}): {}", entry.name, entry.id, reason);
                    continue;
                }
            };

            if !campaign.add_location(entry, modifier) {
                summary.skipped_already_targeted += 1;
                logln!(logger, LogEvent::Decision, "  {} ({}) already targeted", entry.name, entry.id);
                continue;
            }

            summary.added += 1;
            let record = AuditRecord {
                stamp: self.stamp,
                campaign: campaign.name.clone(),
                location_id: entry.id,
                location_name: entry.name.clone(),
                outcome: Outcome::Added,
                old_modifier: None,
                new_modifier: modifier.value(),
                dry_run: self.config.run.dry_run,
            };
            logln!(
                logger,
                LogEvent::Decision,
                "  {} Clicks: {} Conversions: {}",
                record.label(),
                metrics.clicks,
                metrics.conversions
            );
            sink.record(record)?;
        }
        Ok(())
    }

    fn update_existing_locations(
        &self,
        campaign: &mut Campaign,
        sink: &mut dyn AuditSinkTrait,
        logger: &mut Logger,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let Some(baseline) = campaign.baseline() else {
            return Ok(());
        };
        let min_location_clicks = self.config.thresholds.min_location_clicks;

        for location in campaign.targeted_locations.iter_mut() {
            if !qualifies_as_existing_location(location.stats.clicks, min_location_clicks) {
                summary.skipped_low_traffic += 1;
                continue;
            }

            let modifier = match existing_location_modifier(&location.stats.metrics(), &baseline, &self.bounds) {
                Ok(modifier) => modifier,
                Err(Unqualified::ZeroBaseline) => {
                    // the whole campaign is unusable, nothing further to look at
                    summary.skipped_unqualified += 1;
                    return Ok(());
                }
                Err(reason) => {
                    summary.skipped_unqualified += 1;
                    logln!(logger, LogEvent::Decision, "  skip {} ({}): {}", location.name, location.id, reason);
                    continue;
                }
            };

            let old_modifier = location.bid_modifier;
            let outcome = if should_update_existing_modifier(old_modifier, modifier.value(), self.config.bounds.epsilon) {
                location.bid_modifier = modifier.value();
                summary.updated += 1;
                Outcome::Updated
            } else {
                summary.unchanged += 1;
                Outcome::Unchanged
            };

            let record = AuditRecord {
                stamp: self.stamp,
                campaign: campaign.name.clone(),
                location_id: location.id,
                location_name: location.name.clone(),
                outcome,
                old_modifier: Some(old_modifier),
                new_modifier: modifier.value(),
                dry_run: self.config.run.dry_run,
            };
            logln!(logger, LogEvent::Decision, "  {} (was {:.3})", record.label(), old_modifier);
            sink.record(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{applied_modifiers, read_audit_rows};
    use crate::locations::LocationEntry;
    use crate::metrics::LocationKey;
    use chrono::NaiveDate;

    const ACCOUNT: &str = r#"
[[campaigns]]
id = 100
name = "Generic"
status = "enabled"
stats = { clicks = 2000, conversions = 40.0 }

[[campaigns.targeted_locations]]
id = 2276
name = "Germany"
bid_modifier = 1.0
stats = { clicks = 1000, conversions = 30.0 }

[[campaigns.targeted_locations]]
id = 2040
name = "Austria"
bid_modifier = 1.0
stats = { clicks = 20, conversions = 5.0 }

[[campaigns.targeted_locations]]
id = 1004437
name = "Hamburg"
bid_modifier = 1.0
stats = { clicks = 500, conversions = 10.0 }

[[campaigns]]
id = 200
name = "Brand"
status = "enabled"
stats = { clicks = 1000, conversions = 50.0 }

[[campaigns.targeted_locations]]
id = 2276
name = "Germany"
bid_modifier = 1.0
stats = { clicks = 900, conversions = 90.0 }

[[campaigns]]
id = 300
name = "Paused"
status = "paused"
stats = { clicks = 1000, conversions = 50.0 }

[[campaigns.targeted_locations]]
id = 2276
name = "Germany"
bid_modifier = 1.0
stats = { clicks = 900, conversions = 90.0 }
"#;

    const REPORT: &str = "\
CampaignId,CountryCriteriaId,RegionCriteriaId,CityCriteriaId,Clicks,Conversions,Impressions,Cost
100,2276,20228,1003854,100,4.0,900,10.0
100,2276,20223,1004437,100,6.0,900,10.0
100,2276,20229,1006094,100,30.0,900,10.0
100,2276,20230,9999999,100,5.0,900,10.0
100,2276,20231,1007768,100,1.0,900,10.0
200,2276,20228,1003854,100,5.0,900,10.0
300,2276,20228,1003854,100,5.0,900,10.0
";

    fn table() -> LocationTable {
        let mut table = LocationTable::new();
        table.insert(LocationKey::new(1003854, 20228, 2276), LocationEntry { id: 1003854, name: "Berlin".to_string() });
        table.insert(LocationKey::new(1004437, 20223, 2276), LocationEntry { id: 1004437, name: "Hamburg".to_string() });
        table.insert(LocationKey::new(1006094, 20229, 2276), LocationEntry { id: 1006094, name: "Munich".to_string() });
        table.insert(LocationKey::new(1007768, 20231, 2276), LocationEntry { id: 1007768, name: "Cologne".to_string() });
        table
    }

    fn stamp() -> RunStamp {
        RunStamp::new(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap())
    }

    fn config(exclude: &[&str]) -> GeoBidConfig {
        let mut config = GeoBidConfig::default();
        config.run.exclude_campaigns = exclude.iter().map(|name| name.to_string()).collect();
        config
    }

    fn run(config: &GeoBidConfig, account: &mut Account) -> (RunSummary, MemoryAuditSink) {
        let report = GeoReport::from_reader(REPORT.as_bytes()).unwrap();
        let mut sink = MemoryAuditSink::new();
        let mut logger = Logger::new();
        let batch = BatchRun::new(config, stamp()).unwrap();
        let summary = batch.run(account, &report, &table(), &mut sink, &mut logger).unwrap();
        (summary, sink)
    }

    fn modifier_of(account: &Account, campaign: usize, location_id: u64) -> f64 {
        account.campaigns[campaign]
            .targeted_locations
            .iter()
            .find(|location| location.id == location_id)
            .unwrap()
            .bid_modifier
    }

    #[test]
    fn test_new_locations_are_added_with_clamped_modifier() {
        let config = config(&[]);
        let mut account = Account::from_toml(ACCOUNT).unwrap();
        let (summary, sink) = run(&config, &mut account);

        // Generic converts at 2%: Berlin 4% -> 2.0, Munich 30% -> clamped 3.0
        assert!((modifier_of(&account, 0, 1003854) - 2.0).abs() < 1e-9);
        assert_eq!(modifier_of(&account, 0, 1006094), 3.0);
        // Brand converts at 5%, Berlin at 5% there -> 1.0
        assert!((modifier_of(&account, 1, 1003854) - 1.0).abs() < 1e-9);

        assert_eq!(summary.added, 3);
        assert_eq!(sink.count(Outcome::Added), 3);
        assert_eq!(summary.skipped_unresolved, 1);
        // Hamburg is already targeted in Generic
        assert_eq!(summary.skipped_already_targeted, 1);
        // Cologne has a single conversion and never becomes a candidate
        assert!(!account.campaigns[0].is_targeting(1007768));
    }

    #[test]
    fn test_paused_campaigns_are_untouched() {
        let config = config(&[]);
        let original = Account::from_toml(ACCOUNT).unwrap();
        let mut account = original.clone();
        let (_, sink) = run(&config, &mut account);
        assert_eq!(account.campaigns[2], original.campaigns[2]);
        assert_eq!(sink.for_campaign("Paused").count(), 0);
    }

    #[test]
    fn test_excluded_campaigns_are_untouched() {
        let config = config(&["Brand"]);
        let original = Account::from_toml(ACCOUNT).unwrap();
        let mut account = original.clone();
        let (summary, sink) = run(&config, &mut account);
        assert_eq!(account.campaigns[1], original.campaigns[1]);
        assert_eq!(sink.for_campaign("Brand").count(), 0);
        assert_eq!(summary.campaigns_excluded, 1);
        assert_eq!(summary.campaigns_visited, 1);
    }

    #[test]
    fn test_existing_locations_are_updated() {
        let config = config(&[]);
        let mut account = Account::from_toml(ACCOUNT).unwrap();
        let (summary, sink) = run(&config, &mut account);

        // Germany in Generic: 3% vs 2% -> 1.5
        assert!((modifier_of(&account, 0, 2276) - 1.5).abs() < 1e-9);
        // Austria has 20 clicks, under the 50 click floor
        assert_eq!(modifier_of(&account, 0, 2040), 1.0);
        // Hamburg: 2% vs 2% -> within epsilon of 1.0
        assert_eq!(modifier_of(&account, 0, 1004437), 1.0);
        // Germany in Brand: 10% vs 5% -> 2.0
        assert!((modifier_of(&account, 1, 2276) - 2.0).abs() < 1e-9);

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(sink.count(Outcome::Unchanged), 1);
        // Austria plus the three freshly added locations, which have no stats yet
        assert_eq!(summary.skipped_low_traffic, 4);

        let hamburg = sink.records.iter().find(|record| record.outcome == Outcome::Unchanged).unwrap();
        assert_eq!(hamburg.location_id, 1004437);
        assert_eq!(hamburg.old_modifier, Some(1.0));
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let config = config(&[]);
        let mut account = Account::from_toml(ACCOUNT).unwrap();
        run(&config, &mut account);
        let after_first = account.clone();

        let (summary, sink) = run(&config, &mut account);
        assert_eq!(summary.changes(), 0);
        assert_eq!(sink.count(Outcome::Updated), 0);
        assert_eq!(account, after_first);
    }

    #[test]
    fn test_campaign_without_conversions_is_not_updated() {
        let config = config(&[]);
        let text = r#"
[[campaigns]]
id = 100
name = "Cold"
status = "enabled"
stats = { clicks = 2000, conversions = 0.0 }

[[campaigns.targeted_locations]]
id = 2276
name = "Germany"
bid_modifier = 1.7
stats = { clicks = 1000, conversions = 0.0 }
"#;
        let mut account = Account::from_toml(text).unwrap();
        let (summary, sink) = run(&config, &mut account);
        assert_eq!(modifier_of(&account, 0, 2276), 1.7);
        assert_eq!(summary.updated, 0);
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_campaign_without_clicks_adds_nothing() {
        let config = config(&[]);
        let text = "[[campaigns]]\nid = 100\nname = \"New\"\nstatus = \"enabled\"\n";
        let mut account = Account::from_toml(text).unwrap();
        let (summary, _) = run(&config, &mut account);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.skipped_unqualified, 4);
        assert!(account.campaigns[0].targeted_locations.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GeoBidConfig::default();
        config.bounds.min_bid = 5.0;
        assert!(BatchRun::new(&config, stamp()).is_err());
    }

    const LOCATIONS: &str = "\
Criteria ID,Name,Key
1003854,Berlin,\"1003854,20228,2276\"
1004437,Hamburg,\"1004437,20223,2276\"
1006094,Munich,\"1006094,20229,2276\"
1007768,Cologne,\"1007768,20231,2276\"
";

    /// Input files in a fresh directory, with a config pointing at them
    fn job_fixture(name: &str) -> (std::path::PathBuf, GeoBidConfig) {
        let dir = std::env::temp_dir().join(format!("geobid_job_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("account.toml"), ACCOUNT).unwrap();
        std::fs::write(dir.join("geo_report.csv"), REPORT).unwrap();
        std::fs::write(dir.join("locations.csv"), LOCATIONS).unwrap();

        let mut config = GeoBidConfig::default();
        config.paths.account = dir.join("account.toml");
        config.paths.report = dir.join("geo_report.csv");
        config.paths.locations = dir.join("locations.csv");
        config.paths.audit = dir.join("audit.csv");
        (dir, config)
    }

    #[test]
    fn test_job_saves_account_then_audits() {
        let (dir, config) = job_fixture("save");
        let summary = run_job(&config, &mut Logger::new()).unwrap();

        let saved = Account::load(&config.paths.account).unwrap();
        assert!(saved.campaigns[0].is_targeting(1003854));
        assert!((modifier_of(&saved, 0, 2276) - 1.5).abs() < 1e-9);

        let rows = read_audit_rows(std::fs::File::open(&config.paths.audit).unwrap()).unwrap();
        assert_eq!(rows.len(), summary.added + summary.updated + summary.unchanged);
        assert!(rows.iter().all(|row| !row.dry_run));
        assert_eq!(applied_modifiers(&config.paths.audit).unwrap().len(), summary.changes());

        // the saved snapshot already holds every change
        let rerun = run_job(&config, &mut Logger::new()).unwrap();
        assert_eq!(rerun.changes(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dry_run_job_keeps_account_and_marks_audit() {
        let (dir, mut config) = job_fixture("dry");
        config.run.dry_run = true;
        let summary = run_job(&config, &mut Logger::new()).unwrap();
        assert!(summary.changes() > 0);

        assert_eq!(std::fs::read_to_string(&config.paths.account).unwrap(), ACCOUNT);
        let rows = read_audit_rows(std::fs::File::open(&config.paths.audit).unwrap()).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|row| row.dry_run));
        assert!(applied_modifiers(&config.paths.audit).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_job_writes_to_account_out() {
        let (dir, mut config) = job_fixture("out");
        config.paths.account_out = Some(dir.join("out/account.toml"));
        run_job(&config, &mut Logger::new()).unwrap();

        assert_eq!(std::fs::read_to_string(&config.paths.account).unwrap(), ACCOUNT);
        let saved = Account::load(&dir.join("out/account.toml")).unwrap();
        assert!(saved.campaigns[0].is_targeting(1003854));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_save_leaves_audit_log_alone() {
        let (dir, mut config) = job_fixture("failed_save");
        // a directory cannot be written as a file
        config.paths.account_out = Some(dir.clone());
        let error = run_job(&config, &mut Logger::new()).unwrap_err();
        assert_eq!(error.code(), "GB-3001");

        assert!(!config.paths.audit.exists());
        assert_eq!(std::fs::read_to_string(&config.paths.account).unwrap(), ACCOUNT);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_report_fails_before_writing() {
        let (dir, config) = job_fixture("missing_report");
        std::fs::remove_file(&config.paths.report).unwrap();
        let error = run_job(&config, &mut Logger::new()).unwrap_err();
        assert_eq!(error.code(), "GB-3001");
        assert_eq!(error.exit_code(), 1);

        assert!(!config.paths.audit.exists());
        assert_eq!(std::fs::read_to_string(&config.paths.account).unwrap(), ACCOUNT);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

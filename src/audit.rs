//! Audit trail of every decision a run makes.
//!
//! Each added, updated or unchanged location becomes one record keyed by run date and
//! location. Records also carry the weekday (Monday = 1) so a weekly view can be rebuilt
//! from the log.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use chrono::{Datelike, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GeoBidError, Result};
use crate::locations::LocationId;
use crate::policy::percent_change;

/// Date a run is filed under, in the account's local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub date: NaiveDate,
}

impl RunStamp {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// Today, shifted by `offset_hours` east of UTC
    pub fn now(offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { date: Utc::now().with_timezone(&offset).date_naive() }
    }

    /// Monday = 1 ... Sunday = 7
    pub fn weekday(&self) -> u32 {
        self.date.weekday().number_from_monday()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Location was not targeted and now is
    Added,
    /// Existing target got a new modifier
    Updated,
    /// Existing target qualified but the new modifier is within epsilon of the old one
    Unchanged,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Outcome::Added => "added",
            Outcome::Updated => "updated",
            Outcome::Unchanged => "unchanged",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub stamp: RunStamp,
    pub campaign: String,
    pub location_id: LocationId,
    pub location_name: String,
    pub outcome: Outcome,
    /// None for added locations
    pub old_modifier: Option<f64>,
    pub new_modifier: f64,
    /// Decided but not saved to the account
    pub dry_run: bool,
}

impl AuditRecord {
    /// Human readable line, e.g. "Berlin (1003854) : 23%"
    pub fn label(&self) -> String {
        match self.outcome {
            Outcome::Unchanged => format!("{} ({}) : no change", self.location_name, self.location_id),
            _ => format!("{} ({}) : {}%", self.location_name, self.location_id, percent_change(self.new_modifier)),
        }
    }
}

/// Trait for wherever decisions get recorded
pub trait AuditSinkTrait {
    fn record(&mut self, record: AuditRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Flat CSV row; also what the charts command reads back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    pub date: String,
    pub weekday: u32,
    pub campaign: String,
    pub location_id: LocationId,
    pub location_name: String,
    pub outcome: Outcome,
    pub old_modifier: Option<f64>,
    pub new_modifier: f64,
    pub label: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl From<&AuditRecord> for AuditRow {
    fn from(record: &AuditRecord) -> Self {
        Self {
            date: record.stamp.date.format("%Y-%m-%d").to_string(),
            weekday: record.stamp.weekday(),
            campaign: record.campaign.clone(),
            location_id: record.location_id,
            location_name: record.location_name.clone(),
            outcome: record.outcome,
            old_modifier: record.old_modifier,
            new_modifier: record.new_modifier,
            label: record.label(),
            dry_run: record.dry_run,
        }
    }
}

/// Appends records to a CSV file, writing the header only for a new or empty file
pub struct CsvAuditSink {
    writer: csv::Writer<File>,
}

impl CsvAuditSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| GeoBidError::io(parent, e))?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| GeoBidError::io(path, e))?;
        let is_empty = file.metadata().map_err(|e| GeoBidError::io(path, e))?.len() == 0;
        let writer = csv::WriterBuilder::new().has_headers(is_empty).from_writer(file);
        Ok(Self { writer })
    }
}

impl AuditSinkTrait for CsvAuditSink {
    fn record(&mut self, record: AuditRecord) -> Result<()> {
        self.writer.serialize(AuditRow::from(&record))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| GeoBidError::Csv { context: "audit", details: e.to_string() })
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub records: Vec<AuditRecord>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|record| record.outcome == outcome).count()
    }

    /// Hand every record over to another sink, leaving this one empty
    pub fn drain_into(&mut self, sink: &mut dyn AuditSinkTrait) -> Result<()> {
        for record in self.records.drain(..) {
            sink.record(record)?;
        }
        sink.flush()
    }

    pub fn for_campaign<'a>(&'a self, campaign: &'a str) -> impl Iterator<Item = &'a AuditRecord> + 'a {
        self.records.iter().filter(move |record| record.campaign == campaign)
    }
}

impl AuditSinkTrait for MemoryAuditSink {
    fn record(&mut self, record: AuditRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Read an audit log back
pub fn read_audit_rows<R: io::Read>(reader: R) -> Result<Vec<AuditRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<AuditRow>() {
        let row = result.map_err(|e| GeoBidError::MalformedRecord {
            context: "audit log",
            line: e.position().map(|p| p.line()).unwrap_or(0),
            details: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Modifiers that were actually written to the account (added or updated, not in a dry run)
pub fn applied_modifiers(path: &Path) -> Result<Vec<f64>> {
    let file = File::open(path).map_err(|e| GeoBidError::io(path, e))?;
    let rows = read_audit_rows(file)?;
    Ok(rows
        .into_iter()
        .filter(|row| row.outcome != Outcome::Unchanged && !row.dry_run)
        .map(|row| row.new_modifier)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> RunStamp {
        // a Wednesday
        RunStamp::new(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap())
    }

    fn record(outcome: Outcome, new_modifier: f64) -> AuditRecord {
        AuditRecord {
            stamp: stamp(),
            campaign: "Generic".to_string(),
            location_id: 1003854,
            location_name: "Berlin".to_string(),
            outcome,
            old_modifier: if outcome == Outcome::Added { None } else { Some(1.0) },
            new_modifier,
            dry_run: false,
        }
    }

    #[test]
    fn test_weekday_is_monday_based() {
        assert_eq!(stamp().weekday(), 3);
        assert_eq!(RunStamp::new(NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()).weekday(), 1);
        assert_eq!(RunStamp::new(NaiveDate::from_ymd_opt(2024, 5, 19).unwrap()).weekday(), 7);
    }

    #[test]
    fn test_now_stays_within_a_day_of_utc() {
        let utc = Utc::now().date_naive();
        let stamp = RunStamp::now(14);
        assert!((stamp.date - utc).num_days().abs() <= 1);
    }

    #[test]
    fn test_labels() {
        assert_eq!(record(Outcome::Added, 1.23).label(), "Berlin (1003854) : 23%");
        assert_eq!(record(Outcome::Updated, 0.5).label(), "Berlin (1003854) : -50%");
        assert_eq!(record(Outcome::Unchanged, 1.0).label(), "Berlin (1003854) : no change");
    }

    #[test]
    fn test_memory_sink_counts() {
        let mut sink = MemoryAuditSink::new();
        sink.record(record(Outcome::Added, 1.5)).unwrap();
        sink.record(record(Outcome::Updated, 2.0)).unwrap();
        sink.record(record(Outcome::Updated, 2.5)).unwrap();
        assert_eq!(sink.count(Outcome::Added), 1);
        assert_eq!(sink.count(Outcome::Updated), 2);
        assert_eq!(sink.count(Outcome::Unchanged), 0);
        assert_eq!(sink.for_campaign("Generic").count(), 3);
        assert_eq!(sink.for_campaign("Brand").count(), 0);
    }

    #[test]
    fn test_csv_sink_appends_with_single_header() {
        let path = std::env::temp_dir().join(format!("geobid_audit_{}/audit.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let mut sink = CsvAuditSink::open(&path).unwrap();
            sink.record(record(Outcome::Added, 1.5)).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = CsvAuditSink::open(&path).unwrap();
            sink.record(record(Outcome::Unchanged, 1.0)).unwrap();
            sink.record(record(Outcome::Updated, 0.75)).unwrap();
            sink.flush().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("location_id").count(), 1);

        let rows = read_audit_rows(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, "2024-05-15");
        assert_eq!(rows[0].weekday, 3);
        assert_eq!(rows[0].old_modifier, None);
        assert_eq!(rows[2].old_modifier, Some(1.0));

        assert_eq!(applied_modifiers(&path).unwrap(), vec![1.5, 0.75]);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_dry_run_rows_are_not_applied() {
        let path = std::env::temp_dir().join(format!("geobid_audit_dry_{}/audit.csv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = CsvAuditSink::open(&path).unwrap();
        let mut dry_added = record(Outcome::Added, 2.0);
        dry_added.dry_run = true;
        let mut dry_updated = record(Outcome::Updated, 1.5);
        dry_updated.dry_run = true;
        sink.record(dry_added).unwrap();
        sink.record(dry_updated).unwrap();
        sink.record(record(Outcome::Added, 0.8)).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let rows = read_audit_rows(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(rows.iter().filter(|row| row.dry_run).count(), 2);
        assert_eq!(applied_modifiers(&path).unwrap(), vec![0.8]);
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_rows_without_dry_run_column_are_not_dry_runs() {
        let text = "date,weekday,campaign,location_id,location_name,outcome,old_modifier,new_modifier,label\n\
2024-05-15,3,Generic,1003854,Berlin,added,,2.0,Berlin (1003854) : 100%\n";
        let rows = read_audit_rows(text.as_bytes()).unwrap();
        assert!(!rows[0].dry_run);
    }

    #[test]
    fn test_drain_into_moves_records() {
        let mut staged = MemoryAuditSink::new();
        staged.record(record(Outcome::Added, 1.5)).unwrap();
        staged.record(record(Outcome::Updated, 0.5)).unwrap();
        let mut target = MemoryAuditSink::new();
        staged.drain_into(&mut target).unwrap();
        assert!(staged.records.is_empty());
        assert_eq!(target.records.len(), 2);
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use crate::errors::{GeoBidError, Result};
use crate::logger::{LogEvent, Logger};
use crate::metrics::LocationKey;
use crate::warnln;

/// Canonical geo target identifier on the ad platform
pub type LocationId = u64;

/// A geo target the campaign can bid on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    pub id: LocationId,
    pub name: String,
}

/// Trait for mapping report keys to canonical geo targets
pub trait LocationResolverTrait {
    /// Returns None when the key is not a known target; such rows are skipped
    fn resolve(&self, key: &LocationKey) -> Option<&LocationEntry>;
}

/// Lookup table of geo targets read from CSV
///
/// Column layout follows the geotargets export used to build the table:
/// - column 0: location id
/// - column 1: display name
/// - column 2: canonical key "city,region,country"
///
/// A header row is allowed; any row whose id column is not a number is skipped silently.
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    entries: HashMap<LocationKey, LocationEntry>,
}

impl LocationTable {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Register a target; a later insert for the same key wins
    pub fn insert(&mut self, key: LocationKey, entry: LocationEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path, logger: &mut Logger) -> Result<Self> {
        let file = File::open(path).map_err(|e| GeoBidError::io(path, e))?;
        Self::from_reader(file, logger)
    }

    pub fn from_reader<R: io::Read>(reader: R, logger: &mut Logger) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Self::new();
        for record in csv_reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let Some(id) = record.get(0).and_then(parse_location_id) else {
                continue;
            };
            let key_text = record.get(2).unwrap_or("");
            let Some(key) = LocationKey::parse(key_text) else {
                warnln!(logger, LogEvent::Run, "location table line {}: unusable key '{}', skipping", line, key_text);
                continue;
            };
            let name = match record.get(1) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => key.to_string(),
            };
            table.insert(key, LocationEntry { id, name });
        }
        Ok(table)
    }
}

impl LocationResolverTrait for LocationTable {
    fn resolve(&self, key: &LocationKey) -> Option<&LocationEntry> {
        self.entries.get(key)
    }
}

/// Ids exported from spreadsheets sometimes come through as floats ("1003854.0")
fn parse_location_id(text: &str) -> Option<LocationId> {
    if let Ok(id) = text.parse::<LocationId>() {
        return Some(id);
    }
    let value = text.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as LocationId)
    } else {
        None
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

/// Criterion identifier as used by the ad platform for cities, regions and countries
pub type CriterionId = u64;

/// Composite identity of a geographic row in a performance report
/// Rows sharing a key are summed into one MetricAggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocationKey {
    pub city: CriterionId,
    pub region: CriterionId,
    pub country: CriterionId,
}

impl LocationKey {
    pub fn new(city: CriterionId, region: CriterionId, country: CriterionId) -> Self {
        Self { city, region, country }
    }

    /// Parse the canonical "city,region,country" text form used by location tables
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(',').map(|part| part.trim().parse::<CriterionId>());
        let city = parts.next()?.ok()?;
        let region = parts.next()?.ok()?;
        let country = parts.next()?.ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { city, region, country })
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.city, self.region, self.country)
    }
}

/// Performance metrics summed over a reporting window
/// All fields are non-negative; conversions and cost are fractional on the platform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricAggregate {
    pub clicks: u64,
    pub conversions: f64,
    pub cost: f64,
    pub impressions: u64,
}

impl MetricAggregate {
    /// Build an aggregate, flooring negative or non-finite fractional inputs to zero
    pub fn new(clicks: u64, conversions: f64, cost: f64, impressions: u64) -> Self {
        Self {
            clicks,
            conversions: non_negative(conversions),
            cost: non_negative(cost),
            impressions,
        }
    }

    /// Conversions divided by clicks, as a fraction
    /// Returns None when there are no clicks, the rate is undefined then
    pub fn conversion_rate(&self) -> Option<f64> {
        if self.clicks == 0 {
            return None;
        }
        Some(self.conversions / self.clicks as f64)
    }
}

impl AddAssign for MetricAggregate {
    fn add_assign(&mut self, other: Self) {
        self.clicks += other.clicks;
        self.conversions += other.conversions;
        self.cost += other.cost;
        self.impressions += other.impressions;
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Mapping from LocationKey to the sum of all rows seen for that key
/// Iteration follows key order so runs are deterministic
#[derive(Debug, Clone, Default)]
pub struct GeoAggregates {
    aggregates: BTreeMap<LocationKey, MetricAggregate>,
}

impl GeoAggregates {
    pub fn new() -> Self {
        Self { aggregates: BTreeMap::new() }
    }

    /// Sum the metrics of one row into the aggregate for its key
    /// A key seen for the first time starts from a zero aggregate
    pub fn add(&mut self, key: LocationKey, metrics: MetricAggregate) {
        *self.aggregates.entry(key).or_default() += metrics;
    }

    #[cfg(test)]
    pub fn get(&self, key: &LocationKey) -> Option<&MetricAggregate> {
        self.aggregates.get(key)
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LocationKey, &MetricAggregate)> {
        self.aggregates.iter()
    }
}

impl FromIterator<(LocationKey, MetricAggregate)> for GeoAggregates {
    fn from_iter<I: IntoIterator<Item = (LocationKey, MetricAggregate)>>(iter: I) -> Self {
        let mut aggregates = Self::new();
        for (key, metrics) in iter {
            aggregates.add(key, metrics);
        }
        aggregates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_key_parse_and_display() {
        let key = LocationKey::parse("1003854, 20228,2276").unwrap();
        assert_eq!(key, LocationKey::new(1003854, 20228, 2276));
        assert_eq!(key.to_string(), "1003854,20228,2276");
    }

    #[test]
    fn test_location_key_parse_rejects_bad_input() {
        assert_eq!(LocationKey::parse("1,2"), None);
        assert_eq!(LocationKey::parse("1,2,3,4"), None);
        assert_eq!(LocationKey::parse("Berlin,2,3"), None);
        assert_eq!(LocationKey::parse(""), None);
    }

    #[test]
    fn test_conversion_rate_undefined_without_clicks() {
        let metrics = MetricAggregate::new(0, 3.0, 1.0, 100);
        assert_eq!(metrics.conversion_rate(), None);

        let metrics = MetricAggregate::new(40, 2.0, 1.0, 100);
        assert_eq!(metrics.conversion_rate(), Some(0.05));
    }

    #[test]
    fn test_negative_inputs_floor_to_zero() {
        let metrics = MetricAggregate::new(5, -1.0, f64::NAN, 10);
        assert_eq!(metrics.conversions, 0.0);
        assert_eq!(metrics.cost, 0.0);
    }

    #[test]
    fn test_aggregates_sum_rows_per_key() {
        let berlin = LocationKey::new(1003854, 20228, 2276);
        let hamburg = LocationKey::new(1004437, 20223, 2276);

        let aggregates: GeoAggregates = vec![
            (berlin, MetricAggregate::new(10, 1.0, 2.5, 100)),
            (hamburg, MetricAggregate::new(3, 0.0, 0.5, 40)),
            (berlin, MetricAggregate::new(5, 1.5, 1.0, 60)),
        ]
        .into_iter()
        .collect();

        assert_eq!(aggregates.len(), 2);
        let summed = aggregates.get(&berlin).unwrap();
        assert_eq!(summed.clicks, 15);
        assert_eq!(summed.conversions, 2.5);
        assert_eq!(summed.cost, 3.5);
        assert_eq!(summed.impressions, 160);
        assert_eq!(aggregates.get(&hamburg).unwrap().clicks, 3);
    }

    #[test]
    fn test_aggregates_iterate_in_key_order() {
        let mut aggregates = GeoAggregates::new();
        aggregates.add(LocationKey::new(3, 1, 1), MetricAggregate::default());
        aggregates.add(LocationKey::new(1, 1, 1), MetricAggregate::default());
        aggregates.add(LocationKey::new(2, 1, 1), MetricAggregate::default());
        let cities: Vec<CriterionId> = aggregates.iter().map(|(key, _)| key.city).collect();
        assert_eq!(cities, vec![1, 2, 3]);
    }
}

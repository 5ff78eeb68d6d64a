//! Bid modifier policy for geographic targets.
//!
//! Everything in here is a pure function of its inputs. A location either qualifies and gets a
//! clamped multiplier, or it does not and the caller leaves its current state untouched.
//! "No decision" is always an `Unqualified` value, never a panic or an error.
//!
//! Two formulas share the clamp:
//! - existing targeted locations compare fraction-expressed rates directly
//! - new locations express their own rate as a percentage and divide the ratio by 100
//!   before clamping (see `RateScale`)

use std::fmt;

use crate::errors::{GeoBidError, Result};
use crate::metrics::MetricAggregate;

/// Lowest multiplier the platform accepts (-90%)
pub const PLATFORM_MIN_BID: f64 = 0.1;
/// Highest multiplier the platform accepts (+900%)
pub const PLATFORM_MAX_BID: f64 = 10.0;
/// Changes smaller than this are not worth writing back
pub const DEFAULT_EPSILON: f64 = 0.002;

/// Reason a location gets no modifier in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unqualified {
    /// Location has no clicks, so its conversion rate is undefined
    NoClicks,
    /// Campaign conversion rate is zero or missing
    ZeroBaseline,
    /// Division did not produce a number
    UndefinedRatio,
}

impl fmt::Display for Unqualified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Unqualified::NoClicks => "no clicks",
            Unqualified::ZeroBaseline => "zero campaign conversion rate",
            Unqualified::UndefinedRatio => "undefined ratio",
        };
        write!(f, "{}", text)
    }
}

/// Inclusive range a modifier is clamped into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BidBounds {
    min_bid: f64,
    max_bid: f64,
}

impl BidBounds {
    /// Both ends must lie in the platform range and min_bid must not exceed max_bid
    pub fn new(min_bid: f64, max_bid: f64) -> Result<Self> {
        let in_platform_range = |value: f64| (PLATFORM_MIN_BID..=PLATFORM_MAX_BID).contains(&value);
        if !in_platform_range(min_bid) || !in_platform_range(max_bid) {
            return Err(GeoBidError::invalid_config(format!(
                "bid bounds [{}, {}] must lie within [{}, {}]",
                min_bid, max_bid, PLATFORM_MIN_BID, PLATFORM_MAX_BID
            )));
        }
        if min_bid > max_bid {
            return Err(GeoBidError::invalid_config(format!(
                "min_bid {} is greater than max_bid {}",
                min_bid, max_bid
            )));
        }
        Ok(Self { min_bid, max_bid })
    }

    pub fn min_bid(&self) -> f64 {
        self.min_bid
    }

    pub fn max_bid(&self) -> f64 {
        self.max_bid
    }

    /// max(min_bid, min(max_bid, ratio)); infinities land on the bounds
    fn clamp(&self, ratio: f64) -> BidModifier {
        BidModifier(ratio.min(self.max_bid).max(self.min_bid))
    }
}

/// Multiplicative bid adjustment, 1.0 means no change
/// Only produced by the policy, so it is always finite and inside the bounds it was clamped to
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BidModifier(f64);

impl BidModifier {
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whole-percent change relative to the base bid, rounding halves upward
    pub fn percent_change(&self) -> i64 {
        percent_change(self.0)
    }
}

impl fmt::Display for BidModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent_change())
    }
}

/// Whole-percent change of a raw multiplier, used for modifiers read back from the platform too
pub fn percent_change(multiplier: f64) -> i64 {
    ((multiplier - 1.0) * 100.0 + 0.5).floor() as i64
}

/// Campaign-wide conversion rate over the reporting window, the denominator of every ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CampaignBaseline {
    pub conversion_rate: f64,
}

impl CampaignBaseline {
    /// None when the campaign has no clicks
    pub fn from_metrics(metrics: &MetricAggregate) -> Option<Self> {
        metrics.conversion_rate().map(|conversion_rate| Self { conversion_rate })
    }
}

/// Units of the entity conversion rate handed to the ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScale {
    /// Entity rate is a fraction, like the baseline
    Fraction,
    /// Entity rate is a percentage; the ratio is divided by 100 before clamping
    Percent,
}

impl RateScale {
    fn ratio(&self, entity_rate: f64, campaign_rate: f64) -> f64 {
        match self {
            RateScale::Fraction => entity_rate / campaign_rate,
            RateScale::Percent => (entity_rate / campaign_rate) / 100.0,
        }
    }

    /// Express a fraction rate in this scale
    pub fn express(&self, fraction_rate: f64) -> f64 {
        match self {
            RateScale::Fraction => fraction_rate,
            RateScale::Percent => fraction_rate * 100.0,
        }
    }
}

/// Gate for locations the campaign does not target yet
/// Conversions must be strictly greater than the threshold
pub fn qualifies_as_new_location(metrics: &MetricAggregate, min_clicks: u64, min_impressions: u64, min_conversions_threshold: f64) -> bool {
    metrics.clicks >= min_clicks
        && metrics.impressions >= min_impressions
        && metrics.conversions > min_conversions_threshold
}

/// Gate for locations that are already targeted; small samples are left alone
pub fn qualifies_as_existing_location(clicks: u64, min_location_clicks: u64) -> bool {
    clicks >= min_location_clicks
}

/// Clamp entity_rate / campaign_rate into the bounds, both rates given as fractions
pub fn compute_modifier(entity_conversion_rate: f64, campaign_conversion_rate: f64, bounds: &BidBounds) -> std::result::Result<BidModifier, Unqualified> {
    compute_scaled_modifier(entity_conversion_rate, campaign_conversion_rate, RateScale::Fraction, bounds)
}

/// Same as compute_modifier, with the entity rate expressed in `scale`
pub fn compute_scaled_modifier(entity_conversion_rate: f64, campaign_conversion_rate: f64, scale: RateScale, bounds: &BidBounds) -> std::result::Result<BidModifier, Unqualified> {
    if campaign_conversion_rate == 0.0 || !campaign_conversion_rate.is_finite() {
        return Err(Unqualified::ZeroBaseline);
    }
    let ratio = scale.ratio(entity_conversion_rate, campaign_conversion_rate);
    if ratio.is_nan() {
        return Err(Unqualified::UndefinedRatio);
    }
    Ok(bounds.clamp(ratio))
}

/// False when the two modifiers differ by less than epsilon
pub fn should_update_existing_modifier(old_modifier: f64, new_modifier: f64, epsilon: f64) -> bool {
    let difference = (old_modifier - new_modifier).abs();
    if difference < epsilon {
        return false;
    }
    true
}

/// Modifier for a location the campaign is about to start targeting
pub fn new_location_modifier(metrics: &MetricAggregate, baseline: &CampaignBaseline, bounds: &BidBounds) -> std::result::Result<BidModifier, Unqualified> {
    let scale = RateScale::Percent;
    let rate = metrics.conversion_rate().ok_or(Unqualified::NoClicks)?;
    compute_scaled_modifier(scale.express(rate), baseline.conversion_rate, scale, bounds)
}

/// Modifier for a location the campaign already targets
pub fn existing_location_modifier(metrics: &MetricAggregate, baseline: &CampaignBaseline, bounds: &BidBounds) -> std::result::Result<BidModifier, Unqualified> {
    let rate = metrics.conversion_rate().ok_or(Unqualified::NoClicks)?;
    compute_modifier(rate, baseline.conversion_rate, bounds)
}

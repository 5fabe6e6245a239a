use crate::normalize::CostIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label attached to suspects when the caller does not name its window.
pub const DEFAULT_WINDOW_LABEL: &str = "last_14_days";

#[derive(Debug, Error, PartialEq)]
pub enum InvalidConfigurationError {
    #[error("{name} threshold must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("percentage threshold must not be negative, got {0}")]
    NegativePercentage(f64),
}

/// Percentage threshold is in percent units (30.0 means 30%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub pct: f64,
    pub abs: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { pct: 30.0, abs: 1000.0 }
    }
}

impl Thresholds {
    pub fn new(pct: f64, abs: f64) -> Result<Self, InvalidConfigurationError> {
        let t = Self { pct, abs };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if !self.pct.is_finite() {
            return Err(InvalidConfigurationError::NonFinite { name: "percentage", value: self.pct });
        }
        if !self.abs.is_finite() {
            return Err(InvalidConfigurationError::NonFinite { name: "absolute", value: self.abs });
        }
        if self.pct < 0.0 {
            return Err(InvalidConfigurationError::NegativePercentage(self.pct));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Percentage,
    Absolute,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspectRecord {
    pub service: String,
    pub region: String,
    pub current_cost: f64,
    pub previous_cost: f64,
    pub change_pct: f64,
    pub time_window: String,
    pub trigger: Trigger,
}

pub fn detect(
    current: &CostIndex,
    previous: &CostIndex,
    pct_threshold: f64,
    abs_threshold: f64,
    window_label: &str,
) -> Result<Vec<SuspectRecord>, InvalidConfigurationError> {
    let thresholds = Thresholds::new(pct_threshold, abs_threshold)?;
    detect_with(current, previous, &thresholds, window_label)
}

/// Compare two windows and return every (service, region) in `current`
/// whose growth exceeds `pct` or whose spend alone exceeds `abs`.
///
/// Keys only in `previous` are never reported. A zero or missing baseline
/// disables the percentage rule for that key. Comparisons are strict and
/// use unrounded values; only the emitted fields are rounded.
pub fn detect_with(
    current: &CostIndex,
    previous: &CostIndex,
    thresholds: &Thresholds,
    window_label: &str,
) -> Result<Vec<SuspectRecord>, InvalidConfigurationError> {
    thresholds.validate()?;
    let mut out = Vec::new();
    for (key, current_cost) in current.iter() {
        let prev_cost = previous.get(key).unwrap_or(0.0);
        // Scaling before the division keeps exact ratios exact (130 vs 100 is 30.0, not 30.000000000000004).
        let change_pct = if prev_cost > 0.0 {
            let scaled = (current_cost - prev_cost) * 100.0;
            if scaled.is_finite() {
                Some(scaled / prev_cost)
            } else {
                Some((current_cost - prev_cost) / prev_cost * 100.0)
            }
        } else {
            None
        };
        let by_pct = change_pct.map_or(false, |c| c > thresholds.pct);
        let by_abs = current_cost > thresholds.abs;
        let trigger = match (by_pct, by_abs) {
            (true, true) => Trigger::Both,
            (true, false) => Trigger::Percentage,
            (false, true) => Trigger::Absolute,
            (false, false) => continue,
        };
        out.push(SuspectRecord {
            service: key.service.clone(),
            region: key.region.clone(),
            current_cost: round2(current_cost),
            previous_cost: round2(prev_cost),
            change_pct: change_pct.map_or(0.0, round2),
            time_window: window_label.to_string(),
            trigger,
        });
    }
    Ok(out)
}

/// Two-decimal rounding with ties to even, the same as Python's `round(x, 2)`
/// on an exact tie (`1000.125` shows as `1000.12`).
pub fn round2(x: f64) -> f64 {
    // Past this magnitude scaling by 100 overflows and there are no cents left to round.
    if !x.is_finite() || x.abs() > 1e300 {
        return x;
    }
    (x * 100.0).round_ties_even() / 100.0
}

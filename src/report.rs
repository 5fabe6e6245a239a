use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Metric the billing export carries amounts under unless told otherwise.
pub const DEFAULT_METRIC: &str = "UnblendedCost";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DimensionKey {
    pub service: String,
    pub region: String,
}

impl DimensionKey {
    pub fn new(service: impl Into<String>, region: impl Into<String>) -> Self {
        Self { service: service.into(), region: region.into() }
    }
}

impl fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.region)
    }
}

/// Where in the report a violation was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub bucket: usize,
    pub group: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket {} group {}", self.bucket, self.group)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MalformedReportError {
    #[error("report is not a JSON object")]
    NotObject,
    #[error("json parse error: {0}")]
    Parse(String),
    #[error("{field} is not an array")]
    NotArray { field: &'static str },
    #[error("{at}: expected exactly two dimension keys, found {found}")]
    KeyArity { at: Position, found: usize },
    #[error("{at}: dimension key must be a non-empty string")]
    BadKey { at: Position },
    #[error("{at}: metric {metric} is missing")]
    MissingMetric { at: Position, metric: String },
    #[error("{at}: amount {raw:?} is not a decimal number")]
    BadAmount { at: Position, raw: String },
    #[error("{at}: amount {value} is negative")]
    NegativeAmount { at: Position, value: f64 },
    #[error("{at}: running cost total is no longer finite")]
    Overflow { at: Position },
    #[error("{at}: unit {found} differs from {expected} seen earlier in the report")]
    MixedUnits { at: Position, expected: String, found: String },
}

impl From<serde_json::Error> for MalformedReportError {
    fn from(e: serde_json::Error) -> Self {
        MalformedReportError::Parse(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: DimensionKey,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeBucket {
    pub start: Option<String>,
    pub end: Option<String>,
    pub groups: Vec<Group>,
}

/// A usage report that passed validation. The only way to obtain one is
/// through `from_value`/`from_json_str` (or `from_buckets` for callers that
/// already hold typed groups), so aggregation never sees malformed data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawReport {
    buckets: Vec<TimeBucket>,
    unit: Option<String>,
}

impl RawReport {
    pub fn from_buckets(buckets: Vec<TimeBucket>) -> Result<Self, MalformedReportError> {
        let mut total = 0.0;
        for (b, bucket) in buckets.iter().enumerate() {
            for (g, group) in bucket.groups.iter().enumerate() {
                let at = Position { bucket: b, group: g };
                check_entry(&group.key, group.amount, &mut total, at)?;
            }
        }
        Ok(Self { buckets, unit: None })
    }

    pub fn from_json_str(s: &str, metric: &str) -> Result<Self, MalformedReportError> {
        let v: Value = serde_json::from_str(s)?;
        Self::from_value(&v, metric)
    }

    pub fn from_value(v: &Value, metric: &str) -> Result<Self, MalformedReportError> {
        let root = v.as_object().ok_or(MalformedReportError::NotObject)?;
        let mut unit: Option<String> = None;
        let mut total = 0.0;
        let mut buckets = Vec::new();
        for (b, raw_bucket) in array_or_empty(root.get("ResultsByTime"), "ResultsByTime")?.iter().enumerate() {
            let period = raw_bucket.get("TimePeriod");
            let start = period.and_then(|p| p.get("Start")).and_then(Value::as_str).map(str::to_string);
            let end = period.and_then(|p| p.get("End")).and_then(Value::as_str).map(str::to_string);
            let raw_groups = array_or_empty(raw_bucket.get("Groups"), "Groups")?;
            let mut groups = Vec::with_capacity(raw_groups.len());
            for (g, raw_group) in raw_groups.iter().enumerate() {
                let at = Position { bucket: b, group: g };
                let group = parse_group(raw_group, metric, at, &mut unit)?;
                add_to_total(&mut total, group.amount, at)?;
                groups.push(group);
            }
            buckets.push(TimeBucket { start, end, groups });
        }
        Ok(Self { buckets, unit })
    }

    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    /// Currency unit shared by every amount, when the export states one.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn group_count(&self) -> usize {
        self.buckets.iter().map(|b| b.groups.len()).sum()
    }
}

fn array_or_empty<'a>(v: Option<&'a Value>, field: &'static str) -> Result<&'a [Value], MalformedReportError> {
    match v {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(arr)) => Ok(arr.as_slice()),
        Some(_) => Err(MalformedReportError::NotArray { field }),
    }
}

fn parse_group(
    raw: &Value,
    metric: &str,
    at: Position,
    unit: &mut Option<String>,
) -> Result<Group, MalformedReportError> {
    let keys = match raw.get("Keys") {
        Some(Value::Array(keys)) => keys,
        _ => return Err(MalformedReportError::KeyArity { at, found: 0 }),
    };
    if keys.len() != 2 {
        return Err(MalformedReportError::KeyArity { at, found: keys.len() });
    }
    let service = non_empty_str(&keys[0]).ok_or(MalformedReportError::BadKey { at })?;
    let region = non_empty_str(&keys[1]).ok_or(MalformedReportError::BadKey { at })?;

    let m = raw
        .get("Metrics")
        .and_then(|ms| ms.get(metric))
        .ok_or_else(|| MalformedReportError::MissingMetric { at, metric: metric.to_string() })?;
    let amount = match m.get("Amount") {
        Some(Value::String(s)) => parse_amount(s, at)?,
        Some(other) => return Err(MalformedReportError::BadAmount { at, raw: other.to_string() }),
        None => return Err(MalformedReportError::MissingMetric { at, metric: metric.to_string() }),
    };

    if let Some(u) = m.get("Unit").and_then(Value::as_str) {
        match unit {
            Some(expected) if expected != u => {
                return Err(MalformedReportError::MixedUnits { at, expected: expected.clone(), found: u.to_string() });
            }
            Some(_) => {}
            None => *unit = Some(u.to_string()),
        }
    }

    Ok(Group { key: DimensionKey::new(service, region), amount })
}

fn non_empty_str(v: &Value) -> Option<&str> {
    v.as_str().filter(|s| !s.is_empty())
}

fn parse_amount(s: &str, at: Position) -> Result<f64, MalformedReportError> {
    let x = s
        .trim()
        .parse::<f64>()
        .map_err(|_| MalformedReportError::BadAmount { at, raw: s.to_string() })?;
    check_amount(x, at)
}

/// Key and amount checks shared by every typed constructor; `total` is the
/// running sum of everything accepted so far.
pub(crate) fn check_entry(
    key: &DimensionKey,
    amount: f64,
    total: &mut f64,
    at: Position,
) -> Result<(), MalformedReportError> {
    if key.service.is_empty() || key.region.is_empty() {
        return Err(MalformedReportError::BadKey { at });
    }
    check_amount(amount, at)?;
    add_to_total(total, amount, at)
}

// Amounts are non-negative, so a finite grand total bounds every per-key sum.
fn add_to_total(total: &mut f64, amount: f64, at: Position) -> Result<(), MalformedReportError> {
    *total += amount;
    if !total.is_finite() {
        return Err(MalformedReportError::Overflow { at });
    }
    Ok(())
}

fn check_amount(x: f64, at: Position) -> Result<f64, MalformedReportError> {
    if !x.is_finite() {
        return Err(MalformedReportError::BadAmount { at, raw: x.to_string() });
    }
    // -0.0 compares equal to zero and is kept.
    if x < 0.0 {
        return Err(MalformedReportError::NegativeAmount { at, value: x });
    }
    Ok(x)
}

use crate::report::{check_entry, DimensionKey, MalformedReportError, Position, RawReport};
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Summed spend per (service, region) for one window.
///
/// Built once by [`normalize`] and never mutated afterwards; iteration is
/// sorted by key, which keeps everything downstream deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostIndex {
    costs: BTreeMap<DimensionKey, f64>,
}

impl CostIndex {
    /// Build an index from already-aggregated entries, with the same key and
    /// amount checks a report goes through. Repeated keys accumulate.
    /// Errors report the entry's offset as its group position.
    pub fn from_entries<I>(entries: I) -> Result<Self, MalformedReportError>
    where
        I: IntoIterator<Item = (DimensionKey, f64)>,
    {
        let mut total = 0.0;
        let mut checked = Vec::new();
        for (i, (key, amount)) in entries.into_iter().enumerate() {
            check_entry(&key, amount, &mut total, Position { bucket: 0, group: i })?;
            checked.push((key, amount));
        }
        Ok(Self::accumulate(checked))
    }

    fn accumulate<I: IntoIterator<Item = (DimensionKey, f64)>>(entries: I) -> Self {
        let mut costs = BTreeMap::new();
        for (k, v) in entries {
            *costs.entry(k).or_insert(0.0) += v;
        }
        Self { costs }
    }

    pub fn get(&self, key: &DimensionKey) -> Option<f64> {
        self.costs.get(key).copied()
    }

    pub fn contains(&self, key: &DimensionKey) -> bool {
        self.costs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DimensionKey, f64)> + '_ {
        self.costs.iter().map(|(k, v)| (k, *v))
    }

    pub fn total(&self) -> f64 {
        self.costs.values().sum()
    }
}

#[derive(Serialize)]
struct EntryOut<'a> {
    service: &'a str,
    region: &'a str,
    cost: f64,
}

impl Serialize for CostIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.costs.len()))?;
        for (k, cost) in self.costs.iter() {
            seq.serialize_element(&EntryOut { service: &k.service, region: &k.region, cost: *cost })?;
        }
        seq.end()
    }
}

/// A validated report already has a finite grand total, so no per-key sum can overflow.
pub fn normalize(report: &RawReport) -> CostIndex {
    CostIndex::accumulate(
        report
            .buckets()
            .iter()
            .flat_map(|b| b.groups.iter())
            .map(|g| (g.key.clone(), g.amount)),
    )
}

/// Validate an untyped billing export and fold it into a [`CostIndex`].
/// Nothing is returned unless every group passes validation.
pub fn normalize_value(v: &Value, metric: &str) -> Result<CostIndex, MalformedReportError> {
    let report = RawReport::from_value(v, metric)?;
    Ok(normalize(&report))
}

use crate::config::{DateWindow, ScoutConfig};
use crate::detector::{detect_with, SuspectRecord};
use crate::normalize::{normalize, CostIndex};
use crate::report::RawReport;
use crate::source::CostSource;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub current_window: DateWindow,
    pub previous_window: DateWindow,
    pub current_total: f64,
    pub previous_total: f64,
    pub suspects: Vec<SuspectRecord>,
}

/// Fetch and normalize both windows, then compare them.
///
/// Thresholds and windows are validated before anything is fetched. The two
/// fetches run in parallel; detection starts only once both indices exist.
/// Any failure aborts the whole scan.
pub fn scan(source: &dyn CostSource, cfg: &ScoutConfig, today: NaiveDate) -> anyhow::Result<ScanOutcome> {
    let thresholds = cfg.thresholds()?;
    let (current_window, previous_window) = cfg.windows(today)?;
    let label = cfg.label(&current_window);

    let (current, previous) = rayon::join(
        || load_index(source, &current_window, &cfg.metric),
        || load_index(source, &previous_window, &cfg.metric),
    );
    let current = current.context("current window")?;
    let previous = previous.context("previous window")?;

    let suspects = detect_with(&current, &previous, &thresholds, &label)?;
    info!(
        window = %label,
        current_keys = current.len(),
        previous_keys = previous.len(),
        suspects = suspects.len(),
        "scan complete"
    );
    Ok(ScanOutcome {
        current_window,
        previous_window,
        current_total: current.total(),
        previous_total: previous.total(),
        suspects,
    })
}

fn load_index(source: &dyn CostSource, window: &DateWindow, metric: &str) -> anyhow::Result<CostIndex> {
    debug!(%window, "fetching report");
    let raw = source.fetch(window)?;
    let report = RawReport::from_value(&raw, metric).with_context(|| format!("report for {window}"))?;
    let index = normalize(&report);
    debug!(%window, buckets = report.buckets().len(), groups = report.group_count(), keys = index.len(), "normalized");
    Ok(index)
}

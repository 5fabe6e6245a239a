use crate::config::DateWindow;
use anyhow::{anyhow, Context};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Anything that can hand back a raw usage report for a date window.
/// Implementations own retries and timeouts; the caller does not.
pub trait CostSource: Sync {
    fn fetch(&self, window: &DateWindow) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    Monthly,
    Daily,
}

/// The usage query issued against the billing API: cost for a window,
/// grouped by SERVICE then REGION.
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    pub window: DateWindow,
    pub granularity: Granularity,
    pub metrics: Vec<String>,
}

impl CostQuery {
    pub fn new(window: DateWindow, metric: &str) -> Self {
        Self { window, granularity: Granularity::Monthly, metrics: vec![metric.to_string()] }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn to_request(&self) -> Value {
        json!({
            "TimePeriod": {
                "Start": self.window.start.format("%Y-%m-%d").to_string(),
                "End": self.window.end.format("%Y-%m-%d").to_string(),
            },
            "Granularity": self.granularity,
            "Metrics": self.metrics,
            "GroupBy": [
                {"Type": "DIMENSION", "Key": "SERVICE"},
                {"Type": "DIMENSION", "Key": "REGION"},
            ],
        })
    }
}

/// Reads exported JSON reports from disk.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// One file per window, matched by exact window.
    Pair { current: (DateWindow, PathBuf), previous: (DateWindow, PathBuf) },
    /// A directory of `<start>_<end>.json` files.
    Dir(PathBuf),
}

impl FileSource {
    pub fn pair(current: DateWindow, current_path: PathBuf, previous: DateWindow, previous_path: PathBuf) -> Self {
        FileSource::Pair { current: (current, current_path), previous: (previous, previous_path) }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        FileSource::Dir(path.into())
    }

    pub fn path_for(&self, window: &DateWindow) -> anyhow::Result<PathBuf> {
        match self {
            FileSource::Pair { current, previous } => {
                if current.0 == *window {
                    Ok(current.1.clone())
                } else if previous.0 == *window {
                    Ok(previous.1.clone())
                } else {
                    Err(anyhow!("no report file configured for window {window}"))
                }
            }
            FileSource::Dir(dir) => Ok(dir.join(format!("{}_{}.json", window.start, window.end))),
        }
    }
}

impl CostSource for FileSource {
    fn fetch(&self, window: &DateWindow) -> anyhow::Result<Value> {
        let path = self.path_for(window)?;
        read_json(&path)
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading report {}", path.display()))?;
    let v = serde_json::from_str(&text).with_context(|| format!("parsing report {}", path.display()))?;
    Ok(v)
}

/// In-memory reports keyed by window.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    reports: HashMap<DateWindow, Value>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(mut self, window: DateWindow, report: Value) -> Self {
        self.reports.insert(window, report);
        self
    }
}

impl CostSource for StaticSource {
    fn fetch(&self, window: &DateWindow) -> anyhow::Result<Value> {
        self.reports
            .get(window)
            .cloned()
            .ok_or_else(|| anyhow!("no report for window {window}"))
    }
}

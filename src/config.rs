use crate::detector::{InvalidConfigurationError, Thresholds};
use crate::report::DEFAULT_METRIC;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("window end {end} must be after start {start}")]
    Empty { start: NaiveDate, end: NaiveDate },
    #[error("window length must be at least one day, got {0}")]
    BadLength(i64),
    #[error("only one of current_window/previous_window is set")]
    Unpaired,
}

/// Calendar range `[start, end)`; the end date is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The `days` ending at `today` (exclusive) and the same-length window right before it.
pub fn trailing_windows(today: NaiveDate, days: i64) -> Result<(DateWindow, DateWindow), WindowError> {
    if days < 1 {
        return Err(WindowError::BadLength(days));
    }
    let span = Duration::days(days);
    let current = DateWindow::new(today - span, today)?;
    let previous = DateWindow::new(current.start - span, current.start)?;
    Ok((current, previous))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub pct_threshold: f64,
    pub abs_threshold: f64,
    pub metric: String,
    pub window_days: i64,
    pub window_label: Option<String>,
    pub current_window: Option<DateWindow>,
    pub previous_window: Option<DateWindow>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            pct_threshold: t.pct,
            abs_threshold: t.abs,
            metric: DEFAULT_METRIC.to_string(),
            window_days: 14,
            window_label: None,
            current_window: None,
            previous_window: None,
        }
    }
}

impl ScoutConfig {
    /// Optional config file first, then `COSTSCOUT__*` environment variables.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        builder = match file {
            Some(p) => builder.add_source(::config::File::from(p)),
            None => builder.add_source(::config::File::with_name("costscout").required(false)),
        };
        let cfg = builder
            .add_source(::config::Environment::with_prefix("COSTSCOUT").separator("__").try_parsing(true))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn thresholds(&self) -> Result<Thresholds, InvalidConfigurationError> {
        Thresholds::new(self.pct_threshold, self.abs_threshold)
    }

    /// Explicit windows win; otherwise trailing windows of `window_days` ending at `today`.
    pub fn windows(&self, today: NaiveDate) -> Result<(DateWindow, DateWindow), WindowError> {
        match (self.current_window, self.previous_window) {
            (Some(c), Some(p)) => Ok((DateWindow::new(c.start, c.end)?, DateWindow::new(p.start, p.end)?)),
            (None, None) => trailing_windows(today, self.window_days),
            _ => Err(WindowError::Unpaired),
        }
    }

    pub fn label(&self, current: &DateWindow) -> String {
        match (&self.window_label, self.current_window) {
            (Some(l), _) => l.clone(),
            (None, Some(_)) => current.to_string(),
            (None, None) => format!("last_{}_days", self.window_days),
        }
    }
}

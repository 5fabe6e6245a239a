//! Cost anomaly scouting: fold billing usage reports into per
//! (service, region) cost indices and flag spend that grew too fast or
//! simply got too large.

pub mod report;
pub mod normalize;
pub mod detector;
pub mod config;
pub mod source;
pub mod scan;

pub use detector::{detect, detect_with, InvalidConfigurationError, SuspectRecord, Thresholds, Trigger};
pub use normalize::{normalize, normalize_value, CostIndex};
pub use report::{DimensionKey, MalformedReportError, RawReport};

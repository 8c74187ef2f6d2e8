//! Duration buckets used for output grouping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tag derived from a video's duration, used for output folder naming
/// and as the catalog's `video_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DurationBucket {
    /// Up to one minute
    Xs,
    /// Up to five minutes
    S,
    /// Up to fifteen minutes
    M,
    /// Up to thirty minutes
    L,
    /// Longer than thirty minutes
    Xl,
}

impl DurationBucket {
    /// Classify a duration in seconds into its band.
    pub fn from_duration(seconds: f64) -> Self {
        if seconds <= 60.0 {
            DurationBucket::Xs
        } else if seconds <= 300.0 {
            DurationBucket::S
        } else if seconds <= 900.0 {
            DurationBucket::M
        } else if seconds <= 1800.0 {
            DurationBucket::L
        } else {
            DurationBucket::Xl
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DurationBucket::Xs => "XS",
            DurationBucket::S => "S",
            DurationBucket::M => "M",
            DurationBucket::L => "L",
            DurationBucket::Xl => "XL",
        }
    }
}

impl fmt::Display for DurationBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DurationBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XS" => Ok(DurationBucket::Xs),
            "S" => Ok(DurationBucket::S),
            "M" => Ok(DurationBucket::M),
            "L" => Ok(DurationBucket::L),
            "XL" => Ok(DurationBucket::Xl),
            other => Err(format!("unknown duration bucket: {other}")),
        }
    }
}

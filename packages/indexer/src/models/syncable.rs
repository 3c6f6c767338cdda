use chrono::{DateTime, Utc};
use std::fmt;

/// Indexing status of a single height
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeightStatus {
    Success,
    Error,
    /// The node pruned the block
    MissingBlock,
    /// No block was produced at this height
    NoBlock,
}

impl HeightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeightStatus::Success => "success",
            HeightStatus::Error => "error",
            HeightStatus::MissingBlock => "missing_block",
            HeightStatus::NoBlock => "no_block",
        }
    }
}

impl fmt::Display for HeightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Height {
    pub height: u64,
    pub status: HeightStatus,
    pub error: Option<String>,
}

impl Height {
    pub fn new(height: u64, status: HeightStatus) -> Self {
        Self {
            height,
            status,
            error: None,
        }
    }

    pub fn failed(height: u64, error: String) -> Self {
        Self {
            height,
            status: HeightStatus::Error,
            error: Some(error),
        }
    }
}

/// One orchestrator invocation
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub lag: Option<u64>,
}

/// Granularity of the time-bucketed statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeBucket {
    Hour,
    Day,
}

impl TimeBucket {
    /// Name understood by postgres `date_trunc`
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Hour => "hour",
            TimeBucket::Day => "day",
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling epoch summary, keyed by the chain's opaque epoch id.
///
/// The parser emits provisional bounds (the current height); the rollup
/// refresh recomputes the real bounds and counters from stored blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: String,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub end_height: u64,
    pub end_time: DateTime<Utc>,
    pub blocks_count: u64,
    pub validators_count: u64,
    pub average_efficiency: f64,
}

impl Epoch {
    pub fn provisional(id: &str, height: u64, time: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            start_height: height,
            start_time: time,
            end_height: height,
            end_time: time,
            blocks_count: 0,
            validators_count: 0,
            average_efficiency: 0.0,
        }
    }
}

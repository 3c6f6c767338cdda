use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
    /// Liquid balance, unknown for accounts derived from validator sets
    pub balance: Option<u128>,
    pub staking_balance: Option<u128>,
}

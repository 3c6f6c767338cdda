use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Action;

/// Block row, keyed by height and immutable once written
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub prev_hash: String,
    pub producer: String,
    pub epoch: String,
    pub time: DateTime<Utc>,
    pub gas_price: u128,
    pub total_supply: u128,
    pub chunks_count: u32,
    pub transactions_count: u32,
    pub approvals_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block_hash: String,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub sender: String,
    pub receiver: String,
    /// Sum of attached deposits
    pub amount: u128,
    pub gas_burnt: u64,
    pub fee: u128,
    pub public_key: String,
    pub signature: String,
    pub success: bool,
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn actions_count(&self) -> u32 {
        self.actions.len() as u32
    }
}

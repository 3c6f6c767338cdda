use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commission a validator charges its delegators, as a fraction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFee {
    pub numerator: u32,
    pub denominator: u32,
}

impl RewardFee {
    /// `stake * numerator / denominator`, zero for a degenerate fraction
    pub fn apply(&self, stake: u128) -> u128 {
        if self.denominator == 0 {
            return 0;
        }
        let numerator = self.numerator as u128;
        let denominator = self.denominator as u128;
        match stake.checked_mul(numerator) {
            Some(product) => product / denominator,
            None => stake / denominator * numerator,
        }
    }
}

/// Validator snapshot at one height, keyed by (height, account)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub height: u64,
    pub time: DateTime<Utc>,
    pub account_id: String,
    pub epoch: String,
    pub expected_blocks: u64,
    pub produced_blocks: u64,
    pub expected_chunks: u64,
    pub produced_chunks: u64,
    pub slashed: bool,
    pub stake: u128,
    pub efficiency: f64,
    pub reward_fee: Option<RewardFee>,
    pub reward: u128,
}

/// Current state of a validator, keyed by account. Only ever moves forward
/// in height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorAggregate {
    pub account_id: String,
    pub start_height: u64,
    pub start_time: DateTime<Utc>,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
    pub expected_blocks: u64,
    pub produced_blocks: u64,
    pub expected_chunks: u64,
    pub produced_chunks: u64,
    pub slashed: bool,
    pub stake: u128,
    pub efficiency: f64,
    pub reward_fee: Option<RewardFee>,
}

/// Per-epoch performance of a validator, keyed by (account, epoch)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorEpoch {
    pub account_id: String,
    pub epoch: String,
    pub last_height: u64,
    pub last_time: DateTime<Utc>,
    pub expected_blocks: u64,
    pub produced_blocks: u64,
    pub expected_chunks: u64,
    pub produced_chunks: u64,
    pub efficiency: f64,
    pub staking_balance: u128,
    pub reward_fee: Option<RewardFee>,
    pub reward: u128,
}

//! Wire types returned by the node. Only the fields the indexer consumes are
//! declared; everything else in the responses is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::amount;

/// Merkle root of an empty transaction list (base58 of 32 zero bytes)
pub const EMPTY_ROOT: &str = "11111111111111111111111111111111";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub author: String,
    pub header: BlockHeader,
    #[serde(default)]
    pub chunks: Vec<ChunkHeader>,
}

impl Block {
    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn epoch(&self) -> &str {
        &self.header.epoch_id
    }

    /// Block timestamp; `None` when the nanosecond value is out of range
    pub fn time(&self) -> Option<DateTime<Utc>> {
        let nanos = self.header.timestamp;
        DateTime::<Utc>::from_timestamp(
            (nanos / 1_000_000_000) as i64,
            (nanos % 1_000_000_000) as u32,
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub epoch_id: String,
    pub hash: String,
    pub prev_hash: String,
    /// Nanoseconds since the unix epoch
    pub timestamp: u64,
    #[serde(with = "amount")]
    pub total_supply: u128,
    #[serde(with = "amount")]
    pub gas_price: u128,
    #[serde(default)]
    pub approvals: Vec<Option<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkHeader {
    pub chunk_hash: String,
    pub shard_id: u64,
    pub tx_root: String,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub gas_limit: u64,
}

impl ChunkHeader {
    pub fn has_transactions(&self) -> bool {
        !self.tx_root.is_empty() && self.tx_root != EMPTY_ROOT
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkDetails {
    pub author: String,
    pub header: ChunkHeader,
    #[serde(default)]
    pub transactions: Vec<SignedTransaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hash: String,
    pub signer_id: String,
    pub receiver_id: String,
    pub public_key: String,
    pub signature: String,
    pub nonce: u64,
    /// Raw actions; decoded into `models::Action` by the parser
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ExecutionStatus {
    NotStarted,
    Started,
    Failure(serde_json::Value),
    SuccessValue(String),
    SuccessReceiptId(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub status: ExecutionStatus,
    pub transaction: SignedTransaction,
    pub transaction_outcome: OutcomeWithId,
    #[serde(default)]
    pub receipts_outcome: Vec<OutcomeWithId>,
}

impl TransactionDetails {
    /// Only a final `Failure` status counts as failed
    pub fn success(&self) -> bool {
        !matches!(self.status, ExecutionStatus::Failure(_))
    }

    /// Tokens burnt by the transaction and every receipt it produced
    pub fn fee(&self) -> u128 {
        self.receipts_outcome
            .iter()
            .fold(self.transaction_outcome.outcome.tokens_burnt, |acc, o| {
                acc.saturating_add(o.outcome.tokens_burnt)
            })
    }

    pub fn gas_burnt(&self) -> u64 {
        self.receipts_outcome
            .iter()
            .fold(self.transaction_outcome.outcome.gas_burnt, |acc, o| {
                acc.saturating_add(o.outcome.gas_burnt)
            })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeWithId {
    pub id: String,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub gas_burnt: u64,
    #[serde(with = "amount")]
    pub tokens_burnt: u128,
    #[serde(default)]
    pub receipt_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub current_validators: Vec<Validator>,
    #[serde(default)]
    pub prev_epoch_kickout: Vec<Kickout>,
    pub epoch_start_height: u64,
    #[serde(default)]
    pub epoch_height: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Validator {
    pub account_id: String,
    pub public_key: String,
    #[serde(default)]
    pub is_slashed: bool,
    #[serde(with = "amount")]
    pub stake: u128,
    #[serde(default)]
    pub shards: Vec<u64>,
    pub num_produced_blocks: u64,
    pub num_expected_blocks: u64,
    #[serde(default)]
    pub num_produced_chunks: u64,
    #[serde(default)]
    pub num_expected_chunks: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Kickout {
    pub account_id: String,
    pub reason: KickoutReason,
}

/// Unit reasons arrive as bare strings, the others as single-key objects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KickoutReason {
    Slashed,
    Unstaked,
    DidNotGetASeat,
    NotEnoughBlocks {
        produced: u64,
        expected: u64,
    },
    NotEnoughChunks {
        produced: u64,
        expected: u64,
    },
    NotEnoughStake {
        #[serde(rename = "stake_u128", with = "amount")]
        stake: u128,
        #[serde(rename = "threshold_u128", with = "amount")]
        threshold: u128,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: String,
    pub genesis_height: u64,
    #[serde(default)]
    pub epoch_length: u64,
    #[serde(default)]
    pub protocol_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_kickout_reasons() {
        let kickouts: Vec<Kickout> = serde_json::from_value(json!([
            {"account_id": "a.near", "reason": "Unstaked"},
            {"account_id": "b.near", "reason": {"NotEnoughBlocks": {"produced": 3, "expected": 10}}},
            {"account_id": "c.near", "reason": {"NotEnoughStake": {
                "stake_u128": "100", "threshold_u128": "2000000000000000000000000000"
            }}},
            {"account_id": "d.near", "reason": "DidNotGetASeat"},
        ]))
        .unwrap();

        assert_eq!(kickouts[0].reason, KickoutReason::Unstaked);
        assert_eq!(
            kickouts[1].reason,
            KickoutReason::NotEnoughBlocks { produced: 3, expected: 10 }
        );
        assert_eq!(
            kickouts[2].reason,
            KickoutReason::NotEnoughStake {
                stake: 100,
                threshold: 2_000_000_000_000_000_000_000_000_000
            }
        );
        assert_eq!(kickouts[3].reason, KickoutReason::DidNotGetASeat);
    }

    #[test]
    fn computes_fee_and_status() {
        let details: TransactionDetails = serde_json::from_value(json!({
            "status": {"SuccessValue": ""},
            "transaction": {
                "hash": "tx1", "signer_id": "alice.near", "receiver_id": "bob.near",
                "public_key": "ed25519:key", "signature": "ed25519:sig", "nonce": 7,
                "actions": [{"Transfer": {"deposit": "10"}}]
            },
            "transaction_outcome": {"id": "tx1", "outcome": {"gas_burnt": 100, "tokens_burnt": "5"}},
            "receipts_outcome": [
                {"id": "r1", "outcome": {"gas_burnt": 50, "tokens_burnt": "3"}}
            ]
        }))
        .unwrap();

        assert!(details.success());
        assert_eq!(details.fee(), 8);
        assert_eq!(details.gas_burnt(), 150);

        let failed: ExecutionStatus =
            serde_json::from_value(json!({"Failure": {"ActionError": {}}})).unwrap();
        assert!(matches!(failed, ExecutionStatus::Failure(_)));
    }

    #[test]
    fn only_failure_status_is_unsuccessful() {
        let mut details: TransactionDetails = serde_json::from_value(json!({
            "status": "NotStarted",
            "transaction": {
                "hash": "tx1", "signer_id": "alice.near", "receiver_id": "bob.near",
                "public_key": "ed25519:key", "signature": "ed25519:sig", "nonce": 7
            },
            "transaction_outcome": {"id": "tx1", "outcome": {"gas_burnt": 1, "tokens_burnt": "1"}}
        }))
        .unwrap();
        assert!(details.success());

        details.status = ExecutionStatus::Started;
        assert!(details.success());

        details.status = serde_json::from_value(json!({"Failure": {"ActionError": {}}})).unwrap();
        assert!(!details.success());
    }

    #[test]
    fn empty_chunks_have_no_transactions() {
        let chunk = ChunkHeader {
            chunk_hash: "c".into(),
            shard_id: 0,
            tx_root: EMPTY_ROOT.into(),
            gas_used: 0,
            gas_limit: 0,
        };
        assert!(!chunk.has_transactions());
        assert!(ChunkHeader { tx_root: "5Xz".into(), ..chunk }.has_transactions());
    }
}

//! In-memory chain and store used by the pipeline tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::db::Store;
use crate::models::{
    Account, Block, Epoch, Event, Height, HeightStatus, RewardFee, Run, TimeBucket, Transaction,
    Validator, ValidatorAggregate, ValidatorEpoch,
};
use crate::rpc::types::{
    BlockHeader, ExecutionStatus, Outcome, OutcomeWithId, SignedTransaction, EMPTY_ROOT,
};
use crate::rpc::{
    self, ChainClient, ChunkDetails, ChunkHeader, GenesisConfig, Kickout, RpcError,
    TransactionDetails, ValidatorSet,
};
use crate::sync::SyncConfig;

const BASE_TIMESTAMP: u64 = 1_700_000_000;

pub fn block(height: u64, epoch: &str) -> rpc::Block {
    rpc::Block {
        author: "producer.near".to_string(),
        header: BlockHeader {
            height,
            epoch_id: epoch.to_string(),
            hash: format!("hash-{}", height),
            prev_hash: format!("hash-{}", height.saturating_sub(1)),
            timestamp: (BASE_TIMESTAMP + height) * 1_000_000_000,
            total_supply: 1_000_000,
            gas_price: 100_000_000,
            approvals: vec![Some("sig".to_string()), None],
        },
        chunks: vec![ChunkHeader {
            chunk_hash: format!("chunk-{}", height),
            shard_id: 0,
            tx_root: EMPTY_ROOT.to_string(),
            gas_used: 0,
            gas_limit: 1_000_000,
        }],
    }
}

pub fn block_time(height: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp((BASE_TIMESTAMP + height) as i64, 0).unwrap()
}

pub fn validator(account_id: &str, stake: u128) -> rpc::Validator {
    rpc::Validator {
        account_id: account_id.to_string(),
        public_key: format!("ed25519:{}", account_id),
        is_slashed: false,
        stake,
        shards: vec![0],
        num_produced_blocks: 9,
        num_expected_blocks: 10,
        num_produced_chunks: 18,
        num_expected_chunks: 20,
    }
}

/// Block row as the store would hold it
pub fn stored_block(height: u64, epoch: &str) -> Block {
    Block {
        height,
        hash: format!("hash-{}", height),
        prev_hash: format!("hash-{}", height.saturating_sub(1)),
        producer: "producer.near".to_string(),
        epoch: epoch.to_string(),
        time: block_time(height),
        gas_price: 100_000_000,
        total_supply: 1_000_000,
        chunks_count: 1,
        transactions_count: 0,
        approvals_count: 1,
    }
}

pub fn kickout(account_id: &str, reason: rpc::KickoutReason) -> Kickout {
    Kickout {
        account_id: account_id.to_string(),
        reason,
    }
}

pub fn sync_config(batch_size: u64) -> SyncConfig {
    SyncConfig {
        batch_size,
        start_height: None,
    }
}

/// Successful transfer of 250 burning 10 + 5 tokens
pub fn transaction(hash: &str) -> TransactionDetails {
    TransactionDetails {
        status: ExecutionStatus::SuccessValue(String::new()),
        transaction: signed_transaction(hash),
        transaction_outcome: outcome(hash, 10),
        receipts_outcome: vec![outcome("receipt", 5)],
    }
}

fn signed_transaction(hash: &str) -> SignedTransaction {
    SignedTransaction {
        hash: hash.to_string(),
        signer_id: "alice.near".to_string(),
        receiver_id: "bob.near".to_string(),
        public_key: "ed25519:alice".to_string(),
        signature: "ed25519:sig".to_string(),
        nonce: 1,
        actions: vec![serde_json::json!({"Transfer": {"deposit": "250"}})],
    }
}

fn outcome(id: &str, tokens_burnt: u128) -> OutcomeWithId {
    OutcomeWithId {
        id: id.to_string(),
        outcome: Outcome {
            gas_burnt: 2_000,
            tokens_burnt,
            receipt_ids: Vec::new(),
        },
    }
}

/// Scripted chain. Every height without a block reports `Missing` unless it
/// was marked broken.
#[derive(Default)]
pub struct MockChain {
    tip: u64,
    genesis_height: u64,
    blocks: BTreeMap<u64, rpc::Block>,
    broken: HashSet<u64>,
    chunks: HashMap<String, ChunkDetails>,
    transactions: HashMap<String, TransactionDetails>,
    failing_transactions: HashSet<String>,
    validator_sets: HashMap<String, ValidatorSet>,
    pub validator_calls: Mutex<Vec<u64>>,
    pub genesis_calls: Mutex<usize>,
}

impl MockChain {
    pub fn new(genesis_height: u64) -> Self {
        Self {
            genesis_height,
            ..Default::default()
        }
    }

    /// Add blocks for `heights`, all in `epoch`; the tip follows the highest block
    pub fn with_blocks(mut self, heights: std::ops::Range<u64>, epoch: &str) -> Self {
        for height in heights {
            self.blocks.insert(height, block(height, epoch));
            self.tip = self.tip.max(height);
        }
        self
    }

    pub fn with_validators(mut self, epoch: &str, validators: Vec<rpc::Validator>) -> Self {
        self.validator_sets.insert(
            epoch.to_string(),
            ValidatorSet {
                current_validators: validators,
                prev_epoch_kickout: Vec::new(),
                epoch_start_height: 0,
                epoch_height: 0,
            },
        );
        self
    }

    pub fn with_kickouts(mut self, epoch: &str, kickouts: Vec<Kickout>) -> Self {
        if let Some(set) = self.validator_sets.get_mut(epoch) {
            set.prev_epoch_kickout = kickouts;
        }
        self
    }

    pub fn with_tip(mut self, height: u64) -> Self {
        self.tip = height;
        self
    }

    /// Remove the block at `height`; the node reports it as pruned
    pub fn without_block(mut self, height: u64) -> Self {
        self.blocks.remove(&height);
        self
    }

    /// Block lookups at `height` fail with a server error
    pub fn with_broken_height(mut self, height: u64) -> Self {
        self.broken.insert(height);
        self
    }

    /// Attach a transfer transaction to the block at `height`
    pub fn with_transaction(mut self, height: u64, hash: &str) -> Self {
        let chunk_hash = format!("chunk-{}", height);
        if let Some(block) = self.blocks.get_mut(&height) {
            block.chunks[0].tx_root = format!("root-{}", height);
        }

        let header = self.blocks[&height].chunks[0].clone();
        let chunk = self
            .chunks
            .entry(chunk_hash)
            .or_insert_with(|| ChunkDetails {
                author: "producer.near".to_string(),
                header,
                transactions: Vec::new(),
            });
        chunk.transactions.push(signed_transaction(hash));

        self.transactions.insert(hash.to_string(), transaction(hash));
        self
    }

    pub fn with_failing_transaction(mut self, hash: &str) -> Self {
        self.failing_transactions.insert(hash.to_string());
        self
    }

    pub fn validator_calls(&self) -> Vec<u64> {
        let mut calls = self.validator_calls.lock().unwrap().clone();
        calls.sort_unstable();
        calls
    }

    fn find_block(&self, height: u64) -> Result<rpc::Block, RpcError> {
        if self.broken.contains(&height) {
            return Err(RpcError::Status {
                method: "block".to_string(),
                status: 500,
            });
        }
        self.blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| RpcError::Missing(format!("block {} was garbage collected", height)))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_tip(&self) -> Result<rpc::Block, RpcError> {
        self.blocks
            .range(..=self.tip)
            .next_back()
            .map(|(_, block)| {
                let mut tip = block.clone();
                tip.header.height = self.tip;
                tip
            })
            .ok_or_else(|| RpcError::NotFound("no blocks".to_string()))
    }

    async fn block_by_height(&self, height: u64) -> Result<rpc::Block, RpcError> {
        self.find_block(height)
    }

    async fn chunk(&self, hash: &str) -> Result<ChunkDetails, RpcError> {
        self.chunks
            .get(hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("chunk {}", hash)))
    }

    async fn transaction(
        &self,
        hash: &str,
        _sender: &str,
    ) -> Result<TransactionDetails, RpcError> {
        if self.failing_transactions.contains(hash) {
            return Err(RpcError::Status {
                method: "tx".to_string(),
                status: 503,
            });
        }
        self.transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("transaction {}", hash)))
    }

    async fn validators_by_height(&self, height: u64) -> Result<ValidatorSet, RpcError> {
        self.validator_calls.lock().unwrap().push(height);
        let block = self.find_block(height)?;
        Ok(self
            .validator_sets
            .get(block.epoch())
            .cloned()
            .unwrap_or(ValidatorSet {
                current_validators: Vec::new(),
                prev_epoch_kickout: Vec::new(),
                epoch_start_height: 0,
                epoch_height: 0,
            }))
    }

    async fn genesis_config(&self) -> Result<GenesisConfig, RpcError> {
        *self.genesis_calls.lock().unwrap() += 1;
        Ok(GenesisConfig {
            chain_id: "testnet".to_string(),
            genesis_height: self.genesis_height,
            epoch_length: 43_200,
            protocol_version: 1,
        })
    }
}

#[derive(Default)]
pub struct MemoryState {
    pub blocks: BTreeMap<u64, Block>,
    pub epochs: HashMap<String, Epoch>,
    pub transactions: HashMap<String, Transaction>,
    pub validators: BTreeMap<(u64, String), Validator>,
    pub aggregates: HashMap<String, ValidatorAggregate>,
    pub validator_epochs: HashMap<(String, String), ValidatorEpoch>,
    pub accounts: HashMap<String, Account>,
    pub events: Vec<Event>,
    pub fees: HashMap<String, RewardFee>,
    pub stats_refreshes: Vec<TimeBucket>,
    pub rollups: Vec<Vec<String>>,
    pub runs: Vec<Run>,
    pub heights: BTreeMap<u64, Height>,
}

impl MemoryState {
    /// Events with the same natural key are stored once
    fn insert_event(&mut self, event: &Event) {
        let duplicate = self.events.iter().any(|e| {
            (e.scope, e.action, &e.item_type, &e.item_id, e.height, &e.metadata)
                == (
                    event.scope,
                    event.action,
                    &event.item_type,
                    &event.item_id,
                    event.height,
                    &event.metadata,
                )
        });
        if !duplicate {
            self.events.push(event.clone());
        }
    }
}

/// In-memory `Store` applying the same conflict rules as the SQL statements
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    fn check(&self, operation: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(anyhow!("{} failed", operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn last_block(&self) -> Result<Option<Block>> {
        self.check("last_block")?;
        Ok(self.state().blocks.values().next_back().cloned())
    }

    async fn last_block_in_epoch(&self, epoch: &str) -> Result<Option<Block>> {
        self.check("last_block_in_epoch")?;
        Ok(self
            .state()
            .blocks
            .values()
            .rev()
            .find(|b| b.epoch == epoch)
            .cloned())
    }

    async fn last_block_below(&self, height: u64) -> Result<Option<Block>> {
        Ok(self
            .state()
            .blocks
            .range(..height)
            .next_back()
            .map(|(_, block)| block.clone()))
    }

    async fn lowest_failed_height(&self) -> Result<Option<u64>> {
        Ok(self
            .state()
            .heights
            .values()
            .find(|h| h.status == HeightStatus::Error)
            .map(|h| h.height))
    }

    async fn last_indexed_height(&self) -> Result<Option<u64>> {
        Ok(self
            .state()
            .heights
            .values()
            .rev()
            .find(|h| h.status != HeightStatus::Error)
            .map(|h| h.height))
    }

    async fn reward_fees(&self) -> Result<HashMap<String, RewardFee>> {
        Ok(self.state().fees.clone())
    }

    async fn import_blocks(&self, blocks: &[Block]) -> Result<()> {
        self.check("import_blocks")?;
        let mut state = self.state();
        for block in blocks {
            state.blocks.entry(block.height).or_insert_with(|| block.clone());
        }
        Ok(())
    }

    async fn import_epochs(&self, epochs: &[Epoch]) -> Result<()> {
        self.check("import_epochs")?;
        let mut state = self.state();
        for epoch in epochs {
            let stored = state
                .epochs
                .entry(epoch.id.clone())
                .or_insert_with(|| epoch.clone());
            stored.start_height = stored.start_height.min(epoch.start_height);
            stored.start_time = stored.start_time.min(epoch.start_time);
            stored.end_height = stored.end_height.max(epoch.end_height);
            stored.end_time = stored.end_time.max(epoch.end_time);
        }
        Ok(())
    }

    async fn import_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        self.check("import_transactions")?;
        let mut state = self.state();
        for tx in transactions {
            state
                .transactions
                .entry(tx.hash.clone())
                .or_insert_with(|| tx.clone());
        }
        Ok(())
    }

    async fn import_validator_aggregates(&self, aggregates: &[ValidatorAggregate]) -> Result<()> {
        self.check("import_validator_aggregates")?;
        let mut state = self.state();
        for aggregate in aggregates {
            match state.aggregates.get_mut(&aggregate.account_id) {
                Some(stored) if stored.last_height < aggregate.last_height => {
                    let start = (stored.start_height, stored.start_time);
                    let fee = stored.reward_fee;
                    *stored = aggregate.clone();
                    (stored.start_height, stored.start_time) = start;
                    stored.reward_fee = aggregate.reward_fee.or(fee);
                }
                Some(_) => {}
                None => {
                    state
                        .aggregates
                        .insert(aggregate.account_id.clone(), aggregate.clone());
                }
            }
        }
        Ok(())
    }

    async fn import_validators(&self, validators: &[Validator]) -> Result<()> {
        self.check("import_validators")?;
        let mut state = self.state();
        for validator in validators {
            state
                .validators
                .entry((validator.height, validator.account_id.clone()))
                .or_insert_with(|| validator.clone());
        }
        Ok(())
    }

    async fn import_validator_epochs(&self, validator_epochs: &[ValidatorEpoch]) -> Result<()> {
        self.check("import_validator_epochs")?;
        let mut state = self.state();
        for row in validator_epochs {
            let key = (row.account_id.clone(), row.epoch.clone());
            match state.validator_epochs.get(&key) {
                Some(stored) if stored.last_height > row.last_height => {}
                _ => {
                    state.validator_epochs.insert(key, row.clone());
                }
            }
        }
        Ok(())
    }

    async fn import_accounts(&self, accounts: &[Account]) -> Result<()> {
        self.check("import_accounts")?;
        let mut state = self.state();
        for account in accounts {
            match state.accounts.get_mut(&account.name) {
                Some(stored) if stored.last_height <= account.last_height => {
                    stored.last_height = account.last_height;
                    stored.last_time = account.last_time;
                    stored.balance = account.balance.or(stored.balance);
                    stored.staking_balance = account.staking_balance.or(stored.staking_balance);
                }
                Some(_) => {}
                None => {
                    state.accounts.insert(account.name.clone(), account.clone());
                }
            }
        }
        Ok(())
    }

    async fn create_event(&self, event: &Event) -> Result<()> {
        self.check("create_event")?;
        self.state().insert_event(event);
        Ok(())
    }

    async fn import_events(&self, events: &[Event]) -> Result<()> {
        self.check("import_events")?;
        let mut state = self.state();
        for event in events {
            state.insert_event(event);
        }
        Ok(())
    }

    async fn refresh_block_stats(
        &self,
        bucket: TimeBucket,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<()> {
        self.check("refresh_block_stats")?;
        self.state().stats_refreshes.push(bucket);
        Ok(())
    }

    async fn refresh_epoch_rollups(&self, epochs: &[String]) -> Result<()> {
        self.check("refresh_epoch_rollups")?;
        let mut state = self.state();
        for id in epochs {
            let blocks: Vec<(u64, DateTime<Utc>)> = state
                .blocks
                .values()
                .filter(|b| &b.epoch == id)
                .map(|b| (b.height, b.time))
                .collect();
            if let (Some(first), Some(last), Some(epoch)) =
                (blocks.first(), blocks.last(), state.epochs.get_mut(id))
            {
                epoch.start_height = first.0;
                epoch.start_time = first.1;
                epoch.end_height = last.0;
                epoch.end_time = last.1;
                epoch.blocks_count = blocks.len() as u64;
            }
        }
        state.rollups.push(epochs.to_vec());
        Ok(())
    }

    async fn create_run(&self) -> Result<Run> {
        self.check("create_run")?;
        let mut state = self.state();
        let run = Run {
            id: state.runs.len() as i64 + 1,
            started_at: Utc::now(),
            finished_at: None,
            success: None,
            error: None,
            lag: None,
        };
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run: &Run) -> Result<()> {
        self.check("finish_run")?;
        let mut state = self.state();
        match state.runs.iter_mut().find(|r| r.id == run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(anyhow!("run {} not found", run.id)),
        }
    }

    async fn record_heights(&self, heights: &[Height]) -> Result<()> {
        self.check("record_heights")?;
        let mut state = self.state();
        for height in heights {
            state.heights.insert(height.height, height.clone());
        }
        Ok(())
    }
}

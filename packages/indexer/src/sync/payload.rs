use chrono::{DateTime, Utc};
use std::ops::Range;

use crate::models::{
    Account, Block, Epoch, Event, HeightStatus, Transaction, Validator, ValidatorAggregate,
    ValidatorEpoch,
};
use crate::rpc;

/// State of one sync run, owned by the orchestrator and passed from task to task
#[derive(Debug)]
pub struct Payload {
    /// Chain tip observed when the run started
    pub tip: rpc::Block,
    /// Requested heights, end exclusive
    pub range: Range<u64>,
    /// Bounds of the fetched heights (the requested range when nothing survived)
    pub start_height: u64,
    pub end_height: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Fetched heights in strictly ascending order
    pub heights: Vec<HeightRecord>,
    /// Heights without a block, with the reason
    pub skipped: Vec<(u64, HeightStatus)>,
}

impl Payload {
    pub fn new(tip: rpc::Block, range: Range<u64>) -> Self {
        Self {
            tip,
            start_height: range.start,
            end_height: range.end.saturating_sub(1).max(range.start),
            range,
            start_time: None,
            end_time: None,
            heights: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Derive the batch bounds from the first and last fetched heights
    pub fn update_bounds(&mut self) {
        if let (Some(first), Some(last)) = (self.heights.first(), self.heights.last()) {
            self.start_height = first.height;
            self.start_time = first.block.time();
            self.end_height = last.height;
            self.end_time = last.block.time();
        }
    }

    /// Distance between the chain tip and the last height this run processed
    pub fn lag(&self) -> u64 {
        let processed = if self.range.is_empty() {
            self.range.start.saturating_sub(1)
        } else {
            self.end_height
        };
        self.tip.height().saturating_sub(processed)
    }
}

/// Block seen as the last one of an epoch
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRef {
    pub height: u64,
    pub epoch: String,
    pub time: DateTime<Utc>,
}

impl BlockRef {
    pub fn from_rpc(block: &rpc::Block) -> Option<Self> {
        Some(Self {
            height: block.height(),
            epoch: block.epoch().to_string(),
            time: block.time()?,
        })
    }
}

impl From<&Block> for BlockRef {
    fn from(block: &Block) -> Self {
        Self {
            height: block.height,
            epoch: block.epoch.clone(),
            time: block.time,
        }
    }
}

/// Raw chain data of one height
#[derive(Debug)]
pub struct HeightRecord {
    pub height: u64,
    pub block: rpc::Block,
    pub chunks: Vec<rpc::ChunkDetails>,
    pub transactions: Vec<rpc::TransactionDetails>,
    /// Validator set at this height; only fetched at epoch boundaries and for
    /// the trailing height of the open epoch
    pub validators: Vec<rpc::Validator>,
    /// Last block of the previous epoch, set when this height opens an epoch
    pub previous_block: Option<BlockRef>,
    pub previous_validators: Vec<rpc::Validator>,
    pub previous_epoch_kickout: Vec<rpc::Kickout>,
    /// Validator set belongs to the still open epoch; do not diff it yet
    pub current_epoch: bool,
    pub parsed: Option<ParsedRecord>,
}

impl HeightRecord {
    pub fn new(block: rpc::Block) -> Self {
        Self {
            height: block.height(),
            block,
            chunks: Vec::new(),
            transactions: Vec::new(),
            validators: Vec::new(),
            previous_block: None,
            previous_validators: Vec::new(),
            previous_epoch_kickout: Vec::new(),
            current_epoch: false,
            parsed: None,
        }
    }

    pub fn epoch(&self) -> &str {
        self.block.epoch()
    }
}

/// Domain rows derived from one height
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub block: Block,
    pub epoch: Epoch,
    pub transactions: Vec<Transaction>,
    pub validators: Vec<Validator>,
    pub validator_aggregates: Vec<ValidatorAggregate>,
    pub validator_epochs: Vec<ValidatorEpoch>,
    pub accounts: Vec<Account>,
    pub events: Vec<Event>,
}

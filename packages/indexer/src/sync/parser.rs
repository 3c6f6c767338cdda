use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use super::payload::{BlockRef, HeightRecord, ParsedRecord, Payload};
use super::SyncError;
use crate::models::{
    Account, Action, Block, Epoch, Event, EventAction, RewardFee, Transaction, Validator,
    ValidatorAggregate, ValidatorEpoch,
};
use crate::rpc::{self, KickoutReason};

/// Maps raw height records into domain rows. Performs no I/O.
pub struct Parser {
    fees: HashMap<String, RewardFee>,
}

impl Parser {
    pub fn new(fees: HashMap<String, RewardFee>) -> Self {
        Self { fees }
    }

    pub fn parse(&self, payload: &mut Payload) -> Result<(), SyncError> {
        for record in payload.heights.iter_mut() {
            let parsed = self
                .parse_record(record)
                .map_err(|e| SyncError::at_height(record.height, e))?;
            record.parsed = Some(parsed);
        }

        debug!("Parsed {} heights", payload.heights.len());
        Ok(())
    }

    fn parse_record(&self, record: &HeightRecord) -> Result<ParsedRecord, SyncError> {
        let block = parse_block(record)?;
        let epoch = Epoch::provisional(&block.epoch, block.height, block.time);

        let transactions = record
            .transactions
            .iter()
            .map(|details| parse_transaction(details, &block))
            .collect::<Result<Vec<_>, _>>()?;

        let mut parsed = ParsedRecord {
            block,
            epoch,
            transactions,
            validators: Vec::with_capacity(record.validators.len()),
            validator_aggregates: Vec::with_capacity(record.validators.len()),
            validator_epochs: Vec::with_capacity(record.validators.len()),
            accounts: Vec::with_capacity(record.validators.len()),
            events: Vec::new(),
        };

        for validator in &record.validators {
            self.parse_validator(validator, &mut parsed)?;
        }

        if let Some(previous) = &record.previous_block {
            for validator in &record.previous_validators {
                check_account(&validator.account_id)?;
                parsed
                    .validator_epochs
                    .push(self.validator_epoch(validator, previous));
            }

            for kickout in &record.previous_epoch_kickout {
                check_account(&kickout.account_id)?;
                parsed.events.push(Event::validator(
                    EventAction::LeftActiveSet,
                    &kickout.account_id,
                    parsed.block.height,
                    parsed.block.time,
                    &parsed.block.epoch,
                    kickout_metadata(&kickout.reason),
                ));
            }
        }

        Ok(parsed)
    }

    fn parse_validator(
        &self,
        validator: &rpc::Validator,
        parsed: &mut ParsedRecord,
    ) -> Result<(), SyncError> {
        check_account(&validator.account_id)?;

        let block = &parsed.block;
        let reward_fee = self.fees.get(&validator.account_id).copied();
        let reward = reward_fee.map_or(0, |fee| fee.apply(validator.stake));
        let efficiency = efficiency(validator);

        parsed.validators.push(Validator {
            height: block.height,
            time: block.time,
            account_id: validator.account_id.clone(),
            epoch: block.epoch.clone(),
            expected_blocks: validator.num_expected_blocks,
            produced_blocks: validator.num_produced_blocks,
            expected_chunks: validator.num_expected_chunks,
            produced_chunks: validator.num_produced_chunks,
            slashed: validator.is_slashed,
            stake: validator.stake,
            efficiency,
            reward_fee,
            reward,
        });

        parsed.validator_aggregates.push(ValidatorAggregate {
            account_id: validator.account_id.clone(),
            start_height: block.height,
            start_time: block.time,
            last_height: block.height,
            last_time: block.time,
            expected_blocks: validator.num_expected_blocks,
            produced_blocks: validator.num_produced_blocks,
            expected_chunks: validator.num_expected_chunks,
            produced_chunks: validator.num_produced_chunks,
            slashed: validator.is_slashed,
            stake: validator.stake,
            efficiency,
            reward_fee,
        });

        parsed.accounts.push(Account {
            name: validator.account_id.clone(),
            start_height: block.height,
            start_time: block.time,
            last_height: block.height,
            last_time: block.time,
            balance: None,
            staking_balance: Some(validator.stake),
        });

        let at = BlockRef::from(&parsed.block);
        parsed.validator_epochs.push(self.validator_epoch(validator, &at));
        Ok(())
    }

    fn validator_epoch(&self, validator: &rpc::Validator, at: &BlockRef) -> ValidatorEpoch {
        let reward_fee = self.fees.get(&validator.account_id).copied();
        ValidatorEpoch {
            account_id: validator.account_id.clone(),
            epoch: at.epoch.clone(),
            last_height: at.height,
            last_time: at.time,
            expected_blocks: validator.num_expected_blocks,
            produced_blocks: validator.num_produced_blocks,
            expected_chunks: validator.num_expected_chunks,
            produced_chunks: validator.num_produced_chunks,
            efficiency: efficiency(validator),
            staking_balance: validator.stake,
            reward_fee,
            reward: reward_fee.map_or(0, |fee| fee.apply(validator.stake)),
        }
    }
}

fn parse_block(record: &HeightRecord) -> Result<Block, SyncError> {
    let header = &record.block.header;
    if header.height != record.height {
        return Err(SyncError::Parse(format!(
            "block height {} does not match record height {}",
            header.height, record.height
        )));
    }
    require("block hash", &header.hash)?;
    require("block epoch", &header.epoch_id)?;
    require("block producer", &record.block.author)?;
    let time = block_time(&record.block)?;

    Ok(Block {
        height: header.height,
        hash: header.hash.clone(),
        prev_hash: header.prev_hash.clone(),
        producer: record.block.author.clone(),
        epoch: header.epoch_id.clone(),
        time,
        gas_price: header.gas_price,
        total_supply: header.total_supply,
        chunks_count: record.block.chunks.len() as u32,
        transactions_count: record.transactions.len() as u32,
        approvals_count: header.approvals.iter().filter(|a| a.is_some()).count() as u32,
    })
}

fn parse_transaction(
    details: &rpc::TransactionDetails,
    block: &Block,
) -> Result<Transaction, SyncError> {
    let tx = &details.transaction;
    require("transaction hash", &tx.hash)?;
    require("transaction signer", &tx.signer_id)?;

    let actions = tx
        .actions
        .iter()
        .map(Action::decode)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SyncError::Parse(format!("transaction {}: {}", tx.hash, e)))?;
    let amount = actions
        .iter()
        .fold(0u128, |acc, action| acc.saturating_add(action.deposit()));

    Ok(Transaction {
        hash: tx.hash.clone(),
        block_hash: block.hash.clone(),
        height: block.height,
        time: block.time,
        sender: tx.signer_id.clone(),
        receiver: tx.receiver_id.clone(),
        amount,
        gas_burnt: details.gas_burnt(),
        fee: details.fee(),
        public_key: tx.public_key.clone(),
        signature: tx.signature.clone(),
        success: details.success(),
        actions,
    })
}

fn block_time(block: &rpc::Block) -> Result<DateTime<Utc>, SyncError> {
    block.time().ok_or_else(|| {
        SyncError::Parse(format!(
            "block timestamp {} out of range",
            block.header.timestamp
        ))
    })
}

fn require(field: &str, value: &str) -> Result<(), SyncError> {
    if value.is_empty() {
        return Err(SyncError::Parse(format!("{} is empty", field)));
    }
    Ok(())
}

fn check_account(account_id: &str) -> Result<(), SyncError> {
    require("validator account", account_id)
}

/// Share of expected blocks and chunks actually produced, in percent
fn efficiency(validator: &rpc::Validator) -> f64 {
    let expected = validator
        .num_expected_blocks
        .saturating_add(validator.num_expected_chunks);
    if expected == 0 {
        return 0.0;
    }
    let produced = validator
        .num_produced_blocks
        .saturating_add(validator.num_produced_chunks);
    produced as f64 / expected as f64 * 100.0
}

fn kickout_metadata(reason: &KickoutReason) -> serde_json::Value {
    match reason {
        KickoutReason::Unstaked => json!({ "reason": "unstaked" }),
        KickoutReason::Slashed => json!({ "reason": "slashed" }),
        KickoutReason::DidNotGetASeat => json!({ "reason": "no_seat" }),
        KickoutReason::NotEnoughBlocks { produced, expected } => json!({
            "reason": "not_enough_blocks",
            "produced": produced,
            "expected": expected,
        }),
        KickoutReason::NotEnoughChunks { produced, expected } => json!({
            "reason": "not_enough_chunks",
            "produced": produced,
            "expected": expected,
        }),
        KickoutReason::NotEnoughStake { stake, threshold } => json!({
            "reason": "not_enough_stake",
            "stake": stake.to_string(),
            "threshold": threshold.to_string(),
        }),
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::payload::{HeightRecord, ParsedRecord, Payload};
use super::SyncError;
use crate::db::Store;
use crate::models::{Epoch, TimeBucket};

/// Writes parsed records and refreshes the aggregates they touch
pub struct Persistor {
    store: Arc<dyn Store>,
}

impl Persistor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Persist the batch and return the lag behind the chain tip
    #[instrument(skip_all, fields(start = payload.start_height, end = payload.end_height))]
    pub async fn persist(&self, payload: &Payload) -> Result<u64, SyncError> {
        if payload.is_empty() {
            return Ok(payload.lag());
        }

        let parsed = parsed_records(payload)?;
        self.import_batch(&parsed).await?;

        for (record, rows) in payload.heights.iter().zip(&parsed) {
            self.import_height(rows)
                .await
                .map_err(|e| SyncError::at_height(record.height, e))?;
        }

        if let (Some(start), Some(end)) = (payload.start_time, payload.end_time) {
            for bucket in [TimeBucket::Hour, TimeBucket::Day] {
                self.store.refresh_block_stats(bucket, start, end).await?;
            }
        }

        let epochs = touched_epochs(&payload.heights);
        if !epochs.is_empty() {
            debug!("Refreshing rollups for epochs {:?}", epochs);
            self.store.refresh_epoch_rollups(&epochs).await?;
        }

        let lag = payload.lag();
        info!(
            "Persisted heights {} to {}, lag {}",
            payload.start_height, payload.end_height, lag
        );
        Ok(lag)
    }

    async fn import_batch(&self, parsed: &[&ParsedRecord]) -> Result<(), SyncError> {
        let blocks: Vec<_> = parsed.iter().map(|p| p.block.clone()).collect();
        self.store.import_blocks(&blocks).await?;

        let mut seen = HashSet::new();
        let epochs: Vec<Epoch> = parsed
            .iter()
            .filter(|p| seen.insert(p.epoch.id.as_str()))
            .map(|p| p.epoch.clone())
            .collect();
        self.store.import_epochs(&epochs).await?;

        let transactions: Vec<_> = parsed
            .iter()
            .flat_map(|p| p.transactions.iter().cloned())
            .collect();
        if !transactions.is_empty() {
            self.store.import_transactions(&transactions).await?;
        }

        Ok(())
    }

    async fn import_height(&self, rows: &ParsedRecord) -> Result<(), SyncError> {
        if !rows.validator_aggregates.is_empty() {
            self.store
                .import_validator_aggregates(&rows.validator_aggregates)
                .await?;
        }
        if !rows.validators.is_empty() {
            self.store.import_validators(&rows.validators).await?;
        }
        if !rows.validator_epochs.is_empty() {
            self.store
                .import_validator_epochs(&rows.validator_epochs)
                .await?;
        }
        if !rows.accounts.is_empty() {
            self.store.import_accounts(&rows.accounts).await?;
        }
        for event in &rows.events {
            self.store.create_event(event).await?;
        }
        Ok(())
    }
}

fn parsed_records(payload: &Payload) -> Result<Vec<&ParsedRecord>, SyncError> {
    payload
        .heights
        .iter()
        .map(|record| {
            record.parsed.as_ref().ok_or_else(|| {
                SyncError::at_height(
                    record.height,
                    SyncError::Parse("height was not parsed".to_string()),
                )
            })
        })
        .collect()
}

/// Epochs closed by a previous-epoch snapshot plus epochs of records that
/// carry the open epoch's validator set, in first-seen order
fn touched_epochs(heights: &[HeightRecord]) -> Vec<String> {
    let mut epochs: Vec<String> = Vec::new();
    for record in heights {
        let closed = record.previous_block.as_ref().map(|b| b.epoch.as_str());
        let current = record.current_epoch.then(|| record.epoch());
        for epoch in closed.into_iter().chain(current) {
            if !epochs.iter().any(|e| e == epoch) {
                epochs.push(epoch.to_string());
            }
        }
    }
    epochs
}

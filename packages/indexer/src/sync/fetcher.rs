use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::payload::{BlockRef, HeightRecord, Payload};
use super::{SyncConfig, SyncError};
use crate::db::Store;
use crate::models::{Block, HeightStatus};
use crate::rpc::{self, ChainClient, RpcError};

/// Outcome of fetching one height
enum Fetched {
    Record(HeightRecord),
    Skipped(HeightStatus),
}

/// Retrieves the raw chain data of the next batch of heights
pub struct Fetcher {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    config: SyncConfig,
}

impl Fetcher {
    pub fn new(client: Arc<dyn ChainClient>, store: Arc<dyn Store>, config: SyncConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    pub async fn fetch(&self) -> Result<Payload, SyncError> {
        let tip = self.client.current_tip().await?;
        let last_block = self.store.last_block().await?;
        let start_height = self.resolve_start_height(last_block.as_ref()).await?;
        let end_height = start_height
            .saturating_add(self.config.batch_size)
            .min(tip.height());

        let mut payload = Payload::new(tip, start_height..end_height);
        if start_height >= end_height {
            debug!(
                "Nothing to fetch: start height {} is at or above tip {}",
                start_height,
                payload.tip.height()
            );
            return Ok(payload);
        }

        info!(
            "Fetching heights {} to {} (tip {})",
            start_height,
            end_height - 1,
            payload.tip.height()
        );

        // Block preceding the batch; differs from the last stored block on replay
        let anchor = match last_block {
            Some(block) if block.height < start_height => Some(block),
            Some(_) => self.store.last_block_below(start_height).await?,
            None => None,
        };

        let (records, skipped) = self.fetch_heights(start_height, end_height).await?;
        payload.skipped = skipped;
        payload.heights = self
            .resolve_epochs(records, anchor.as_ref(), payload.tip.epoch())
            .await?;
        payload.update_bounds();

        info!(
            "Fetched {} heights, skipped {}",
            payload.heights.len(),
            payload.skipped.len()
        );
        Ok(payload)
    }

    /// Last stored block + 1, else the configured start, else genesis. A
    /// failed height below that point wins: the batch it belonged to may be
    /// only partly written, so it is replayed through the idempotent imports.
    async fn resolve_start_height(&self, last_block: Option<&Block>) -> Result<u64, SyncError> {
        let last_indexed = self.store.last_indexed_height().await?;
        let last = match (last_block.map(|b| b.height), last_indexed) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        if let Some(height) = last {
            let next = height + 1;
            return match self.store.lowest_failed_height().await? {
                Some(failed) if failed < next => {
                    info!("Replaying from failed height {}", failed);
                    Ok(failed)
                }
                _ => Ok(next),
            };
        }
        if let Some(height) = self.config.start_height {
            return Ok(height);
        }

        let genesis = self.client.genesis_config().await?;
        info!(
            "Starting from genesis height {} of {}",
            genesis.genesis_height, genesis.chain_id
        );
        Ok(genesis.genesis_height)
    }

    /// Fetch every height of `[start, end)` concurrently. Missing blocks are
    /// returned as skipped; the first hard error in height order fails the batch
    #[instrument(skip(self))]
    async fn fetch_heights(
        &self,
        start: u64,
        end: u64,
    ) -> Result<(Vec<HeightRecord>, Vec<(u64, HeightStatus)>), SyncError> {
        let handles: Vec<_> = (start..end)
            .map(|height| {
                let client = Arc::clone(&self.client);
                tokio::spawn(async move { (height, fetch_height(client.as_ref(), height).await) })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            results.push(joined.map_err(|e| SyncError::Join(e.to_string()))?);
        }
        results.sort_by_key(|(height, _)| *height);

        let mut records = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (height, result) in results {
            match result {
                Ok(Fetched::Record(record)) => records.push(record),
                Ok(Fetched::Skipped(status)) => skipped.push((height, status)),
                Err(e) => return Err(SyncError::at_height(height, e)),
            }
        }

        Ok((records, skipped))
    }

    /// Attach validator sets at epoch boundaries and to the trailing height of
    /// the open epoch. Runs sequentially over height-ordered records.
    async fn resolve_epochs(
        &self,
        mut records: Vec<HeightRecord>,
        last_block: Option<&Block>,
        tip_epoch: &str,
    ) -> Result<Vec<HeightRecord>, SyncError> {
        let mut last_epoch = last_block.map(|b| b.epoch.clone());
        let mut last_height = last_block.map(|b| b.height);
        let trailing = records.iter().rposition(|r| r.epoch() == tip_epoch);

        for index in 0..records.len() {
            let height = records[index].height;
            if last_height.map_or(false, |last| height <= last) {
                return Err(SyncError::at_height(
                    height,
                    SyncError::Parse(format!(
                        "height {} does not follow {}",
                        height,
                        last_height.unwrap_or_default()
                    )),
                ));
            }

            let epoch = records[index].epoch().to_string();
            if last_epoch.as_deref() != Some(epoch.as_str()) {
                let previous = match (index.checked_sub(1), &last_epoch) {
                    (Some(prev), _) => BlockRef::from_rpc(&records[prev].block),
                    (None, Some(prev_epoch)) => self
                        .store
                        .last_block_in_epoch(prev_epoch)
                        .await
                        .map_err(|e| SyncError::at_height(height, e.into()))?
                        .as_ref()
                        .map(BlockRef::from),
                    (None, None) => None,
                };

                let record = &mut records[index];
                match previous {
                    Some(previous) => {
                        info!(
                            "Epoch {} starts at height {}, previous epoch {} ended at {}",
                            epoch, height, previous.epoch, previous.height
                        );
                        let set = self.validators(height, previous.height).await?;
                        record.previous_validators = set.current_validators;
                        record.previous_epoch_kickout = set.prev_epoch_kickout;
                        record.previous_block = Some(previous);
                    }
                    None => debug!("No previous epoch block known for height {}", height),
                }
                record.validators = self.validators(height, height).await?.current_validators;
            } else if Some(index) == trailing {
                let record = &mut records[index];
                record.validators = self.validators(height, height).await?.current_validators;
                record.current_epoch = true;
            }

            last_epoch = Some(epoch);
            last_height = Some(height);
        }

        Ok(records)
    }

    async fn validators(&self, height: u64, at: u64) -> Result<rpc::ValidatorSet, SyncError> {
        self.client
            .validators_by_height(at)
            .await
            .map_err(|e| SyncError::at_height(height, e.into()))
    }
}

async fn fetch_height(client: &dyn ChainClient, height: u64) -> Result<Fetched, SyncError> {
    let block = match client.block_by_height(height).await {
        Ok(block) => block,
        Err(e) if e.is_missing() => {
            debug!("Skipping height {}: {}", height, e);
            let status = match e {
                RpcError::Missing(_) => HeightStatus::MissingBlock,
                _ => HeightStatus::NoBlock,
            };
            return Ok(Fetched::Skipped(status));
        }
        Err(e) => return Err(e.into()),
    };

    if block.height() != height {
        return Err(SyncError::Parse(format!(
            "requested height {} but node returned {}",
            height,
            block.height()
        )));
    }

    let mut record = HeightRecord::new(block);
    let chunk_hashes: Vec<String> = record
        .block
        .chunks
        .iter()
        .filter(|chunk| chunk.has_transactions())
        .map(|chunk| chunk.chunk_hash.clone())
        .collect();

    for chunk_hash in chunk_hashes {
        let chunk = client.chunk(&chunk_hash).await?;

        // Wait for every sibling before reporting the first failure
        let results = join_all(
            chunk
                .transactions
                .iter()
                .map(|tx| client.transaction(&tx.hash, &tx.signer_id)),
        )
        .await;

        for result in results {
            match result {
                Ok(details) => record.transactions.push(details),
                Err(e) => {
                    warn!("Transaction fetch failed at height {}: {}", height, e);
                    return Err(e.into());
                }
            }
        }
        record.chunks.push(chunk);
    }

    debug!(
        "Fetched height {} with {} chunks and {} transactions",
        record.height,
        record.chunks.len(),
        record.transactions.len()
    );
    Ok(Fetched::Record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Height;
    use crate::testing::{stored_block, sync_config, validator, MemoryStore, MockChain};

    fn fetcher(chain: &Arc<MockChain>, store: &Arc<MemoryStore>, batch_size: u64) -> Fetcher {
        Fetcher::new(chain.clone(), store.clone(), sync_config(batch_size))
    }

    fn heights(payload: &Payload) -> Vec<u64> {
        payload.heights.iter().map(|r| r.height).collect()
    }

    fn ids(set: &[rpc::Validator]) -> Vec<&str> {
        set.iter().map(|v| v.account_id.as_str()).collect()
    }

    #[tokio::test]
    async fn starts_at_genesis_when_store_is_empty() {
        let chain = Arc::new(MockChain::new(100).with_blocks(100..120, "e1"));
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 3).fetch().await.unwrap();

        assert_eq!(payload.range, 100..103);
        assert_eq!(heights(&payload), vec![100, 101, 102]);
        assert_eq!(*chain.genesis_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn range_is_bounded_by_tip() {
        let chain = Arc::new(MockChain::new(100).with_blocks(100..102, "e1"));
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 3).fetch().await.unwrap();

        assert_eq!(payload.range, 100..101);
        assert_eq!(heights(&payload), vec![100]);
        assert_eq!(payload.lag(), 1);
    }

    #[tokio::test]
    async fn configured_start_height_beats_genesis() {
        let chain = Arc::new(MockChain::new(100).with_blocks(100..120, "e1"));
        let store = Arc::new(MemoryStore::default());
        let config = SyncConfig {
            batch_size: 2,
            start_height: Some(110),
        };

        let payload = Fetcher::new(chain.clone(), store, config).fetch().await.unwrap();

        assert_eq!(payload.range, 110..112);
        assert_eq!(*chain.genesis_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn resumes_after_last_stored_block() {
        let chain = Arc::new(MockChain::new(100).with_blocks(100..120, "e1"));
        let store = Arc::new(MemoryStore::default());
        store.state().blocks.insert(104, stored_block(104, "e1"));

        let payload = fetcher(&chain, &store, 4).fetch().await.unwrap();

        assert_eq!(heights(&payload), vec![105, 106, 107, 108]);
        assert_eq!(*chain.genesis_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_blocks_are_skipped() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..110, "e1")
                .without_block(101)
                .without_block(103),
        );
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 5).fetch().await.unwrap();

        assert_eq!(heights(&payload), vec![100, 102, 104]);
        assert_eq!(
            payload.skipped,
            vec![
                (101, HeightStatus::MissingBlock),
                (103, HeightStatus::MissingBlock)
            ]
        );
        assert_eq!((payload.start_height, payload.end_height), (100, 104));
    }

    #[tokio::test]
    async fn all_skipped_batch_keeps_requested_range() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..110, "e1")
                .without_block(100)
                .without_block(101),
        );
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 2).fetch().await.unwrap();

        assert!(payload.is_empty());
        assert_eq!((payload.start_height, payload.end_height), (100, 101));
        assert!(payload.start_time.is_none());
    }

    #[tokio::test]
    async fn hard_error_fails_the_batch() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..110, "e1")
                .with_broken_height(102),
        );
        let store = Arc::new(MemoryStore::default());

        let err = fetcher(&chain, &store, 5).fetch().await.unwrap_err();

        assert_eq!(err.height(), Some(102));
        assert!(matches!(err, SyncError::Height { .. }));
    }

    #[tokio::test]
    async fn transaction_failure_fails_its_height() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..110, "e1")
                .with_transaction(101, "tx-1")
                .with_transaction(101, "tx-2")
                .with_failing_transaction("tx-2"),
        );
        let store = Arc::new(MemoryStore::default());

        let err = fetcher(&chain, &store, 3).fetch().await.unwrap_err();

        assert_eq!(err.height(), Some(101));
    }

    #[tokio::test]
    async fn fetches_chunk_transactions() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..110, "e1")
                .with_transaction(101, "tx-1")
                .with_transaction(101, "tx-2"),
        );
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 3).fetch().await.unwrap();

        let record = &payload.heights[1];
        assert_eq!(record.chunks.len(), 1);
        let hashes: Vec<_> = record
            .transactions
            .iter()
            .map(|t| t.transaction.hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["tx-1", "tx-2"]);
        assert!(payload.heights[0].transactions.is_empty());
    }

    #[tokio::test]
    async fn epoch_boundary_inside_batch() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..103, "e1")
                .with_blocks(103..110, "e2")
                .with_validators("e1", vec![validator("a", 10), validator("b", 10)])
                .with_validators("e2", vec![validator("b", 10), validator("c", 10)]),
        );
        let store = Arc::new(MemoryStore::default());

        let payload = fetcher(&chain, &store, 5).fetch().await.unwrap();
        let boundary = &payload.heights[3];

        assert_eq!(boundary.height, 103);
        let previous = boundary.previous_block.as_ref().unwrap();
        assert_eq!((previous.height, previous.epoch.as_str()), (102, "e1"));
        assert_eq!(ids(&boundary.previous_validators), vec!["a", "b"]);
        assert_eq!(ids(&boundary.validators), vec!["b", "c"]);
        assert!(!boundary.current_epoch);

        let trailing = &payload.heights[4];
        assert_eq!(trailing.height, 104);
        assert!(trailing.current_epoch);
        assert_eq!(ids(&trailing.validators), vec!["b", "c"]);

        assert!(payload.heights[1].validators.is_empty());
        assert_eq!(chain.validator_calls(), vec![100, 102, 103, 104]);
    }

    #[tokio::test]
    async fn epoch_boundary_uses_stored_block() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..103, "e1")
                .with_blocks(103..110, "e2")
                .with_validators("e1", vec![validator("a", 10)])
                .with_validators("e2", vec![validator("c", 10)]),
        );
        let store = Arc::new(MemoryStore::default());
        store.state().blocks.insert(101, stored_block(101, "e1"));
        store.state().blocks.insert(102, stored_block(102, "e1"));

        let payload = fetcher(&chain, &store, 2).fetch().await.unwrap();
        let boundary = &payload.heights[0];

        assert_eq!(boundary.height, 103);
        assert_eq!(boundary.previous_block.as_ref().unwrap().height, 102);
        assert_eq!(boundary.previous_validators[0].account_id, "a");
        assert_eq!(boundary.validators[0].account_id, "c");
    }

    #[tokio::test]
    async fn replays_from_lowest_failed_height() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(100..103, "e1")
                .with_blocks(103..110, "e2")
                .with_validators("e1", vec![validator("a", 10)])
                .with_validators("e2", vec![validator("c", 10)]),
        );
        let store = Arc::new(MemoryStore::default());
        {
            let mut state = store.state();
            for height in 101..103 {
                state.blocks.insert(height, stored_block(height, "e1"));
            }
            state.blocks.insert(103, stored_block(103, "e2"));
            state.blocks.insert(104, stored_block(104, "e2"));
            state
                .heights
                .insert(103, Height::failed(103, "import failed".to_string()));
        }

        let payload = fetcher(&chain, &store, 2).fetch().await.unwrap();
        let boundary = &payload.heights[0];

        assert_eq!(payload.range, 103..105);
        assert_eq!(boundary.previous_block.as_ref().unwrap().height, 102);
        assert_eq!(boundary.previous_validators[0].account_id, "a");
    }

    #[tokio::test]
    async fn only_trailing_height_of_open_epoch_gets_validators() {
        let chain = Arc::new(
            MockChain::new(100)
                .with_blocks(99..120, "e1")
                .with_validators("e1", vec![validator("a", 10)]),
        );
        let store = Arc::new(MemoryStore::default());
        store.state().blocks.insert(99, stored_block(99, "e1"));

        let payload = fetcher(&chain, &store, 5).fetch().await.unwrap();

        let flagged: Vec<_> = payload
            .heights
            .iter()
            .filter(|r| r.current_epoch)
            .map(|r| r.height)
            .collect();
        assert_eq!(flagged, vec![104]);
        assert_eq!(chain.validator_calls(), vec![104]);
        assert!(payload.heights.iter().all(|r| r.previous_block.is_none()));
    }
}

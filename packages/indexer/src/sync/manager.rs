use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::analyzer::Analyzer;
use super::fetcher::Fetcher;
use super::parser::Parser;
use super::payload::Payload;
use super::persistor::Persistor;
use super::{RunError, SyncConfig, SyncError};
use crate::db::Store;
use crate::models::{Height, HeightStatus, Run};
use crate::rpc::ChainClient;
use crate::utils::time::{format_duration, format_rate};

/// Pipeline position of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Start,
    Fetched,
    Parsed,
    Persisted,
    Analyzed,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Fetched => "fetched",
            Stage::Parsed => "parsed",
            Stage::Persisted => "persisted",
            Stage::Analyzed => "analyzed",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs fetch, parse, persist and analyze once per call
pub struct SyncManager {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    fetcher: Fetcher,
    persistor: Persistor,
    analyzer: Analyzer,
}

impl SyncManager {
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        if config.batch_size == 0 {
            return Err(SyncError::Config("batch size must be positive".to_string()));
        }

        Ok(Self {
            fetcher: Fetcher::new(Arc::clone(&client), Arc::clone(&store), config),
            persistor: Persistor::new(Arc::clone(&store)),
            analyzer: Analyzer::new(Arc::clone(&store)),
            client,
            store,
        })
    }

    /// Process the next batch of heights and return the lag behind the tip.
    /// A failed run still reports the lag of what it committed.
    ///
    /// Run and height bookkeeping is written whether the pipeline succeeds or
    /// not; a bookkeeping failure is logged and never replaces the pipeline's
    /// own result.
    pub async fn run_sync(&self) -> Result<u64, RunError> {
        let started = Instant::now();
        let mut run = self.store.create_run().await.map_err(|e| RunError {
            error: e.into(),
            lag: None,
        })?;
        let span = info_span!("sync_run", run_id = run.id);

        let mut stage = Stage::Start;
        let mut payload = None;
        let result = self
            .execute(&mut stage, &mut payload)
            .instrument(span.clone())
            .await;

        async {
            let outcome = match result {
                Ok(lag) => {
                    let heights = payload.as_ref().map_or(0, |p| p.heights.len());
                    let elapsed = started.elapsed();
                    info!(
                        "Sync run finished in {} ({} heights, {}), lag {}",
                        format_duration(elapsed),
                        heights,
                        format_rate(heights, elapsed),
                        lag
                    );
                    Ok(lag)
                }
                Err(error) => {
                    let lag = self.committed_lag(payload.as_ref()).await;
                    error!(
                        "Sync run aborted after stage {} in {}: {} (lag {:?})",
                        stage,
                        format_duration(started.elapsed()),
                        error,
                        lag
                    );
                    Err(RunError { error, lag })
                }
            };
            self.finalize(&mut run, payload.as_ref(), &outcome).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        stage: &mut Stage,
        slot: &mut Option<Payload>,
    ) -> Result<u64, SyncError> {
        let payload = slot.insert(self.fetcher.fetch().await?);
        advance(stage, Stage::Fetched);

        if payload.range.is_empty() {
            advance(stage, Stage::Done);
            return Ok(payload.lag());
        }

        let parser = Parser::new(self.store.reward_fees().await?);
        parser.parse(payload)?;
        advance(stage, Stage::Parsed);

        let lag = self.persistor.persist(payload).await?;
        advance(stage, Stage::Persisted);

        self.analyzer.analyze(payload).await?;
        advance(stage, Stage::Analyzed);

        advance(stage, Stage::Done);
        Ok(lag)
    }

    /// Lag from the tip to the highest block stored so far, for a failed
    /// run. Blocks of the failed batch may already be committed. `None` when
    /// neither the tip nor a committed height can be determined.
    async fn committed_lag(&self, payload: Option<&Payload>) -> Option<u64> {
        let tip = match payload {
            Some(payload) => payload.tip.height(),
            None => match self.client.current_tip().await {
                Ok(block) => block.height(),
                Err(e) => {
                    warn!("Failed to read chain tip for lag: {}", e);
                    return None;
                }
            },
        };

        let before_batch = payload.map(|p| p.range.start.saturating_sub(1));
        let stored = match self.store.last_block().await {
            Ok(block) => block.map(|b| b.height),
            Err(e) => {
                warn!("Failed to read last block for lag: {:#}", e);
                None
            }
        };
        let committed = match (stored, before_batch) {
            (Some(a), Some(b)) => a.max(b),
            (a, b) => a.or(b)?,
        };
        Some(tip.saturating_sub(committed))
    }

    async fn finalize(
        &self,
        run: &mut Run,
        payload: Option<&Payload>,
        result: &Result<u64, RunError>,
    ) {
        let heights = height_statuses(payload, result);
        if !heights.is_empty() {
            if let Err(e) = self.store.record_heights(&heights).await {
                warn!("Failed to record {} height statuses: {:#}", heights.len(), e);
            }
        }

        run.finished_at = Some(Utc::now());
        match result {
            Ok(lag) => {
                run.success = Some(true);
                run.lag = Some(*lag);
            }
            Err(e) => {
                run.success = Some(false);
                run.error = Some(e.to_string());
                run.lag = e.lag;
            }
        }

        if let Err(e) = self.store.finish_run(run).await {
            warn!("Failed to finish run {}: {:#}", run.id, e);
        }
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Stage {} -> {}", stage, next);
    *stage = next;
}

/// Statuses to record for a finished run.
///
/// A failed run marks a single height as failed: the one the error is
/// attributed to, else the first height of the batch. The next run replays
/// from the lowest failed height, so partly written batches are completed.
/// Skips are not recorded on failure, since they would move the resume point
/// past the failure.
fn height_statuses(payload: Option<&Payload>, result: &Result<u64, RunError>) -> Vec<Height> {
    match result {
        Ok(_) => {
            let Some(payload) = payload else {
                return Vec::new();
            };
            let mut heights: Vec<Height> = payload
                .heights
                .iter()
                .map(|record| Height::new(record.height, HeightStatus::Success))
                .chain(
                    payload
                        .skipped
                        .iter()
                        .map(|(height, status)| Height::new(*height, *status)),
                )
                .collect();
            heights.sort_by_key(|h| h.height);
            heights
        }
        Err(e) => e
            .height()
            .or_else(|| {
                payload
                    .filter(|p| !p.range.is_empty())
                    .map(|p| p.range.start)
            })
            .map(|height| vec![Height::failed(height, e.to_string())])
            .unwrap_or_default(),
    }
}

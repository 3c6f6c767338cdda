use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::payload::{HeightRecord, Payload};
use super::SyncError;
use crate::db::Store;
use crate::models::{Event, EventAction};
use crate::rpc;

/// Emits active-set membership changes at epoch boundaries
pub struct Analyzer {
    store: Arc<dyn Store>,
}

impl Analyzer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Diff every closed epoch boundary in the batch and import the events
    /// in one call. Returns the number of events.
    pub async fn analyze(&self, payload: &Payload) -> Result<usize, SyncError> {
        let events: Vec<Event> = payload.heights.iter().flat_map(diff).collect();
        if events.is_empty() {
            return Ok(0);
        }

        self.store.import_events(&events).await?;
        info!("Recorded {} active set changes", events.len());
        Ok(events.len())
    }
}

/// Membership diff by account id between the previous epoch's final set and
/// this height's set.
///
/// Stake changes of validators present in both sets are not reported.
pub fn diff(record: &HeightRecord) -> Vec<Event> {
    if record.current_epoch
        || record.previous_validators.is_empty()
        || record.validators.is_empty()
    {
        return Vec::new();
    }
    let Some(time) = record.block.time() else {
        return Vec::new();
    };

    let previous = account_ids(&record.previous_validators);
    let current = account_ids(&record.validators);

    let event = |action, account_id: &str| {
        Event::validator(
            action,
            account_id,
            record.height,
            time,
            record.epoch(),
            serde_json::Value::Null,
        )
    };

    let mut events: Vec<Event> = record
        .validators
        .iter()
        .filter(|v| !previous.contains(v.account_id.as_str()))
        .map(|v| event(EventAction::JoinedActiveSet, &v.account_id))
        .collect();
    events.extend(
        record
            .previous_validators
            .iter()
            .filter(|v| !current.contains(v.account_id.as_str()))
            .map(|v| event(EventAction::LeftActiveSet, &v.account_id)),
    );

    debug!(
        "Height {}: {} active set changes",
        record.height,
        events.len()
    );
    events
}

fn account_ids(validators: &[rpc::Validator]) -> HashSet<&str> {
    validators.iter().map(|v| v.account_id.as_str()).collect()
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Staking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    JoinedActiveSet,
    LeftActiveSet,
}

impl EventScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventScope::Staking => "staking",
        }
    }
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::JoinedActiveSet => "joined_active_set",
            EventAction::LeftActiveSet => "left_active_set",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only domain event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub scope: EventScope,
    pub action: EventAction,
    pub height: u64,
    pub time: DateTime<Utc>,
    pub epoch: String,
    pub item_id: String,
    pub item_type: String,
    pub metadata: serde_json::Value,
}

impl Event {
    /// Staking event about a validator account
    pub fn validator(
        action: EventAction,
        account_id: &str,
        height: u64,
        time: DateTime<Utc>,
        epoch: &str,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            scope: EventScope::Staking,
            action,
            height,
            time,
            epoch: epoch.to_string(),
            item_id: account_id.to_string(),
            item_type: "validator".to_string(),
            metadata,
        }
    }
}

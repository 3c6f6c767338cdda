mod account;
mod action;
mod block;
mod epoch;
mod event;
mod syncable;
mod validator;

pub use account::Account;
pub use action::Action;
pub use block::{Block, Transaction};
pub use epoch::Epoch;
pub use event::{Event, EventAction, EventScope};
pub use syncable::{Height, HeightStatus, Run, TimeBucket};
pub use validator::{RewardFee, Validator, ValidatorAggregate, ValidatorEpoch};

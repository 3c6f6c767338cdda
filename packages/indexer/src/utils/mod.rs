pub mod amount;
pub mod config_logger;
pub mod logger;
pub mod retry;
pub mod time;

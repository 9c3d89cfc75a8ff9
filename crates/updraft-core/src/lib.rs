pub mod config;
pub mod types;

pub use config::{LoggingConfig, RolloutConfig, ServerConfig, UpdraftConfig};
pub use types::*;

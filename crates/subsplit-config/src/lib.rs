//! subsplit-config
//!
//! User settings for the billing engine: data location, log filter and the
//! wallet categories stamped on generated entries.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::ConfigManager;
pub use model::Config;

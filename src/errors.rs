use std::result::Result as StdResult;

use subsplit_config::ConfigError;
use subsplit_core::CoreError;
use subsplit_domain::MonthLabelError;
use thiserror::Error;

/// Unified error type surfaced by [`crate::BillingEngine`].
#[derive(Error, Debug)]
pub enum SubsplitError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Storage(String),
}

pub type Result<T> = StdResult<T, SubsplitError>;

impl SubsplitError {
    /// Whether the failed call may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            SubsplitError::Core(err) => err.is_transient(),
            SubsplitError::Storage(_) => true,
            SubsplitError::Config(_) => false,
        }
    }
}

impl From<std::io::Error> for SubsplitError {
    fn from(err: std::io::Error) -> Self {
        SubsplitError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SubsplitError {
    fn from(err: serde_json::Error) -> Self {
        SubsplitError::Storage(err.to_string())
    }
}

impl From<MonthLabelError> for SubsplitError {
    fn from(err: MonthLabelError) -> Self {
        SubsplitError::Core(CoreError::from(err))
    }
}

impl From<ConfigError> for SubsplitError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(io) => SubsplitError::Storage(io.to_string()),
            ConfigError::Serde(message) => SubsplitError::Config(message),
            ConfigError::BackupNotFound(name) => {
                SubsplitError::Config(format!("backup `{name}` not found"))
            }
        }
    }
}

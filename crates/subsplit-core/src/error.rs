use std::io;

use subsplit_domain::{BillingMonth, BillingTermsError, DebtStatus, MonthLabelError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed month label: {0}")]
    MalformedLabel(String),
    #[error("Cannot {operation} debt {debt}: it is {status}")]
    InvalidTransition {
        debt: Uuid,
        status: DebtStatus,
        operation: &'static str,
    },
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),
    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(Uuid),
    #[error("Debt not found: {0}")]
    DebtNotFound(Uuid),
    #[error("A debt for {month} already exists")]
    DuplicateDebt { month: BillingMonth },
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serde(String),
    #[error("Batch stopped at {month} after {completed} month(s): {source}")]
    BatchInterrupted {
        completed: usize,
        month: BillingMonth,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::StoreUnavailable(_) => true,
            CoreError::BatchInterrupted { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        CoreError::StoreUnavailable(err.to_string())
    }
}

impl From<MonthLabelError> for CoreError {
    fn from(err: MonthLabelError) -> Self {
        CoreError::MalformedLabel(err.to_string())
    }
}

impl From<BillingTermsError> for CoreError {
    fn from(err: BillingTermsError) -> Self {
        CoreError::MissingConfiguration(err.to_string())
    }
}

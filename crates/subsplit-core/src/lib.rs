//! subsplit-core
//!
//! Billing logic for Subsplit: materializing monthly debts, moving them
//! through their lifecycle and keeping the wallet ledger consistent.
//! Depends on subsplit-domain. Storage is reached only through [`BillingStore`].

pub mod bulk_payment;
pub mod debt_service;
pub mod document;
pub mod error;
pub mod materializer;
pub mod registry_service;
pub mod storage;
pub mod time;
pub mod wallet_service;

pub use bulk_payment::*;
pub use debt_service::*;
pub use document::{BillingDocument, ServiceNode, SubscriberNode, CURRENT_SCHEMA_VERSION};
pub use error::CoreError;
pub use materializer::*;
pub use registry_service::*;
pub use storage::*;
pub use time::*;
pub use wallet_service::*;

#[cfg(test)]
mod tests;

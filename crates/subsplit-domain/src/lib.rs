//! subsplit-domain
//!
//! Pure domain models (Service, Subscriber, Debt, WalletTransaction) and the
//! month label codec. No I/O, no storage. Only data types and core enums.

pub mod common;
pub mod debt;
pub mod month;
pub mod service;
pub mod wallet;

pub use common::*;
pub use debt::*;
pub use month::*;
pub use service::*;
pub use wallet::*;

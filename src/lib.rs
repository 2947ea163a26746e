#![doc(test(attr(deny(warnings))))]

//! Subsplit tracks recurring services shared with subscribers, turns their
//! billing cycles into debts and keeps a personal wallet in step with every
//! payment.
//!
//! The heavy lifting lives in the workspace crates; this package wires them
//! into [`BillingEngine`] and owns process-wide setup.

pub mod engine;
pub mod errors;
pub mod system_clock;
pub mod utils;

use std::sync::Once;

pub use engine::BillingEngine;
pub use errors::{Result, SubsplitError};
pub use system_clock::SystemClock;

pub use subsplit_config;
pub use subsplit_core;
pub use subsplit_domain;
pub use subsplit_storage_json;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing with the default filter and emits a startup log.
pub fn init() {
    init_with_filter(&subsplit_config::Config::default_log_filter());
}

/// Like [`init`], using `directive` (usually `Config::log_filter`) when
/// `RUST_LOG` is unset. Only the first call has an effect.
pub fn init_with_filter(directive: &str) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(directive);
        tracing::info!("Subsplit tracing initialized.");
    });
}

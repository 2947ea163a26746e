#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use subsplit::{
    subsplit_config::Config, subsplit_core::Clock, subsplit_storage_json::JsonBillingStore,
    BillingEngine,
};
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// A clock tests can move forward between calls.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(year: i32, month: u32, day: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(instant(year, month, day))))
    }

    pub fn set(&self, year: i32, month: u32, day: u32) {
        *self.0.lock().expect("lock clock") = instant(year, month, day);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("lock clock")
    }
}

pub fn instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Fresh data root that outlives the test body.
pub fn temp_root() -> std::path::PathBuf {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);
    base
}

/// Engine over a JSON store in an isolated directory, driven by `clock`.
pub fn setup_engine(clock: Arc<ManualClock>) -> (BillingEngine, Config) {
    let config = Config::default().with_data_root(temp_root());
    let engine = reopen(&config, clock);
    (engine, config)
}

pub fn reopen(config: &Config, clock: Arc<ManualClock>) -> BillingEngine {
    let store = JsonBillingStore::open(config.resolve_data_root()).expect("open json store");
    BillingEngine::with_store(config.clone(), Arc::new(store), clock)
}

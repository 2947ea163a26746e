use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use subsplit_domain::WalletCategories;

const DATA_DIR_NAME: &str = "subsplit";

/// Settings shared by every engine instance of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Directory holding the store and its backups. Defaults to the platform
    /// data directory.
    pub data_root: Option<PathBuf>,

    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "Config::default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub categories: WalletCategories,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: None,
            log_filter: Self::default_log_filter(),
            categories: WalletCategories::default(),
        }
    }
}

impl Config {
    pub fn default_log_filter() -> String {
        "subsplit=info".into()
    }

    pub fn with_data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_root = Some(path.into());
        self
    }

    pub fn resolve_data_root(&self) -> PathBuf {
        if let Some(path) = &self.data_root {
            return path.clone();
        }

        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        base.join(DATA_DIR_NAME)
    }
}

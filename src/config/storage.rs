use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Keep device records in memory only
    #[serde(default)]
    pub in_memory: bool,

    /// Sled database directory
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.in_memory {
            return Ok(());
        }
        validate_directory(&self.db_path, "storage.db_path")
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db")
}

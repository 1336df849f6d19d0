use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime settings, read from `FILMDB_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    /// Pages parsed and normalized per parallel batch.
    pub batch_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/films.sqlite"),
            batch_size: 500,
            busy_timeout_ms: 5000,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("FILMDB").try_parsing(true))
            .build()
            .context("Failed to read FILMDB_* settings")?
            .try_deserialize::<Settings>()
            .context("Invalid FILMDB_* settings")?;
        Ok(settings)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

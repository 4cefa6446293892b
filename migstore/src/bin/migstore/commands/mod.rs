pub mod seed;
pub mod state;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use migstore::StoreConfig;
use serde::de::DeserializeOwned;

/// Connection options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// TOML config file with a [store] table
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Table holding migration state
    #[arg(long, global = true, env = "DATA_MIGRATIONS_TABLE_NAME")]
    pub table: Option<String>,

    /// Region namespace for table keys
    #[arg(long, global = true, env = "DATA_MIGRATIONS_REGION")]
    pub region: Option<String>,

    /// Endpoint override, e.g. a local Redis instance
    #[arg(long, global = true, env = "DATA_MIGRATIONS_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl StoreArgs {
    /// Resolves defaults, config file and environment, then applies command-line flags.
    pub fn resolve(&self) -> Result<StoreConfig> {
        let mut config = StoreConfig::load(self.config.as_deref())
            .context("Failed to resolve store configuration")?;

        if let Some(table) = non_empty(&self.table) {
            config.table_name = table;
        }
        if let Some(region) = non_empty(&self.region) {
            config.region = region;
        }
        if let Some(endpoint) = non_empty(&self.endpoint) {
            config.endpoint = Some(endpoint);
        }

        Ok(config)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Reads and deserializes a JSON input file.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

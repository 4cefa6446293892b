//! Store configuration: table name, region namespace and endpoint override.
//!
//! Values resolve in three layers: built-in defaults, an optional TOML file
//! and finally environment variables. File values of the form `${VAR}` are
//! expanded from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{errors::StoreError, keys::check_segment};

pub const DEFAULT_TABLE_NAME: &str = "datamigrations";
pub const DEFAULT_REGION: &str = "us-east-1";
/// Endpoint used when no override is configured.
pub const DEFAULT_ENDPOINT: &str = "redis://127.0.0.1:6379/";

pub const TABLE_NAME_ENV: &str = "DATA_MIGRATIONS_TABLE_NAME";
pub const REGION_ENV: &str = "DATA_MIGRATIONS_REGION";
pub const ENDPOINT_ENV: &str = "DATA_MIGRATIONS_ENDPOINT";

/// Fully resolved store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub table_name: String,
    /// Key namespace; rows of different regions never share keys.
    pub region: String,
    /// Endpoint override, typically a local development instance.
    pub endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
        }
    }
}

/// Layout of the optional config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub store: StoreSettings,
}

/// `[store]` table of the config file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    pub table_name: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl ConfigFile {
    pub fn parse(content: &str) -> Result<Self, StoreError> {
        toml::from_str(content).map_err(|err| StoreError::Config {
            message: format!("failed to parse config file: {err}"),
        })
    }

    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|err| StoreError::Config {
            message: format!("failed to read {}: {err}", path.display()),
        })?;
        Self::parse(&content)
    }
}

impl StoreConfig {
    /// Resolves configuration from the process environment only.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(None, env_lookup)
    }

    /// Resolves configuration from an optional config file plus the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, StoreError> {
        let file = path.map(ConfigFile::read).transpose()?;
        Self::from_lookup(file, env_lookup)
    }

    /// Resolves configuration with `lookup` standing in for the environment.
    pub fn from_lookup<F>(file: Option<ConfigFile>, lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(file) = file {
            let settings = file.store;
            if let Some(table_name) = settings.table_name {
                config.table_name = expand(&table_name, &lookup)?;
            }
            if let Some(region) = settings.region {
                config.region = expand(&region, &lookup)?;
            }
            if let Some(endpoint) = settings.endpoint {
                config.endpoint = Some(expand(&endpoint, &lookup)?);
            }
        }

        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(table_name) = non_empty(TABLE_NAME_ENV) {
            config.table_name = table_name;
        }
        if let Some(region) = non_empty(REGION_ENV) {
            config.region = region;
        }
        if let Some(endpoint) = non_empty(ENDPOINT_ENV) {
            config.endpoint = Some(endpoint);
        }

        config.validate()?;
        Ok(config)
    }

    /// URL the Redis client connects to.
    pub fn connection_url(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.table_name.trim().is_empty() {
            return Err(StoreError::Config {
                message: "table name must not be empty".to_string(),
            });
        }
        if self.region.trim().is_empty() {
            return Err(StoreError::Config {
                message: "region must not be empty".to_string(),
            });
        }
        check_segment("table name", &self.table_name)
            .and_then(|()| check_segment("region", &self.region))
            .map_err(|err| StoreError::Config {
                message: err.to_string(),
            })
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Expands a whole-value `${VAR}` reference; other values pass through.
fn expand<F>(value: &str, lookup: &F) -> Result<String, StoreError>
where
    F: Fn(&str) -> Option<String>,
{
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => lookup(var_name).ok_or_else(|| StoreError::Config {
            message: format!("environment variable {var_name} not set"),
        }),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let config = StoreConfig::from_lookup(None, lookup_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.table_name, "datamigrations");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.connection_url(), DEFAULT_ENDPOINT);
    }

    #[test]
    fn env_overrides_file_and_file_overrides_defaults() {
        let file = ConfigFile::parse(
            r#"
            [store]
            table_name = "from_file"
            region = "eu-west-1"
            "#,
        )
        .unwrap();
        let lookup = lookup_from(&[(TABLE_NAME_ENV, "from_env")]);
        let config = StoreConfig::from_lookup(Some(file), lookup).unwrap();

        assert_eq!(config.table_name, "from_env");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint, None);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let lookup = lookup_from(&[(REGION_ENV, ""), (ENDPOINT_ENV, "  ")]);
        let config = StoreConfig::from_lookup(None, lookup).unwrap();
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.endpoint, None);
    }

    #[test]
    fn endpoint_override_becomes_connection_url() {
        let lookup = lookup_from(&[(ENDPOINT_ENV, "redis://localhost:6380/")]);
        let config = StoreConfig::from_lookup(None, lookup).unwrap();
        assert_eq!(config.connection_url(), "redis://localhost:6380/");
    }

    #[test]
    fn file_placeholders_expand_from_environment() {
        let file = ConfigFile::parse("[store]\nendpoint = \"${LOCAL_REDIS}\"\n").unwrap();
        let lookup = lookup_from(&[("LOCAL_REDIS", "redis://cache:6379/")]);
        let config = StoreConfig::from_lookup(Some(file), lookup).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("redis://cache:6379/"));

        let file = ConfigFile::parse("[store]\nendpoint = \"${LOCAL_REDIS}\"\n").unwrap();
        let err = StoreConfig::from_lookup(Some(file), lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("LOCAL_REDIS"));
    }

    #[test]
    fn blank_table_name_is_rejected() {
        let file = ConfigFile::parse("[store]\ntable_name = \"\"\n").unwrap();
        assert!(matches!(
            StoreConfig::from_lookup(Some(file), lookup_from(&[])),
            Err(StoreError::Config { .. })
        ));
    }

    #[test]
    fn key_separator_in_names_is_rejected() {
        let err =
            StoreConfig::from_lookup(None, lookup_from(&[(TABLE_NAME_ENV, "a:b")])).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
        assert!(err.to_string().contains("`a:b`"));

        let err =
            StoreConfig::from_lookup(None, lookup_from(&[(REGION_ENV, "eu:west")])).unwrap_err();
        assert!(matches!(err, StoreError::Config { .. }));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        assert!(matches!(ConfigFile::parse("[store"), Err(StoreError::Config { .. })));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migstore.toml");
        std::fs::write(&path, "[store]\ntable_name = \"disk_table\"\n").unwrap();

        let file = ConfigFile::read(&path).unwrap();
        let config = StoreConfig::from_lookup(Some(file), lookup_from(&[])).unwrap();
        assert_eq!(config.table_name, "disk_table");

        assert!(ConfigFile::read(&dir.path().join("missing.toml")).is_err());
    }
}

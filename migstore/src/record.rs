//! Migration records as persisted in the table, and the canonical projection
//! of caller migrations that gets compared against them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StoreError;

/// Read access to the fields of a caller migration that get persisted.
///
/// Migration runners carry extra in-memory state on their migration objects;
/// implementing this trait is how such a type exposes the persisted subset.
pub trait Migration {
    fn title(&self) -> &str;
    fn description(&self) -> &str;
    /// `None` for a migration that has not run yet.
    fn timestamp(&self) -> Option<i64>;
}

/// One persisted migration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Row identifier assigned by the table on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Stored as `null` until the migration has run.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Leading numeric prefix of `title`, captured once at creation.
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl MigrationRecord {
    /// Decodes a table item. Fields other than the record's own are ignored.
    pub fn from_item(item: Value) -> Result<Self, StoreError> {
        serde_json::from_value(item)
            .map_err(|err| StoreError::invalid_record(format!("malformed migration row: {err}")))
    }

    pub fn to_item(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Migration for MigrationRecord {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// Canonical `{title, description, timestamp}` shape of a proposed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMigration {
    pub title: String,
    pub description: String,
    pub timestamp: Option<i64>,
}

impl SerializedMigration {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: impl Into<Option<i64>>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn from_migration<M: Migration + ?Sized>(migration: &M) -> Self {
        Self::new(migration.title(), migration.description(), migration.timestamp())
    }

    /// Projects an arbitrary JSON migration object onto the canonical shape.
    ///
    /// Any field other than `title`, `description` and `timestamp` is dropped.
    /// A missing `description` becomes empty; a missing or `null` timestamp
    /// marks a migration that has not run yet.
    pub fn from_value(value: &Value) -> Result<Self, StoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| StoreError::invalid_record("migration must be a JSON object"))?;
        let title = object
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::invalid_record("migration is missing a string `title`"))?;
        let timestamp = match object.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_i64().ok_or_else(|| {
                StoreError::invalid_record(format!(
                    "migration `{title}` has a non-integer `timestamp`"
                ))
            })?),
        };
        let description = object.get("description").and_then(Value::as_str).unwrap_or_default();
        Ok(Self::new(title, description, timestamp))
    }
}

impl Migration for SerializedMigration {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}

/// State returned to the migration runner by `load` and `save`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSet {
    pub migrations: Vec<MigrationRecord>,
    #[serde(rename = "lastRun", default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<i64>,
}

/// Migration set handed to `save` by the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposedSet<M> {
    pub migrations: Vec<M>,
    #[serde(rename = "lastRun", default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<i64>,
}

impl<M> ProposedSet<M> {
    pub fn new(migrations: Vec<M>, last_run: Option<i64>) -> Self {
        Self { migrations, last_run }
    }
}

impl ProposedSet<Value> {
    /// Projects a dynamically shaped set (e.g. read from a JSON file).
    pub fn into_serialized(self) -> Result<ProposedSet<SerializedMigration>, StoreError> {
        let migrations = self
            .migrations
            .iter()
            .map(SerializedMigration::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProposedSet::new(migrations, self.last_run))
    }
}

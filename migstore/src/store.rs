//! Migration-runner store backed by a key-value table.
//!
//! `MigrationStore` exposes the two operations a migration runner needs:
//! - `load` - read every recorded migration plus the last-run timestamp
//! - `save` - reconcile a proposed set against the table and write the deltas
//!
//! # Example
//! ```ignore
//! let config = StoreConfig::from_env()?;
//! let store = MigrationStore::from_config(&config).await?;
//!
//! let state = store.load().await?;
//! let saved = store.save(&ProposedSet::new(migrations, state.last_run)).await?;
//! ```

use futures::future::{join, join_all};
use log::info;

use crate::{
    config::StoreConfig,
    errors::StoreError,
    reconcile::{
        ReconcilePlan, compute_last_run, parse_created_at, serialize_migrations, sort_by_timestamp,
    },
    record::{Migration, MigrationRecord, MigrationSet, ProposedSet, SerializedMigration},
    table::{RedisTable, TableService},
};

/// Persists migration-runner state into one table of a [`TableService`].
///
/// Holds no state between calls besides the table handle: every operation
/// re-reads the table.
pub struct MigrationStore<T> {
    table: T,
    table_name: String,
}

impl MigrationStore<RedisTable> {
    /// Connects a Redis-backed store using the resolved configuration.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let table = RedisTable::connect(config.connection_url(), config.region.clone()).await?;
        Ok(Self::new(table, config.table_name.clone()))
    }
}

impl<T: TableService> MigrationStore<T> {
    pub fn new(table: T, table_name: impl Into<String>) -> Self {
        Self {
            table,
            table_name: table_name.into(),
        }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Reads every recorded migration, oldest run first.
    pub async fn load(&self) -> Result<MigrationSet, StoreError> {
        let mut migrations = self.list_migrations().await?;
        sort_by_timestamp(&mut migrations);
        let last_run = compute_last_run(&migrations);
        Ok(MigrationSet { migrations, last_run })
    }

    /// Reconciles `set` against the table and writes only what changed.
    ///
    /// Creates and updates are issued concurrently and every one of them is
    /// driven to completion, even after another has failed. The first failure
    /// in issue order (creates, then updates) is returned as-is; writes that
    /// landed are not rolled back. The returned `last_run` is the one passed in.
    pub async fn save<M: Migration>(
        &self,
        set: &ProposedSet<M>,
    ) -> Result<MigrationSet, StoreError> {
        let mut existing = self.list_migrations().await?;
        sort_by_timestamp(&mut existing);

        let proposed = serialize_migrations(&set.migrations);
        let plan = ReconcilePlan::build(existing, &proposed);

        let creates = join_all(plan.to_create.iter().map(|m| self.create_migration(m)));
        let updates = join_all(plan.to_update.iter().map(|r| self.update_migration(r)));
        let (created, updated) = join(creates, updates).await;

        let written = created
            .into_iter()
            .chain(updated)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MigrationSet {
            migrations: plan.merge(written),
            last_run: set.last_run,
        })
    }

    async fn list_migrations(&self) -> Result<Vec<MigrationRecord>, StoreError> {
        let output = self.table.list(&self.table_name).await?;
        if output.items.is_empty() {
            info!(
                "Cannot read migrations from table `{}`. \
                 If this is the first time you run migrations, then this is normal.",
                self.table_name
            );
            return Ok(Vec::new());
        }
        output.items.into_iter().map(MigrationRecord::from_item).collect()
    }

    async fn create_migration(
        &self,
        migration: &SerializedMigration,
    ) -> Result<MigrationRecord, StoreError> {
        let record = MigrationRecord {
            id: None,
            title: migration.title.clone(),
            description: migration.description.clone(),
            timestamp: migration.timestamp,
            created_at: parse_created_at(&migration.title),
        };
        let stored = self.table.create(&self.table_name, record.to_item()?).await?;
        MigrationRecord::from_item(stored)
    }

    async fn update_migration(
        &self,
        record: &MigrationRecord,
    ) -> Result<MigrationRecord, StoreError> {
        let stored = self.table.update(&self.table_name, record.to_item()?).await?;
        MigrationRecord::from_item(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MemoryTable;
    use serde_json::{Value, json};

    const TABLE: &str = "datamigrations";

    fn store_with(rows: Vec<Value>) -> MigrationStore<MemoryTable> {
        let table = MemoryTable::new();
        table.seed(TABLE, rows).unwrap();
        MigrationStore::new(table, TABLE)
    }

    fn proposed(
        items: &[(&str, Option<i64>)],
        last_run: Option<i64>,
    ) -> ProposedSet<SerializedMigration> {
        let migrations = items
            .iter()
            .map(|(title, timestamp)| SerializedMigration::new(*title, "", *timestamp))
            .collect();
        ProposedSet::new(migrations, last_run)
    }

    #[tokio::test]
    async fn load_of_empty_table_is_empty_set() {
        let store = store_with(Vec::new());
        let set = store.load().await.unwrap();
        assert_eq!(set, MigrationSet { migrations: Vec::new(), last_run: None });
        assert_eq!(store.table().calls().list, 1);
    }

    #[tokio::test]
    async fn load_sorts_ascending_and_reports_last_run() {
        let store = store_with(vec![
            json!({"id": "b", "title": "2_b", "timestamp": 20}),
            json!({"id": "a", "title": "1_a", "timestamp": 10}),
            json!({"id": "c", "title": "3_c", "timestamp": 15}),
        ]);
        let set = store.load().await.unwrap();

        let titles: Vec<&str> = set.migrations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["1_a", "3_c", "2_b"]);
        assert_eq!(set.last_run, Some(20));
    }

    #[tokio::test]
    async fn load_places_pending_rows_first_and_ignores_them_for_last_run() {
        let store = store_with(vec![
            json!({"id": "a", "title": "1_a", "timestamp": 10}),
            json!({"id": "b", "title": "2_b", "timestamp": null}),
        ]);
        let set = store.load().await.unwrap();

        let titles: Vec<&str> = set.migrations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["2_b", "1_a"]);
        assert_eq!(set.last_run, Some(10));
    }

    #[tokio::test]
    async fn load_propagates_read_failure() {
        let store = store_with(Vec::new());
        store.table().fail_lists("scan refused");
        let err = store.load().await.unwrap_err();
        assert_eq!(err.to_string(), "backend error: scan refused");
    }

    #[tokio::test]
    async fn save_creates_only_unknown_titles() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1})]);

        let saved = store
            .save(&proposed(&[("1_a", Some(1)), ("2_b", Some(2))], Some(2)))
            .await
            .unwrap();

        let calls = store.table().calls();
        assert_eq!(calls.create, 1);
        assert_eq!(calls.update, 0);
        assert_eq!(saved.last_run, Some(2));
        let titles: Vec<&str> = saved.migrations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["1_a", "2_b"]);

        let created = &saved.migrations[1];
        assert!(created.id.is_some());
        assert_eq!(created.created_at, Some(2));
    }

    #[tokio::test]
    async fn save_updates_changed_timestamp_by_id() {
        let store =
            store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1, "createdAt": 1})]);

        let saved = store.save(&proposed(&[("1_a", Some(9))], None)).await.unwrap();

        let calls = store.table().calls();
        assert_eq!(calls.create, 0);
        assert_eq!(calls.update, 1);
        assert_eq!(saved.migrations.len(), 1);
        assert_eq!(saved.migrations[0].id.as_deref(), Some("x"));
        assert_eq!(saved.migrations[0].timestamp, Some(9));
        assert_eq!(saved.migrations[0].created_at, Some(1));
        assert_eq!(saved.last_run, None);

        let row = &store.table().rows(TABLE)[0];
        assert_eq!(row["timestamp"], 9);
        assert_eq!(row["createdAt"], 1);
    }

    #[tokio::test]
    async fn save_without_changes_issues_no_writes() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1})]);
        let saved = store.save(&proposed(&[("1_a", Some(1))], Some(1))).await.unwrap();

        let calls = store.table().calls();
        assert_eq!((calls.create, calls.update), (0, 0));
        assert_eq!(saved.migrations.len(), 1);
    }

    #[tokio::test]
    async fn save_rereads_table_every_call() {
        let store = store_with(Vec::new());
        store.load().await.unwrap();
        store.save(&proposed(&[("1_a", Some(1))], None)).await.unwrap();
        store.save(&proposed(&[("1_a", Some(1))], None)).await.unwrap();

        let calls = store.table().calls();
        assert_eq!(calls.list, 3);
        assert_eq!(calls.create, 1);
    }

    #[tokio::test]
    async fn save_excludes_rows_outside_proposed_set_from_result() {
        let store = store_with(vec![
            json!({"id": "x", "title": "1_a", "timestamp": 1}),
            json!({"id": "y", "title": "2_b", "timestamp": 2}),
        ]);
        let saved = store.save(&proposed(&[("2_b", Some(2))], None)).await.unwrap();

        let titles: Vec<&str> = saved.migrations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["2_b"]);
        assert_eq!(store.table().rows(TABLE).len(), 2);
    }

    #[tokio::test]
    async fn save_propagates_first_write_failure_without_rollback() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1})]);
        store.table().fail_writes_for("2_b", "throttled");

        let err = store
            .save(&proposed(&[("2_b", Some(2)), ("3_c", Some(3)), ("1_a", Some(9))], None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error: throttled");

        // The failed create does not stop the writes issued alongside it.
        let calls = store.table().calls();
        assert_eq!((calls.create, calls.update), (2, 1));

        let rows = store.table().rows(TABLE);
        assert!(!rows.iter().any(|row| row["title"] == "2_b"));
        assert!(rows.iter().any(|row| row["title"] == "3_c"));
        let updated = rows.iter().find(|row| row["id"] == "x").unwrap();
        assert_eq!(updated["timestamp"], 9);
    }

    #[tokio::test]
    async fn save_reports_first_failure_in_issue_order() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1})]);
        store.table().fail_writes_for("1_a", "update refused");
        store.table().fail_writes_for("3_c", "create refused");

        let err = store
            .save(&proposed(&[("1_a", Some(9)), ("3_c", Some(3))], None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error: create refused");
    }

    #[tokio::test]
    async fn save_creates_pending_migration_with_null_timestamp() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": 1})]);

        let saved = store
            .save(&proposed(&[("1_a", Some(1)), ("2_b", None)], Some(1)))
            .await
            .unwrap();

        assert_eq!(store.table().calls().create, 1);
        let created = &saved.migrations[1];
        assert_eq!(created.title, "2_b");
        assert_eq!(created.timestamp, None);
        assert_eq!(created.created_at, Some(2));

        let rows = store.table().rows(TABLE);
        let row = rows.iter().find(|row| row["title"] == "2_b").unwrap();
        assert_eq!(row["timestamp"], Value::Null);
    }

    #[tokio::test]
    async fn save_updates_pending_row_once_it_has_run() {
        let store = store_with(vec![json!({"id": "x", "title": "1_a", "timestamp": null})]);

        let saved = store.save(&proposed(&[("1_a", Some(4))], Some(4))).await.unwrap();

        let calls = store.table().calls();
        assert_eq!((calls.create, calls.update), (0, 1));
        assert_eq!(saved.migrations[0].timestamp, Some(4));
        assert_eq!(store.table().rows(TABLE)[0]["timestamp"], 4);
    }

    #[tokio::test]
    async fn save_rejects_malformed_stored_rows() {
        let store = store_with(vec![json!({"id": "x", "timestamp": "soon"})]);
        let err = store.save(&proposed(&[("1_a", Some(1))], None)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord { .. }));
    }
}

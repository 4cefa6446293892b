//! migstore core library.
//!
//! Persists migration-runner state (which migrations ran, and when) into a
//! key-value table, writing only the rows that changed on each save.

pub mod bulk;
pub mod config;
pub mod errors;
pub mod id;
pub mod keys;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod table;

pub use bulk::{BulkRecord, DEFAULT_CHUNK_SIZE, batch_write};
pub use config::StoreConfig;
pub use errors::*;
pub use record::{Migration, MigrationRecord, MigrationSet, ProposedSet, SerializedMigration};
pub use store::MigrationStore;
pub use table::{MemoryTable, RedisTable, TableService};

// Re-export redis so callers can build a `RedisTable` from their own connection.
pub use redis;
pub use redis::aio::ConnectionManager;

/// Delete every row of `table` under `namespace` (for test cleanup).
///
/// This performs a SCAN + DEL operation to safely delete keys without blocking Redis.
pub async fn cleanup_table(
    conn: &mut ConnectionManager,
    namespace: &str,
    table: &str,
) -> Result<u64, StoreError> {
    const SCAN_COUNT: usize = 1000;
    let pattern = keys::KeyContext::try_new(namespace, table)?.table_pattern();
    let mut cursor: u64 = 0;
    let mut total_deleted: u64 = 0;

    loop {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(conn)
            .await?;

        if !keys.is_empty() {
            let deleted: u64 = redis::cmd("DEL").arg(&keys).query_async(conn).await?;
            total_deleted += deleted;
        }

        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }

    Ok(total_deleted)
}

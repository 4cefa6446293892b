//! Pure reconciliation of stored migration rows against a proposed set.
//!
//! Nothing in here performs I/O. The store lists rows, hands them to
//! [`ReconcilePlan::build`], writes the resulting deltas and folds the write
//! results back in with [`ReconcilePlan::merge`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::{Migration, MigrationRecord, SerializedMigration};

static LEADING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+").expect("static regex is valid"));

/// Projects caller migrations down to `{title, description, timestamp}`.
pub fn serialize_migrations<M: Migration>(migrations: &[M]) -> Vec<SerializedMigration> {
    migrations.iter().map(SerializedMigration::from_migration).collect()
}

/// Keeps the existing rows whose title appears in `proposed`, in their original order.
pub fn restrict_to_proposed(
    existing: Vec<MigrationRecord>,
    proposed: &[SerializedMigration],
) -> Vec<MigrationRecord> {
    let titles = proposed_timestamps(proposed);
    existing
        .into_iter()
        .filter(|record| titles.contains_key(record.title.as_str()))
        .collect()
}

/// Existing rows whose proposed counterpart carries a different timestamp,
/// copied with the proposed timestamp. One output per matching input row.
/// A pending (`None`) timestamp differs from every concrete one.
pub fn diff_for_update(
    existing: &[MigrationRecord],
    proposed: &[SerializedMigration],
) -> Vec<MigrationRecord> {
    let proposed = proposed_timestamps(proposed);
    existing
        .iter()
        .filter_map(|record| {
            let timestamp = *proposed.get(record.title.as_str())?;
            (timestamp != record.timestamp).then(|| MigrationRecord {
                timestamp,
                ..record.clone()
            })
        })
        .collect()
}

/// Proposed migrations whose title appears nowhere in `existing`.
pub fn diff_for_create(
    existing: &[MigrationRecord],
    proposed: &[SerializedMigration],
) -> Vec<SerializedMigration> {
    proposed
        .iter()
        .filter(|migration| !existing.iter().any(|record| record.title == migration.title))
        .cloned()
        .collect()
}

/// Row holding the greatest timestamp. On ties the first one encountered wins.
/// Rows that have not run yet are skipped.
pub fn last_run_record(records: &[MigrationRecord]) -> Option<&MigrationRecord> {
    records
        .iter()
        .filter(|record| record.timestamp.is_some())
        .fold(None, |best: Option<&MigrationRecord>, record| match best {
            Some(current) if current.timestamp >= record.timestamp => Some(current),
            _ => Some(record),
        })
}

/// Timestamp of the most recently run migration, `None` when nothing has run.
pub fn compute_last_run(records: &[MigrationRecord]) -> Option<i64> {
    last_run_record(records).and_then(|record| record.timestamp)
}

/// Stable ascending sort, so the most recently run migration ends up last.
/// Pending rows sort first.
pub fn sort_by_timestamp(records: &mut [MigrationRecord]) {
    records.sort_by_key(|record| record.timestamp);
}

/// Parses the leading digit run of a migration title (`"20240101_init"` -> `20240101`).
pub fn parse_created_at(title: &str) -> Option<i64> {
    LEADING_DIGITS.find(title)?.as_str().parse().ok()
}

/// Outcome of diffing one proposed set against the stored rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Stored rows restricted to the titles present in the proposed set.
    pub existing: Vec<MigrationRecord>,
    pub to_update: Vec<MigrationRecord>,
    pub to_create: Vec<SerializedMigration>,
}

impl ReconcilePlan {
    pub fn build(existing: Vec<MigrationRecord>, proposed: &[SerializedMigration]) -> Self {
        let existing = restrict_to_proposed(existing, proposed);
        let to_update = diff_for_update(&existing, proposed);
        let to_create = diff_for_create(&existing, proposed);
        Self {
            existing,
            to_update,
            to_create,
        }
    }

    /// Rows that need no write: title and timestamp both match.
    pub fn unchanged(&self) -> impl Iterator<Item = &MigrationRecord> {
        self.existing
            .iter()
            .filter(|record| !self.to_update.iter().any(|updated| same_row(record, updated)))
    }

    pub fn has_writes(&self) -> bool {
        !self.to_update.is_empty() || !self.to_create.is_empty()
    }

    /// Rows not superseded by an update, followed by every write result.
    pub fn merge(&self, written: Vec<MigrationRecord>) -> Vec<MigrationRecord> {
        let mut merged: Vec<MigrationRecord> = self.unchanged().cloned().collect();
        merged.extend(written);
        merged
    }
}

/// Rows match by identifier; rows without one fall back to their unique title.
fn same_row(a: &MigrationRecord, b: &MigrationRecord) -> bool {
    match (&a.id, &b.id) {
        (Some(left), Some(right)) => left == right,
        _ => a.title == b.title,
    }
}

/// Title -> timestamp, keeping the first proposed entry for a repeated title.
fn proposed_timestamps(proposed: &[SerializedMigration]) -> HashMap<&str, Option<i64>> {
    let mut map = HashMap::with_capacity(proposed.len());
    for migration in proposed {
        map.entry(migration.title.as_str()).or_insert(migration.timestamp);
    }
    map
}

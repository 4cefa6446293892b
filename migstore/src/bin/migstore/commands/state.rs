use std::path::Path;

use anyhow::{Context, Result};
use migstore::{MigrationStore, ProposedSet};
use serde_json::Value;

use super::{StoreArgs, read_json};
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const LOAD_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Inspect State",
    commands: &[
        "migstore load                          # Show recorded migrations",
        "migstore load --output json            # Machine-readable state",
        "migstore load --region eu-west-1       # Read another region's table",
    ],
}];

pub const SAVE_EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Record State",
    commands: &[
        "migstore save --file .migrate.json     # Reconcile a runner's state file",
        "migstore save --file state.json -q     # Save without output",
    ],
}];

pub async fn handle_load(args: &StoreArgs, output: &OutputManager) -> Result<()> {
    let config = args.resolve()?;
    output.progress(&format!("Reading table {}", config.table_name));
    let store = MigrationStore::from_config(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.connection_url()))?;
    let state = store.load().await.context("Failed to load migrations")?;
    output.clear_line();

    output.heading(&format!("Migrations in {}", config.table_name));
    output.display(&state)?;
    match state.last_run {
        Some(last_run) => output.key_value("lastRun", &last_run.to_string()),
        None => output.info("No migrations have run yet"),
    }
    Ok(())
}

pub async fn handle_save(args: &StoreArgs, file: &Path, output: &OutputManager) -> Result<()> {
    let config = args.resolve()?;
    let set: ProposedSet<Value> = read_json(file).await?;
    let set = set
        .into_serialized()
        .with_context(|| format!("Invalid migration set in {}", file.display()))?;

    if set.migrations.is_empty() {
        output.warning("Migration set is empty; nothing to reconcile");
    }

    output.progress(&format!("Reconciling {} migration(s)", set.migrations.len()));
    let store = MigrationStore::from_config(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.connection_url()))?;
    let saved = store.save(&set).await.context("Failed to save migrations")?;
    output.clear_line();

    output.success(&format!(
        "Saved {} migration(s) to {}",
        saved.migrations.len(),
        config.table_name
    ));
    output.display(&saved)?;
    Ok(())
}

pub fn handle_config(args: &StoreArgs, output: &OutputManager) -> Result<()> {
    let config = args.resolve()?;
    output.heading("Resolved configuration");
    output.display(&config)
}

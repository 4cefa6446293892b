use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use migstore::{BulkRecord, RedisTable, batch_write, table::BatchWriteOutput};
use serde::Serialize;

use super::{StoreArgs, read_json};
use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, add_table_header, create_table};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Bulk Seeding",
    commands: &[
        "migstore seed --file rows.json                 # Write [{table, data}] rows",
        "migstore seed --file rows.json --chunk-size 10 # Smaller batches",
    ],
}];

/// Rows written per table across all chunks.
#[derive(Debug, Default, Serialize)]
pub struct SeedSummary {
    pub chunks: usize,
    pub tables: Vec<(String, usize)>,
}

impl SeedSummary {
    pub fn from_outputs(outputs: &[BatchWriteOutput]) -> Self {
        let mut tables: Vec<(String, usize)> = Vec::new();
        for summary in outputs.iter().flat_map(|output| &output.tables) {
            match tables.iter_mut().find(|(table, _)| *table == summary.table) {
                Some((_, count)) => *count += summary.ids.len(),
                None => tables.push((summary.table.clone(), summary.ids.len())),
            }
        }
        Self {
            chunks: outputs.len(),
            tables,
        }
    }

    pub fn total(&self) -> usize {
        self.tables.iter().map(|(_, count)| count).sum()
    }
}

impl TableDisplay for SeedSummary {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = create_table(options);
        add_table_header(options, &mut table, &["Table", "Rows"]);
        for (name, count) in &self.tables {
            table.add_row(vec![Cell::new(name), Cell::new(count)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!("chunks={} rows={}", self.chunks, self.total())
    }
}

pub async fn handle_seed(
    args: &StoreArgs,
    file: &Path,
    chunk_size: usize,
    output: &OutputManager,
) -> Result<()> {
    let config = args.resolve()?;
    let records: Vec<BulkRecord> = read_json(file).await?;

    if records.is_empty() {
        output.warning("No rows to seed");
        return Ok(());
    }

    let table = RedisTable::connect(config.connection_url(), config.region.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", config.connection_url()))?;

    output.progress(&format!("Writing {} row(s)", records.len()));
    let outputs = batch_write(&table, &records, chunk_size)
        .await
        .context("Bulk write failed")?;
    output.clear_line();

    let summary = SeedSummary::from_outputs(&outputs);
    output.success(&format!("Wrote {} row(s) in {} chunk(s)", summary.total(), summary.chunks));
    output.display(&summary)
}

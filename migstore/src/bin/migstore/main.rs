mod commands;
mod examples;
mod output;
mod theme;

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{
    ColorChoice, Command, CommandFactory, FromArgMatches, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Color as ClapColor, Style},
    },
};
use colored::{Color as ThemeColor, Colorize, control::ShouldColorize};

use commands::{StoreArgs, seed::handle_seed, state};
use examples::{ExampleGroup, command_examples};
use migstore::DEFAULT_CHUNK_SIZE;
use migstore::config::{ENDPOINT_ENV, REGION_ENV, TABLE_NAME_ENV};
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{ICONS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    (TABLE_NAME_ENV, "Table holding migration state (default: datamigrations)"),
    (REGION_ENV, "Region namespace for table keys (default: us-east-1)"),
    (ENDPOINT_ENV, "Endpoint override for local development instances"),
    ("RUST_LOG", "Log filter (default: migstore=info)"),
];

#[derive(Parser)]
#[command(name = "migstore")]
#[command(version)]
#[command(
    about = "Migration-runner state stored in a key-value table",
    long_about = r#"Reads and records migration-runner state in a key-value table.

Commands:
  load      Show recorded migrations and the last-run timestamp
  save      Reconcile a migration set against the table
  seed      Bulk-write rows in fixed-size chunks
  config    Show the resolved configuration
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show recorded migrations
    Load,

    /// Reconcile a migration set file against the table
    Save {
        /// JSON file of the form {"migrations": [...], "lastRun": n}
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Bulk-write [{table, data}] rows in sequential chunks
    Seed {
        /// JSON array of {"table": ..., "data": {...}} entries
        #[arg(short, long)]
        file: PathBuf,

        /// Rows per batch request
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Show the resolved configuration
    Config,
}

fn build_cli_command() -> Command {
    let use_color = ShouldColorize::from_env().should_colorize();
    let mut command = Cli::command()
        .after_long_help(render_environment(use_color))
        .color(if use_color { ColorChoice::Auto } else { ColorChoice::Never })
        .styles(help_styles());

    for example in command_examples() {
        if let Some(subcommand) = command.find_subcommand_mut(example.name) {
            *subcommand = subcommand
                .clone()
                .after_long_help(render_examples(example.groups, use_color));
        }
    }
    command
}

fn render_examples(groups: &[ExampleGroup], use_color: bool) -> String {
    let mut buffer = String::new();
    let _ = writeln!(buffer, "{}", stylize("Examples:", THEME.highlight, true, use_color));

    for (index, group) in groups.iter().enumerate() {
        let _ = writeln!(buffer, "  {}", stylize(group.title, THEME.primary, true, use_color));
        for command in group.commands {
            let arrow = stylize(ICONS.arrow, THEME.secondary, false, use_color);
            let command = stylize(command, THEME.secondary, false, use_color);
            let _ = writeln!(buffer, "    {arrow} {command}");
        }
        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }

    buffer
}

fn render_environment(use_color: bool) -> String {
    let mut buffer = String::new();
    let heading = stylize("Environment Variables:", THEME.highlight, true, use_color);
    let _ = writeln!(buffer, "{heading}");
    for (key, description) in ENVIRONMENT_VARIABLES {
        let key_text = stylize(key, THEME.key, true, use_color);
        let value_text = stylize(description, THEME.value, false, use_color);
        let _ = writeln!(buffer, "  {key_text}  {value_text}");
    }
    buffer
}

fn stylize(text: &str, color: ThemeColor, bold: bool, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let styled = text.color(color);
    if bold { styled.bold().to_string() } else { styled.to_string() }
}

fn help_styles() -> Styles {
    Styles::styled()
        .usage(Style::new().fg_color(Some(ClapColor::Ansi(AnsiColor::BrightBlue))).bold())
        .header(Style::new().fg_color(Some(ClapColor::Ansi(AnsiColor::Cyan))).bold())
        .literal(Style::new().fg_color(Some(ClapColor::Ansi(AnsiColor::Magenta))))
        .placeholder(Style::new().fg_color(Some(ClapColor::Ansi(AnsiColor::BrightBlack))))
        .error(Style::new().fg_color(Some(ClapColor::Ansi(AnsiColor::Red))).bold())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("migstore=info"))
        .init();

    let matches = build_cli_command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    if execute(cli).await.is_err() {
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        no_color: cli.no_color,
    });

    let result = match cli.command {
        Commands::Load => state::handle_load(&cli.store, &output).await,
        Commands::Save { file } => state::handle_save(&cli.store, &file, &output).await,
        Commands::Seed { file, chunk_size } => {
            handle_seed(&cli.store, &file, chunk_size, &output).await
        }
        Commands::Config => state::handle_config(&cli.store, &output),
    };

    if let Err(err) = &result {
        output.error(&format!("Error: {err:#}"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_seed_with_default_chunk_size() {
        let cli = Cli::try_parse_from(["migstore", "seed", "--file", "rows.json"]).unwrap();
        match cli.command {
            Commands::Seed { chunk_size, .. } => assert_eq!(chunk_size, DEFAULT_CHUNK_SIZE),
            _ => panic!("expected seed command"),
        }
    }

    #[test]
    fn global_store_flags_apply_after_subcommand() {
        let args = ["migstore", "load", "--table", "other", "--output", "json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.store.table.as_deref(), Some("other"));
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn examples_render_without_color() {
        let rendered = render_examples(state::LOAD_EXAMPLES, false);
        assert!(rendered.starts_with("Examples:"));
        assert!(rendered.contains("migstore load"));
    }
}

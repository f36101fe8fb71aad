//! Daybook CLI - a local diary backed by an SQLite object store

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(version)]
#[command(about = "Local diary with JSON and SQLite snapshots")]
#[command(long_about = r#"
Daybook keeps dated diary records in a local database and can move the
whole database in and out of portable snapshot files.

Example usage:
  daybook init
  daybook add --date 2024-01-01 --title "New year"
  daybook list --date 2024-01-01
  daybook export --format sqlite
  daybook import daybook_2024-01-01T000000000Z.db --clear
"#)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = "daybook.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Add a record
    Add {
        /// Date of the record (defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Position of the record within its date (defaults to the end)
        #[arg(short, long)]
        index: Option<i64>,

        #[arg(short, long)]
        title: Option<String>,

        /// Record content (markdown)
        #[arg(short, long)]
        body: Option<String>,
    },

    /// List the records of one date
    List {
        /// Date to list (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
    },

    /// Show one record
    Show { uid: i64 },

    /// Change the title or content of a record
    Edit {
        uid: i64,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        body: Option<String>,
    },

    /// Delete a record
    Delete { uid: i64 },

    /// Export the whole database as a snapshot file
    Export {
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Sqlite)]
        format: ExportFormat,

        /// Output directory (defaults to the configured export_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a snapshot file (.db/.sqlite/.sqlite3 or JSON)
    Import {
        file: PathBuf,

        /// Empty each store before importing
        #[arg(long)]
        clear: bool,

        /// Abort on the first failed record
        #[arg(long)]
        strict: bool,
    },

    /// Show database statistics
    Stats,

    /// Delete the whole database
    Drop {
        /// Required to actually delete
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Sqlite,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode == OutputMode::Json {
        let envelope = serde_json::json!({
            "status": "ok",
            "command": command,
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(())
}

fn emit_error(output_mode: OutputMode, command: &str, err: &anyhow::Error) {
    match output_mode {
        OutputMode::Json => {
            let envelope = serde_json::json!({
                "status": "error",
                "command": command,
                "data": { "message": format!("{:#}", err) },
            });
            println!("{}", envelope);
        }
        OutputMode::Human => daybook::ui::error(&format!("{:#}", err)),
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Add { .. } => "add",
            Commands::List { .. } => "list",
            Commands::Show { .. } => "show",
            Commands::Edit { .. } => "edit",
            Commands::Delete { .. } => "delete",
            Commands::Export { .. } => "export",
            Commands::Import { .. } => "import",
            Commands::Stats => "stats",
            Commands::Drop { .. } => "drop",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };
    let name = cli.command.name();

    let result = match cli.command {
        Commands::Init { force } => commands::run_init(&cli.config, force, output_mode),
        Commands::Add { date, index, title, body } => {
            commands::run_add(&cli.config, date, index, title, body, output_mode).await
        }
        Commands::List { date } => commands::run_list(&cli.config, date, output_mode).await,
        Commands::Show { uid } => commands::run_show(&cli.config, uid, output_mode).await,
        Commands::Edit { uid, title, body } => commands::run_edit(&cli.config, uid, title, body, output_mode).await,
        Commands::Delete { uid } => commands::run_delete(&cli.config, uid, output_mode).await,
        Commands::Export { format, out } => commands::run_export(&cli.config, format, out, output_mode).await,
        Commands::Import { file, clear, strict } => {
            commands::run_import(&cli.config, &file, clear, strict, output_mode).await
        }
        Commands::Stats => commands::run_stats(&cli.config, output_mode).await,
        Commands::Drop { yes } => commands::run_drop(&cli.config, yes, output_mode).await,
    };

    if let Err(err) = result {
        emit_error(output_mode, name, &err);
        std::process::exit(1);
    }
    Ok(())
}

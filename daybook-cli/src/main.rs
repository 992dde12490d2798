mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use daybook_core::{JsonStore, LinkRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daybook")]
#[command(about = "Local-first events and tasks, synced to your calendar providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a task or event
    Add {
        title: String,

        /// Start date/time (e.g., "2026-03-20T15:00" or "2026-03-20")
        #[arg(short, long)]
        start: Option<String>,

        /// End date/time
        #[arg(short, long)]
        end: Option<String>,

        /// Create an event instead of a task
        #[arg(long)]
        event: bool,

        #[arg(short, long)]
        notes: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        location: Option<String>,

        /// Priority: none, low, medium, high
        #[arg(short, long)]
        priority: Option<String>,

        /// Reminder lead time in minutes
        #[arg(short, long)]
        reminder: Option<i64>,

        /// Keep this record out of provider sync
        #[arg(long)]
        local_only: bool,
    },
    /// List records
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Mark a task as completed (by id prefix)
    Complete { id: String },
    /// Delete a record (by id prefix)
    Delete { id: String },
    /// Run sync passes for enabled provider links
    Sync {
        /// Only sync this link
        #[arg(short, long)]
        link: Option<String>,
    },
    /// Manage provider links
    Links {
        #[command(subcommand)]
        command: commands::links::LinksCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Add {
            title,
            start,
            end,
            event,
            notes,
            category,
            location,
            priority,
            reminder,
            local_only,
        } => commands::add::run(commands::add::AddArgs {
            title,
            start,
            end,
            event,
            notes,
            category,
            location,
            priority,
            reminder,
            local_only,
        }),
        Commands::List { all } => commands::list::run(all),
        Commands::Complete { id } => commands::complete::run(&id),
        Commands::Delete { id } => commands::delete::run(&id),
        Commands::Sync { link } => commands::sync::run(link.as_deref()).await,
        Commands::Links { command } => commands::links::run(command),
    }
}

/// Open the record store at its default location.
fn open_store() -> Result<JsonStore> {
    let path = JsonStore::default_path()?;
    Ok(JsonStore::open(path)?)
}

/// Load the link registry from its default location.
fn load_registry() -> Result<LinkRegistry> {
    let path = LinkRegistry::default_path()?;
    Ok(LinkRegistry::load(path)?)
}

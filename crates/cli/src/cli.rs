use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "synq")]
#[command(about = "Drive the synq data-synchronization engine against a REST backend")]
#[command(version)]
pub struct Cli {
    /// Override the configured base URL
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scroll through a collection, loading pages as the window reaches the end
    List {
        /// Resource to list (e.g. communities, events)
        resource: String,

        /// Keyword filter
        #[arg(long, short)]
        keyword: Option<String>,

        /// Extra filter as NAME=VALUE; repeatable
        #[arg(long = "filter", short, value_name = "NAME=VALUE", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Items per page (defaults to the configured page size)
        #[arg(long)]
        size: Option<u32>,

        /// Stop after this many items
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Viewport height, in rows
        #[arg(long, default_value_t = 20)]
        viewport: u64,
    },
    /// Type a query one keystroke at a time and print the final hits
    Search {
        /// Search storage (e.g. market)
        storage: String,

        /// Text to type
        text: String,

        /// Delay between keystrokes in milliseconds
        #[arg(long, default_value_t = 80)]
        keystroke_ms: u64,
    },
    /// Send a write and invalidate the resource's cached queries
    Mutate {
        #[arg(value_enum)]
        method: MethodArg,

        resource: String,

        /// Entity id
        #[arg(long)]
        id: Option<String>,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Manage persisted preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MethodArg {
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Print a stored value
    Get { key: String },
    /// Store a JSON value (bare words are stored as strings)
    Set { key: String, value: String },
    /// Remove a stored value
    Remove { key: String },
    /// List stored keys
    List,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

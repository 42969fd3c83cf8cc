//! ECL CLI
//!
//! Command-line tools for inspecting an external changelog loaded from a
//! JSON dump of replicated changes.
//!
//! # Commands
//!
//! - `search` - Run a changelog search and print the returned entries
//! - `cookie` - Print the newest cookie
//! - `info` - Display the change-number range and newest cookie

mod commands;
mod dump;

use clap::{Parser, Subcommand};
use commands::search::{OutputFormat, Scope, SearchOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// External changelog command-line tools.
#[derive(Parser)]
#[command(name = "ecl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON dump of changes
    #[arg(global = true, short, long)]
    input: Option<PathBuf>,

    /// Domain to hide from the changelog (repeatable)
    #[arg(global = true, long)]
    exclude: Vec<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the changelog
    Search {
        /// Search base
        #[arg(short, long, default_value = "cn=changelog")]
        base: String,

        /// Search scope
        #[arg(short, long, value_enum, default_value = "sub")]
        scope: Scope,

        /// LDAP filter
        #[arg(short, long, default_value = "(objectclass=*)")]
        filter: String,

        /// Resume from this cookie (cookie mode; "" starts from the oldest change)
        #[arg(short, long)]
        cookie: Option<String>,

        /// Maximum number of entries to return
        #[arg(short = 'l', long)]
        size_limit: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value = "ldif")]
        format: OutputFormat,
    },

    /// Print the newest cookie
    Cookie,

    /// Display the change-number range and newest cookie
    Info {
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Search {
            base,
            scope,
            filter,
            cookie,
            size_limit,
            format,
        } => {
            let input = cli.input.ok_or("Input dump required for search")?;
            let options = SearchOptions {
                base,
                scope,
                filter,
                cookie,
                size_limit,
                exclude: cli.exclude,
                format,
            };
            print!("{}", commands::search::run(&input, &options)?);
        }
        Commands::Cookie => {
            let input = cli.input.ok_or("Input dump required for cookie")?;
            println!("{}", commands::cookie::run(&input, &cli.exclude)?);
        }
        Commands::Info { format } => {
            let input = cli.input.ok_or("Input dump required for info")?;
            println!(
                "{}",
                commands::info::run(&input, &cli.exclude, format == "json")?
            );
        }
        Commands::Version => {
            println!("ECL CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

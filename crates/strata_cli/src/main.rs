//! Strata CLI
//!
//! Command-line tools for strata columnar files.
//!
//! # Commands
//!
//! - `read` - Run a JSON query and print the response payload
//! - `write` - Write a file from a JSON document of rows
//! - `combine` - Merge partial files of one schema
//! - `inspect` - Display a file's header
//!
//! Logs go to stderr so the payload on stdout stays clean.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Strata columnar file tools.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the response payload
    Read {
        /// Query request as JSON, `@path` to read it from a file, or `-` for stdin
        workload: String,

        /// Print per-stage timings to stderr
        #[arg(long)]
        profile: bool,
    },

    /// Write a file from a JSON document
    Write {
        /// Input document with date, metric, dimensions and rows
        input: PathBuf,

        /// Output file; must not exist yet
        output: PathBuf,
    },

    /// Combine partial files into one
    Combine {
        /// Partition date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// JSON file with the metric and dimension definitions
        #[arg(short, long)]
        schema: PathBuf,

        /// Output file; must not exist yet
        #[arg(short, long)]
        output: PathBuf,

        /// Read the partial files from a zip archive
        #[arg(short, long, conflicts_with = "files")]
        zip: Option<PathBuf>,

        /// Partial files, in merge order
        #[arg(required_unless_present = "zip")]
        files: Vec<PathBuf>,
    },

    /// Display a file's header
    Inspect {
        /// File to inspect
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

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
        Commands::Read { workload, profile } => {
            commands::read::run(&workload, profile)?;
        }
        Commands::Write { input, output } => {
            commands::write::run(&input, &output)?;
        }
        Commands::Combine {
            date,
            schema,
            output,
            zip,
            files,
        } => {
            commands::combine::run(&date, &schema, &output, zip, files)?;
        }
        Commands::Inspect { file, format } => {
            commands::inspect::run(&file, &format)?;
        }
        Commands::Version => {
            println!("strata CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("strata file format v{}", strata_core::LIB_MAJOR_VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_combine_takes_files_or_zip() {
        let cli = Cli::try_parse_from([
            "strata", "combine", "-d", "2024-03-01", "-s", "schema.json", "-o", "out.strata",
            "a.strata", "b.strata",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Combine { ref files, zip: None, .. } if files.len() == 2));

        let cli = Cli::try_parse_from([
            "strata", "combine", "-d", "2024-03-01", "-s", "schema.json", "-o", "out.strata",
            "--zip", "parts.zip",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Combine { zip: Some(_), .. }));

        assert!(Cli::try_parse_from([
            "strata", "combine", "-d", "2024-03-01", "-s", "schema.json", "-o", "out.strata",
        ])
        .is_err());
    }

    #[test]
    fn test_read_profile_flag() {
        let cli = Cli::try_parse_from(["strata", "read", "@query.json", "--profile"]).unwrap();
        assert!(matches!(cli.command, Commands::Read { profile: true, .. }));
    }
}

//! `nsm` command line.
//!
//! - `compress`: build a container from a file or directory
//! - `search`: rank a container's chunks against a query
//! - `extract`: write every chunk back out as text files
//! - `info`: print a container's metadata
//!
//! Exit code 0 on success, 1 on any failure.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "nsm")]
#[command(version)]
#[command(about = "Compressed, searchable snapshots of a document set in one file")]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file; NSM_* environment variables still apply on top.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a container from a file or a directory of text files
    Compress(commands::CompressArgs),
    /// Search a container
    Search(commands::SearchArgs),
    /// Write every chunk of a container to a directory
    Extract(commands::ExtractArgs),
    /// Show container metadata
    Info(commands::InfoArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = commands::load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Compress(args) => commands::compress(args, &config),
        Commands::Search(args) => commands::search(args, &config),
        Commands::Extract(args) => commands::extract(args, &config),
        Commands::Info(args) => commands::info(args),
    });

    if let Err(err) = outcome {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

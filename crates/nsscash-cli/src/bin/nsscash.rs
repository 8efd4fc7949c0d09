//! Command line entry point for the fetch tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use nsscash_cli::config::FileType;

/// Maintain binary account caches for NSS lookups.
#[derive(Debug, Parser)]
#[command(name = "nsscash")]
#[command(about = "Fetch account databases over HTTP and deploy them as binary caches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch all configured files and deploy the ones that changed.
    Fetch {
        /// TOML configuration file.
        config: PathBuf,
    },
    /// Convert a local text database into a binary cache.
    Convert {
        /// Input format.
        #[arg(value_enum)]
        r#type: FileType,
        /// Source text file.
        src: PathBuf,
        /// Destination cache file (created when missing).
        dst: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Fetch { config } => nsscash_cli::fetch_command(&config),
        Command::Convert { r#type, src, dst } => nsscash_cli::convert(r#type, &src, &dst),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("nsscash: {err:#}");
            ExitCode::FAILURE
        }
    }
}

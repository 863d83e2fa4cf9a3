// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod commands;
mod logging;
mod output;

use clap::{error::ErrorKind, ArgAction, Parser, Subcommand};
use datacache_core::{ExitCode, MachineError, ENV_DATACACHE_CONFIG};
use datacache_store::{CacheError, CacheErrorCode};
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

const DATACACHE_HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
Usage: {usage}

Options:
{options}

Commands:
{subcommands}
{after-help}";

#[derive(Parser)]
#[command(name = "datacache", version)]
#[command(about = "Keeps a local directory of open-data files in sync with a remote catalog")]
#[command(help_template = DATACACHE_HELP_TEMPLATE)]
#[command(
    after_help = "Environment:\n  DATACACHE_CONFIG                Configuration file\n  DATACACHE_CACHE_DIR             Cache directory override\n  DATACACHE_QUOTA_BYTES           Quota override\n  DATACACHE_HTTP_TIMEOUT_SECONDS  HTTP timeout override\n  DATACACHE_LOG_LEVEL             Log verbosity override"
)]
struct Cli {
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[arg(long, global = true, default_value_t = false)]
    quiet: bool,
    #[arg(long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[arg(long, global = true, default_value_t = false)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh metadata, evict superseded versions and download updates.
    Sync {
        #[arg(long, env = ENV_DATACACHE_CONFIG)]
        config: PathBuf,
        /// Plan from the stored metadata snapshot without network access.
        #[arg(long, default_value_t = false)]
        local_only: bool,
    },
    /// Show what a sync would download and whether eviction is needed.
    Plan {
        #[arg(long, env = ENV_DATACACHE_CONFIG)]
        config: PathBuf,
        #[arg(long, default_value_t = false)]
        local_only: bool,
    },
    /// List the newest cached version of every file.
    List {
        #[command(flatten)]
        location: CacheLocation,
        /// Include files without an embedded timestamp.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Map a possibly outdated file name to its newest cached version.
    Resolve {
        name: String,
        #[command(flatten)]
        location: CacheLocation,
        #[arg(long, default_value_t = false, conflicts_with = "fallback")]
        keep_name: bool,
        #[arg(long)]
        fallback: Option<String>,
    },
    Version,
}

#[derive(clap::Args, Clone)]
struct CacheLocation {
    #[arg(long, env = ENV_DATACACHE_CONFIG)]
    config: Option<PathBuf>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Clone, Copy)]
pub(crate) struct LogFlags {
    quiet: bool,
    verbose: u8,
    trace: bool,
    json: bool,
}

#[derive(Clone, Copy)]
pub(crate) struct OutputMode {
    json: bool,
}

pub fn main_entry() -> ProcessExitCode {
    let wants_json = std::env::args().any(|arg| arg == "--json");
    match run() {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            emit_error(&err, wants_json);
            ProcessExitCode::from(err.exit_code as u8)
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{err}");
                return Ok(());
            }
            _ => {
                return Err(CliError {
                    exit_code: ExitCode::Usage,
                    machine: MachineError::new("usage_error", "invalid command line arguments")
                        .with_detail("error", &err.to_string()),
                });
            }
        },
    };
    let output_mode = OutputMode { json: cli.json };
    logging::init(LogFlags {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    });

    let command = cli.command.ok_or_else(|| CliError {
        exit_code: ExitCode::Usage,
        machine: MachineError::new("usage_error", "missing command; see --help"),
    })?;

    match command {
        Commands::Sync { config, local_only } => {
            commands::sync(&config, local_only, false, output_mode)
        }
        Commands::Plan { config, local_only } => {
            commands::sync(&config, local_only, true, output_mode)
        }
        Commands::List { location, all } => commands::list(&location, all, output_mode),
        Commands::Resolve {
            name,
            location,
            keep_name,
            fallback,
        } => commands::resolve(&name, &location, keep_name, fallback, output_mode),
        Commands::Version => output::emit_version(output_mode).map_err(CliError::internal),
    }
}

#[derive(Debug)]
pub(crate) struct CliError {
    exit_code: ExitCode,
    machine: MachineError,
}

impl CliError {
    pub(crate) fn internal(message: String) -> Self {
        Self {
            exit_code: ExitCode::Internal,
            machine: MachineError::new("internal_error", &message),
        }
    }
}

impl From<CacheError> for CliError {
    fn from(err: CacheError) -> Self {
        let exit_code = match err.code {
            CacheErrorCode::SpaceExhausted => ExitCode::ResourceExhausted,
            CacheErrorCode::Validation | CacheErrorCode::Configuration | CacheErrorCode::NotFound => {
                ExitCode::Validation
            }
            CacheErrorCode::Network | CacheErrorCode::ChecksumMismatch => {
                ExitCode::DependencyFailure
            }
            _ => ExitCode::Internal,
        };
        Self {
            exit_code,
            machine: MachineError::new(err.code.as_str(), &err.message)
                .with_detail("exit_code", exit_code.as_str()),
        }
    }
}

fn emit_error(error: &CliError, machine_json: bool) {
    if machine_json {
        match serde_json::to_string(&error.machine) {
            Ok(payload) => eprintln!("{payload}"),
            Err(_) => eprintln!(
                "{{\"code\":\"internal_error\",\"message\":\"failed to encode structured error\",\"details\":{{}}}}"
            ),
        }
    } else {
        eprintln!("{}", error.machine);
    }
}

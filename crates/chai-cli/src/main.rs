#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use chai_core::Config;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chai")]
#[command(author, version, about = "One package client for npm, PyPI, GitHub and system packages", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Install a package and its dependencies into the sandbox
    Install {
        /// Package identifier, e.g. `npm:chalk@^5`, `gh:user/repo`, `py:requests`
        identifier: String,

        /// Source to install from (npm, py, gh, sys, chai); overrides the identifier's prefix
        #[arg(long, value_name = "SRC")]
        from: Option<String>,

        /// Resolve metadata only; download, extract and link nothing
        #[arg(long)]
        dry_run: bool,

        /// Install into the package store (otherwise into a temporary directory)
        #[arg(short, long)]
        yes: bool,

        /// Link the package's executables into the sandbox bin directory
        #[arg(long)]
        link: bool,

        /// Keep installing after a dependency fails
        #[arg(long)]
        best_effort: bool,

        /// Do not run post-install hooks
        #[arg(long)]
        ignore_scripts: bool,
    },

    /// Show metadata for a package or a local package directory
    Info {
        /// Package identifier or path
        package: String,
    },

    /// List installed packages
    List,

    /// Remove cached artifacts and temporary files
    Clean {
        /// Remove downloaded artifacts (the default)
        #[arg(long)]
        cache: bool,

        /// Remove temporary installs and staging directories
        #[arg(long)]
        tmp: bool,

        /// Remove both
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(cwd.clone())
        .into_diagnostic()?
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Install {
            identifier,
            from,
            dry_run,
            yes,
            link,
            best_effort,
            ignore_scripts,
        }) => {
            let span = tracing::info_span!("install", cmd = "install", cwd = %cwd.display());
            let _guard = span.enter();
            let action = commands::install::InstallAction {
                identifier,
                from,
                dry_run,
                persist: yes,
                link,
                best_effort,
                run_hooks: !ignore_scripts,
            };
            commands::install::run(&config, action, cli.json)
        }
        Some(Commands::Info { package }) => commands::info::run(&config, &package, cli.json),
        Some(Commands::List) => commands::list::run(&config, cli.json),
        Some(Commands::Clean { cache, tmp, all }) => {
            commands::clean::run(&config, chai_core::pkg::CleanOptions { cache, tmp, all }, cli.json)
        }
    }
}

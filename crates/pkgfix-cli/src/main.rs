#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::Result;
use pkgfix_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pkgfix")]
#[command(author, version, about = "Write and read node_modules fixture trees", long_about = None)]
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

    /// Materialize a fixture description into a directory
    Write {
        /// Fixture description (JSON)
        fixture: PathBuf,

        /// Target directory (defaults to a new directory under the system temp dir)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Always copy files instead of hard-linking them
        #[arg(long)]
        no_hard_links: bool,
    },

    /// Read an installed directory back into a fixture description
    Read {
        /// Directory containing package.json
        dir: PathBuf,

        /// Record dependencies as links instead of reading node_modules
        #[arg(long)]
        link_deps: bool,

        /// Also record devDependencies as links
        #[arg(long)]
        link_dev_deps: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Build config
    let mut config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    // Logs go to stderr, so stdout stays parseable in JSON mode
    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Write {
            fixture,
            dir,
            no_hard_links,
        }) => {
            config = config.with_hard_links(!no_hard_links);
            let span = tracing::info_span!("write", cmd = "write", cwd = %cwd.display());
            let _guard = span.enter();
            commands::write::run(&config, &fixture, dir.as_deref(), cli.json)
        }
        Some(Commands::Read {
            dir,
            link_deps,
            link_dev_deps,
        }) => {
            let span = tracing::info_span!("read", cmd = "read", cwd = %cwd.display());
            let _guard = span.enter();
            commands::read::run(&config, &dir, link_deps, link_dev_deps, cli.json)
        }
    }
}

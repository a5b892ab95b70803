//! Nest package manager (nest)

use anyhow::Context;
use clap::{Parser, Subcommand};
use nest_pm::commands::{self, InstallOptions, Session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nest")]
#[command(about = "Nest package manager", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a nest.toml in the current directory
    Init {
        /// Package name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Initial version
        #[arg(long)]
        version: Option<String>,
    },

    /// Pack the project into dist/
    Dist,

    /// Install packages, or the project's dependencies
    #[command(alias = "i")]
    Install {
        /// Directories, archives or name@range specifiers
        targets: Vec<String>,
        /// Install into the global scope
        #[arg(short, long)]
        global: bool,
        /// Link directory sources in place
        #[arg(long)]
        link: bool,
        /// Skip dev dependencies
        #[arg(long)]
        production: bool,
        /// Report every resolution error
        #[arg(long)]
        report_all: bool,
        /// Add the targets to [dependencies] in nest.toml
        #[arg(long, conflicts_with = "save_dev")]
        save: bool,
        /// Add the targets to [dev-dependencies] in nest.toml
        #[arg(long)]
        save_dev: bool,
    },

    /// Remove installed packages
    #[command(alias = "rm")]
    Uninstall {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(short, long)]
        global: bool,
    },

    /// Run a script from nest.toml
    Run {
        /// Script name
        script: String,
        /// Extra arguments passed to the script
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List installed packages
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        global: bool,
    },

    /// Check installed packages against the records
    Verify {
        #[arg(short, long)]
        global: bool,
        /// Drop broken records and dangling links
        #[arg(long)]
        repair: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NEST_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd: PathBuf = std::env::current_dir().context("Cannot read the working directory")?;

    match cli.command {
        Commands::Init { name, version } => {
            commands::init_project(&cwd, name.as_deref(), version.as_deref())?;
        }
        Commands::Dist => {
            let root = nest_pm::find_project_root(&cwd)
                .context("No nest.toml found. Run `nest init` to create a project.")?;
            commands::dist_project(&root)?;
        }
        Commands::Install {
            targets,
            global,
            link,
            production,
            report_all,
            save,
            save_dev,
        } => {
            let session = Session::open(&cwd, global)?;
            let options = InstallOptions {
                targets,
                link,
                production,
                report_all,
                save,
                save_dev,
            };
            commands::install_packages(&session, session.http_registry()?, &options)?;
        }
        Commands::Uninstall { names, global } => {
            let session = Session::open(&cwd, global)?;
            commands::uninstall_packages(&session, session.http_registry()?, &names)?;
        }
        Commands::Run { script, args } => {
            let session = Session::open(&cwd, false)?;
            commands::run_project_script(&session, &script, &args)?;
        }
        Commands::List { global } => {
            let session = Session::open(&cwd, global)?;
            commands::list_packages(&session)?;
        }
        Commands::Verify { global, repair } => {
            let session = Session::open(&cwd, global)?;
            commands::verify_scope(&session, session.http_registry()?, repair)?;
        }
    }

    Ok(())
}

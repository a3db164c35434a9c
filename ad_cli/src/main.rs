//! appdrop CLI - fetch portable application packages from mirrors and install them.

use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ad_core::{Context, DEFAULT_LOCALE, Paths, SourcesConfig};

mod commands;
mod display;

#[derive(Parser)]
#[command(name = "appdrop")]
#[command(about = "appdrop - download, verify and install application packages")]
#[command(version)]
struct Cli {
    /// Root directory for downloads and installer staging
    #[arg(long, default_value = "/var/lib/appdrop")]
    root: PathBuf,

    /// Sources configuration (known hosts, mirrors, private sources)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Answer every prompt without asking (abort on checksum mismatch, release locks)
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, verify and install a package
    Install {
        /// Package description (JSON)
        package: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Wait for each download and try the next source when it fails
        #[arg(long)]
        fallback: bool,

        /// Assume IPv4 works instead of probing the network
        #[arg(long)]
        skip_network_check: bool,

        /// External archiver for 7z and rar packages
        #[arg(long)]
        archiver: Option<PathBuf>,
    },

    /// Show the download sources a package resolves to
    Sources {
        /// Package description (JSON)
        package: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a file against an expected hash
    Verify {
        file: PathBuf,

        /// Expected hex digest (MD5, SHA-1, SHA-256, SHA-384 or SHA-512)
        hash: String,
    },

    /// Close or terminate the processes holding files under a path
    Unlock {
        path: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Move files a native installer left in the staging directory into place
    Reconcile {
        /// Final install directory
        install_dir: PathBuf,

        /// Staging directory (defaults to the apps directory under --root)
        #[arg(long)]
        staging: Option<PathBuf>,
    },
}

/// Options that decide which manifest entry and sources are used.
#[derive(clap::Args, Clone)]
struct SelectionArgs {
    /// Locale of the download entry to use
    #[arg(long, default_value = DEFAULT_LOCALE)]
    locale: String,

    /// Prefer a patch for the installed version
    #[arg(long)]
    update: bool,

    /// Route every source through the redirect endpoint
    #[arg(long)]
    force_redirect: bool,
}

impl SelectionArgs {
    fn apply(&self, ctx: &mut Context) {
        ctx.locale = self.locale.clone();
        ctx.update_mode = self.update;
        ctx.force_redirect = self.force_redirect;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), ad_core::Error> {
    match cli.command {
        Commands::Install {
            package,
            selection,
            fallback,
            skip_network_check,
            archiver,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let mut ctx = create_context(&cli.root);
            selection.apply(&mut ctx);
            ctx.fallback_on_failure = fallback;
            ctx.paths.archiver = archiver;
            commands::install::run(&package, &config, ctx, cli.yes, skip_network_check).await
        }

        Commands::Sources {
            package,
            selection,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let mut ctx = create_context(&cli.root);
            selection.apply(&mut ctx);
            commands::sources::run(&package, &config, &ctx, json)
        }

        Commands::Verify { file, hash } => commands::verify::run(&file, &hash),

        Commands::Unlock { path, force } => commands::unlock::run(&path, force || cli.yes),

        Commands::Reconcile {
            install_dir,
            staging,
        } => {
            let ctx = create_context(&cli.root);
            let staging = staging.unwrap_or_else(|| ctx.paths.apps_dir.clone());
            commands::reconcile::run(&staging, &install_dir, &ctx, cli.yes)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SourcesConfig, ad_core::Error> {
    match path {
        Some(path) => SourcesConfig::load(path),
        None => Ok(SourcesConfig::default()),
    }
}

fn create_context(root: &Path) -> Context {
    Context::new(Paths::from_root(root))
}

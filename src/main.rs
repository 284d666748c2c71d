use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as _;
use clap::builder::RangedU64ValueParser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rpm_repo_prune::{KeepCount, PruneOptions, RpmHeaderReader};

/// Removes older versions of rpm packages from a repository directory
#[derive(clap::Parser)]
#[command(version, about)]
struct Options {
    /// Path to the repository
    #[arg(short, long, value_name = "PATH")]
    repopath: PathBuf,
    /// Print every package and what happens to it
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
    /// Do not remove anything, only list what would be removed
    #[arg(short, long, default_value_t = false)]
    dry_run: bool,
    /// Number of most recent versions to keep for each package
    #[arg(
        short = 'n',
        long,
        value_name = "N",
        default_value_t = 1,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    keep_number: usize,
}

fn main() -> ExitCode {
    // Usage errors exit with status 2 from here.
    let options = Options::parse();

    let default_level = if options.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match real_main(options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn real_main(options: Options) -> anyhow::Result<()> {
    let config = PruneOptions {
        repo_path: options.repopath,
        keep: KeepCount::new(options.keep_number)?,
        dry_run: options.dry_run,
        verbose: options.verbose,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = rpm_repo_prune::run(&config, &RpmHeaderReader, &mut out)?;

    if report.failed > 0 {
        tracing::warn!("{} package files could not be removed", report.failed);
    }
    Ok(())
}

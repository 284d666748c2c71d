//! Remove older package versions from a flat rpm repository directory.
//!
//! A run reads the header of every `*.rpm` file in the directory, groups the
//! packages by name and architecture, keeps the newest versions of each group
//! and removes the rest.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub mod header;
pub mod prune;
pub mod retention;
pub mod scan;
pub mod types;
pub mod version;

pub use header::{MetadataReader, RpmHeaderReader};
pub use prune::PruneReport;
pub use retention::{GroupDecision, KeepCount};
pub use types::{PackageIdentity, PackageVersion};
pub use version::{Evr, rpmvercmp};

/// Everything a run needs to know, fixed before any file is looked at.
#[derive(Debug, Clone)]
pub struct PruneOptions {
    pub repo_path: PathBuf,
    pub keep: KeepCount,
    pub dry_run: bool,
    pub verbose: bool,
}

/// Prune `options.repo_path`, writing the per-file report to `out`.
///
/// Packages that cannot be read and files that cannot be removed are skipped
/// with a warning; the only fatal errors are an unreadable repository
/// directory and a failure to write to `out`.
pub fn run<R, W>(options: &PruneOptions, reader: &R, out: &mut W) -> Result<PruneReport>
where
    R: MetadataReader + ?Sized,
    W: Write,
{
    let scan = scan::scan_repository(&options.repo_path, reader)?;
    let decisions = retention::plan(scan.packages, options.keep);

    let mut report =
        prune::apply(&decisions, options, out).context("failed to write report")?;
    report.skipped = scan.skipped.len();

    if options.verbose {
        prune::write_summary(&report, options, out).context("failed to write report")?;
    }
    Ok(report)
}

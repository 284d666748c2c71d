use std::fs;
use std::io::{self, Write};

use crate::PruneOptions;
use crate::retention::GroupDecision;

/// Tally of what a prune run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub groups: usize,
    pub kept: usize,
    pub removed: usize,
    pub would_remove: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reclaimed_bytes: u64,
}

/// Carry out the decisions: remove every file in a delete-set, or only list
/// them when `dry_run` is set.
///
/// A file that cannot be removed is logged and counted, the remaining files
/// are still processed. The only error returned is a failure to write to
/// `out`.
pub fn apply<W: Write>(
    decisions: &[GroupDecision],
    options: &PruneOptions,
    out: &mut W,
) -> io::Result<PruneReport> {
    let mut report = PruneReport::default();

    for decision in decisions {
        report.groups += 1;
        report.kept += decision.keep.len();

        if options.verbose {
            writeln!(out, "{} {}", decision.identity, decision.len())?;
            // Nothing to choose between in a group of one.
            if decision.len() > 1 {
                for pkg in decision.keep.iter().rev() {
                    writeln!(out, "==keep== {}", pkg.path.display())?;
                }
            }
        }

        for pkg in &decision.delete {
            let path = pkg.path();
            if options.dry_run {
                writeln!(out, "==would remove== {}", path.display())?;
                report.would_remove += 1;
                continue;
            }

            if options.verbose {
                writeln!(out, "==removing== {}", path.display())?;
            }
            let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(path) {
                Ok(()) => {
                    tracing::info!(
                        "Removed old package {} (keeping {})",
                        pkg.nevra(),
                        decision
                            .keep
                            .last()
                            .map(|k| k.evr.to_string())
                            .unwrap_or_default()
                    );
                    report.removed += 1;
                    report.reclaimed_bytes += size;
                }
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }
    }

    Ok(report)
}

/// One line summary, printed after a verbose run.
pub fn write_summary<W: Write>(
    report: &PruneReport,
    options: &PruneOptions,
    out: &mut W,
) -> io::Result<()> {
    if options.dry_run {
        writeln!(
            out,
            "{} packages, kept {}, would remove {}, skipped {}",
            report.groups, report.kept, report.would_remove, report.skipped
        )
    } else {
        writeln!(
            out,
            "{} packages, kept {}, removed {}, failed {}, skipped {}, reclaimed {} bytes",
            report.groups,
            report.kept,
            report.removed,
            report.failed,
            report.skipped,
            report.reclaimed_bytes
        )
    }
}

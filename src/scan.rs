use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::header::MetadataReader;
use crate::types::PackageVersion;

pub const PACKAGE_EXTENSION: &str = ".rpm";

/// Packages found in a repository directory.
#[derive(Debug, Default)]
pub struct Scan {
    pub packages: Vec<PackageVersion>,
    /// Files that looked like packages but could not be read.
    pub skipped: Vec<PathBuf>,
}

/// List the `*.rpm` files directly inside `repo`, sorted by path.
///
/// Subdirectories are not searched and hidden files are ignored.
pub fn list_package_files(repo: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(repo)
        .with_context(|| format!("failed to read repository `{}`", repo.display()))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            // Names need not be UTF-8, match on the raw bytes like a glob would.
            let name = e.file_name();
            let name = name.as_encoded_bytes();
            !name.starts_with(b".") && name.ends_with(PACKAGE_EXTENSION.as_bytes())
        })
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Read the metadata of every package in `repo`. Unreadable packages are
/// skipped with a warning.
pub fn scan_repository<R: MetadataReader + ?Sized>(repo: &Path, reader: &R) -> Result<Scan> {
    let files = list_package_files(repo)?;
    tracing::info!("Found {} package files in {}", files.len(), repo.display());

    let mut scan = Scan::default();
    for path in files {
        match reader.read(&path) {
            Ok(pkg) => scan.packages.push(pkg),
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", path.display(), e);
                scan.skipped.push(path);
            }
        }
    }
    Ok(scan)
}

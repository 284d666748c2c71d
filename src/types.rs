use std::fmt;
use std::path::{Path, PathBuf};

use crate::version::Evr;

/// The `(name, architecture)` pair shared by every version of one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIdentity {
    pub name: String,
    pub arch: String,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> Self {
        PackageIdentity {
            name: name.into(),
            arch: arch.into(),
        }
    }
}

/// Displays as `name.arch`, the key packages are grouped and reported under.
impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.arch)
    }
}

/// One package file found in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub identity: PackageIdentity,
    pub evr: Evr,
    pub path: PathBuf,
}

impl PackageVersion {
    pub fn new(identity: PackageIdentity, evr: Evr, path: impl Into<PathBuf>) -> Self {
        PackageVersion {
            identity,
            evr,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `name-[epoch:]version-release.arch`, the way rpm tools name a package.
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.identity.name, self.evr, self.identity.arch)
    }
}

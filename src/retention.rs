use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use anyhow::{Result, format_err};

use crate::types::{PackageIdentity, PackageVersion};

/// How many of the newest versions of each package survive a prune.
///
/// Always at least one; there is no way to ask for every version of a package
/// to be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepCount(NonZeroUsize);

impl KeepCount {
    pub fn new(n: usize) -> Result<Self> {
        NonZeroUsize::new(n)
            .map(KeepCount)
            .ok_or_else(|| format_err!("number of packages to keep must be >= 1, got {}", n))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for KeepCount {
    fn default() -> Self {
        KeepCount(NonZeroUsize::MIN)
    }
}

/// The outcome for one package identity. Both lists are sorted oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDecision {
    pub identity: PackageIdentity,
    pub keep: Vec<PackageVersion>,
    pub delete: Vec<PackageVersion>,
}

impl GroupDecision {
    pub fn len(&self) -> usize {
        self.keep.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition packages by their `name.arch` key.
///
/// rpm architectures never contain a `.`, so two identities cannot share a key.
pub fn group_by_identity(
    packages: impl IntoIterator<Item = PackageVersion>,
) -> BTreeMap<String, Vec<PackageVersion>> {
    let mut groups: BTreeMap<String, Vec<PackageVersion>> = BTreeMap::new();
    for pkg in packages {
        groups.entry(pkg.identity.to_string()).or_default().push(pkg);
    }
    groups
}

/// Decide, for every package identity, which files stay and which go.
///
/// Groups come back in lexical order of their `name.arch` key. Within a group
/// the newest `keep` versions are kept and everything older is marked for
/// deletion; versions that compare equal are ordered by path so the result
/// never depends on the order the files were listed in. Nothing here touches
/// the filesystem.
pub fn plan(
    packages: impl IntoIterator<Item = PackageVersion>,
    keep: KeepCount,
) -> Vec<GroupDecision> {
    group_by_identity(packages)
        .into_iter()
        .map(|(_, mut versions)| {
            // Every group holds at least the package that created it.
            let identity = versions[0].identity.clone();
            versions.sort_by(|a, b| a.evr.cmp(&b.evr).then_with(|| a.path.cmp(&b.path)));
            // keep >= 1, so a lone version is never deleted.
            let split = versions.len().saturating_sub(keep.get());
            let kept = versions.split_off(split);
            GroupDecision {
                identity,
                keep: kept,
                delete: versions,
            }
        })
        .collect()
}

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use nom::{
    IResult,
    character::complete::{char, digit1},
    combinator::{map_res, opt},
    sequence::terminated,
};

/// Epoch, version and release of a package.
///
/// Equality and ordering follow rpm semantics rather than string equality: a
/// missing epoch is the same as epoch 0, and `1.0` equals `1_0` because
/// separators never take part in a comparison.
#[derive(Debug, Clone)]
pub struct Evr {
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: Option<u32>, version: impl Into<String>, release: impl Into<String>) -> Self {
        Evr {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }
}

/// Compare two version or release strings with the rpmvercmp algorithm.
///
/// Check https://fedoraproject.org/wiki/Archive:Tools/RPM/VersionComparison
///
/// Both strings are split into runs of digits and runs of letters, everything
/// else being a separator. Digit runs compare as integers and beat letter
/// runs. `~` sorts before anything (even the end of the string) and `^` sorts
/// after the end of the string but before any other segment.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = skip_separators(one);
        two = skip_separators(two);

        match (one.first(), two.first()) {
            (Some(b'~'), Some(b'~')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        match (one.first(), two.first()) {
            (Some(b'^'), Some(b'^')) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (Some(b'^'), None) => return Ordering::Greater,
            (None, Some(b'^')) => return Ordering::Less,
            (Some(b'^'), Some(_)) => return Ordering::Less,
            (Some(_), Some(b'^')) => return Ordering::Greater,
            _ => {}
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let in_segment = |c: &u8| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        };
        let (this, rest_one) = split_run(one, in_segment);
        let (that, rest_two) = split_run(two, in_segment);
        one = rest_one;
        two = rest_two;

        // Segments of different kinds: numbers are newer than letters.
        if that.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let this = trim_leading_zeros(this);
            let that = trim_leading_zeros(that);
            this.len().cmp(&that.len()).then_with(|| this.cmp(that))
        } else {
            this.cmp(that)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (false, _) => Ordering::Greater,
        (true, false) => Ordering::Less,
    }
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|c| c.is_ascii_alphanumeric() || *c == b'~' || *c == b'^')
        .unwrap_or(s.len());
    &s[start..]
}

fn split_run(s: &[u8], in_segment: impl Fn(&u8) -> bool) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !in_segment(c)).unwrap_or(s.len());
    s.split_at(end)
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .unwrap_or(0)
            .cmp(&other.epoch.unwrap_or(0))
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Evr {}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        f.write_str(&self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

fn epoch(i: &str) -> IResult<&str, Option<u32>> {
    opt(terminated(map_res(digit1, str::parse::<u32>), char(':')))(i)
}

/// Parses `[epoch:]version[-release]`.
impl FromStr for Evr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rest, epoch) = match epoch(s) {
            Ok(x) => x,
            Err(e) => bail!("Error parsing package epoch in `{}`: {}", s, e),
        };
        let (version, release) = rest.rsplit_once('-').unwrap_or((rest, ""));
        if version.is_empty() {
            bail!("Error parsing package version: `{}` has no version", s);
        }
        if rest.ends_with('-') {
            bail!("Error parsing package version: `{}` has an empty release", s);
        }
        Ok(Evr::new(epoch, version, release))
    }
}

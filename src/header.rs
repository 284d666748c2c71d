//! Reading package identity and version out of rpm files.
//!
//! An rpm file starts with a 96 byte lead, followed by a signature header
//! (padded to 8 bytes) and the main header. Both headers share one layout:
//!
//! ```text
//! magic (3) | version (1) | reserved (4) | index count (u32) | data size (u32)
//! index entries, 16 bytes each: tag (u32) | type (u32) | offset (u32) | count (u32)
//! data store
//! ```
//!
//! Only the headers are read, the payload that follows is never touched.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, bail, format_err};
use nom::{
    IResult,
    bytes::complete::{tag, take},
    multi::count,
    number::complete::{be_u8, be_u16, be_u32},
};

use crate::types::{PackageIdentity, PackageVersion};
use crate::version::Evr;

const LEAD_SIZE: usize = 96;
const LEAD_MAGIC: &[u8] = &[0xed, 0xab, 0xee, 0xdb];
const LEAD_TYPE_SOURCE: u16 = 1;
const HEADER_MAGIC: &[u8] = &[0x8e, 0xad, 0xe8, 0x01];
const HEADER_INTRO_SIZE: usize = 16;
const INDEX_ENTRY_SIZE: usize = 16;

// Same limits rpm itself applies when loading a header.
const MAX_INDEX_ENTRIES: u32 = 0xffff;
const MAX_DATA_SIZE: u32 = 0x0fff_ffff;

const TYPE_INT32: u32 = 4;
const TYPE_STRING: u32 = 6;

const TAG_NAME: u32 = 1000;
const TAG_VERSION: u32 = 1001;
const TAG_RELEASE: u32 = 1002;
const TAG_EPOCH: u32 = 1003;
const TAG_ARCH: u32 = 1022;
const TAG_NOSOURCE: u32 = 1051;
const TAG_NOPATCH: u32 = 1052;
const TAG_SOURCEPACKAGE: u32 = 1106;

/// Source of package metadata for the files of a repository.
///
/// Implementations return an error for anything that is not a valid package,
/// the caller decides whether that is fatal.
pub trait MetadataReader {
    fn read(&self, path: &Path) -> Result<PackageVersion>;
}

/// Reads the identity and version straight from the rpm headers.
///
/// Signatures are neither checked nor required.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpmHeaderReader;

impl MetadataReader for RpmHeaderReader {
    fn read(&self, path: &Path) -> Result<PackageVersion> {
        let file =
            File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
        let (identity, evr) = read_package(&mut BufReader::new(file))
            .with_context(|| format!("`{}` is not a valid rpm package", path.display()))?;
        tracing::debug!("{}: {} {}", path.display(), identity, evr);
        Ok(PackageVersion::new(identity, evr, path))
    }
}

/// Parse the lead and both headers from `r`, returning what the main header
/// says about the package.
pub fn read_package<R: Read>(r: &mut R) -> Result<(PackageIdentity, Evr)> {
    let mut buf = [0u8; LEAD_SIZE];
    r.read_exact(&mut buf).context("file too short for an rpm lead")?;
    let (_, lead_type) = lead(&buf).map_err(|_| format_err!("bad rpm lead magic"))?;

    let signature = read_header(r).context("failed to read signature header")?;
    let mut pad = [0u8; 8];
    r.read_exact(&mut pad[..signature.padding()])
        .context("truncated signature header")?;

    let header = read_header(r).context("failed to read main header")?;

    let name = header.required_string(TAG_NAME, "name")?;
    let version = header.required_string(TAG_VERSION, "version")?;
    let release = header.required_string(TAG_RELEASE, "release")?;
    let epoch = header.int32(TAG_EPOCH)?;

    let arch = if lead_type == LEAD_TYPE_SOURCE || header.contains(TAG_SOURCEPACKAGE) {
        if header.contains(TAG_NOSOURCE) || header.contains(TAG_NOPATCH) {
            "nosrc"
        } else {
            "src"
        }
    } else {
        header.required_string(TAG_ARCH, "arch")?
    };

    Ok((
        PackageIdentity::new(name, arch),
        Evr::new(epoch, version, release),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexEntry {
    tag: u32,
    kind: u32,
    offset: u32,
    count: u32,
}

#[derive(Debug)]
struct Header {
    entries: Vec<IndexEntry>,
    store: Vec<u8>,
}

impl Header {
    fn size(&self) -> usize {
        HEADER_INTRO_SIZE + self.entries.len() * INDEX_ENTRY_SIZE + self.store.len()
    }

    /// Bytes following the signature header up to the next 8 byte boundary.
    fn padding(&self) -> usize {
        (8 - self.size() % 8) % 8
    }

    fn entry(&self, tag: u32) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    fn contains(&self, tag: u32) -> bool {
        self.entry(tag).is_some()
    }

    fn data(&self, entry: &IndexEntry) -> Result<&[u8]> {
        self.store
            .get(entry.offset as usize..)
            .ok_or_else(|| format_err!("tag {} points outside the header data", entry.tag))
    }

    fn string(&self, tag: u32) -> Result<Option<&str>> {
        let Some(entry) = self.entry(tag) else {
            return Ok(None);
        };
        if entry.kind != TYPE_STRING {
            bail!("tag {} has type {}, expected a string", tag, entry.kind);
        }
        let data = self.data(entry)?;
        let end = data
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| format_err!("tag {} is not NUL terminated", tag))?;
        let s = std::str::from_utf8(&data[..end])
            .with_context(|| format!("tag {} is not valid UTF-8", tag))?;
        Ok(Some(s))
    }

    fn required_string(&self, tag: u32, what: &str) -> Result<&str> {
        match self.string(tag)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => bail!("header has no package {}", what),
        }
    }

    fn int32(&self, tag: u32) -> Result<Option<u32>> {
        let Some(entry) = self.entry(tag) else {
            return Ok(None);
        };
        if entry.kind != TYPE_INT32 || entry.count < 1 {
            bail!("tag {} has type {}, expected an int32", tag, entry.kind);
        }
        match self.data(entry)?.get(..4) {
            Some(bytes) => Ok(Some(u32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            None => bail!("tag {} points outside the header data", tag),
        }
    }
}

fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut intro = [0u8; HEADER_INTRO_SIZE];
    r.read_exact(&mut intro).context("truncated header")?;
    let (_, (nindex, size)) =
        header_intro(&intro).map_err(|_| format_err!("bad header magic"))?;
    if nindex > MAX_INDEX_ENTRIES || size > MAX_DATA_SIZE {
        bail!("header too large ({} entries, {} bytes)", nindex, size);
    }

    let mut index = vec![0u8; nindex as usize * INDEX_ENTRY_SIZE];
    r.read_exact(&mut index).context("truncated header index")?;
    let (_, entries) = count(index_entry, nindex as usize)(index.as_slice())
        .map_err(|_| format_err!("malformed header index"))?;

    let mut store = vec![0u8; size as usize];
    r.read_exact(&mut store).context("truncated header data")?;

    Ok(Header { entries, store })
}

fn lead(i: &[u8]) -> IResult<&[u8], u16> {
    let (i, _) = tag(LEAD_MAGIC)(i)?;
    let (i, _major) = be_u8(i)?;
    let (i, _minor) = be_u8(i)?;
    let (i, kind) = be_u16(i)?;
    Ok((i, kind))
}

fn header_intro(i: &[u8]) -> IResult<&[u8], (u32, u32)> {
    let (i, _) = tag(HEADER_MAGIC)(i)?;
    let (i, _reserved) = take(4usize)(i)?;
    let (i, nindex) = be_u32(i)?;
    let (i, size) = be_u32(i)?;
    Ok((i, (nindex, size)))
}

fn index_entry(i: &[u8]) -> IResult<&[u8], IndexEntry> {
    let (i, tag) = be_u32(i)?;
    let (i, kind) = be_u32(i)?;
    let (i, offset) = be_u32(i)?;
    let (i, count) = be_u32(i)?;
    Ok((
        i,
        IndexEntry {
            tag,
            kind,
            offset,
            count,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TYPE_BIN: u32 = 7;
    const SIGTAG_SHA256: u32 = 273;

    fn header_bytes(entries: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut index = Vec::new();
        let mut store = Vec::new();
        for (tag, kind, data) in entries {
            let count = if *kind == TYPE_BIN { data.len() } else { 1 };
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&kind.to_be_bytes());
            index.extend_from_slice(&(store.len() as u32).to_be_bytes());
            index.extend_from_slice(&(count as u32).to_be_bytes());
            store.extend_from_slice(data);
        }
        let mut out = HEADER_MAGIC.to_vec();
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        out.extend(index);
        out.extend(store);
        out
    }

    fn string(s: &str) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.push(0);
        v
    }

    fn rpm_bytes(lead_type: u16, main: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = LEAD_MAGIC.to_vec();
        out.extend_from_slice(&[3, 0]);
        out.extend_from_slice(&lead_type.to_be_bytes());
        out.resize(LEAD_SIZE, 0);

        // 5 bytes of data leaves the signature header off an 8 byte boundary.
        let signature = header_bytes(&[(SIGTAG_SHA256, TYPE_BIN, vec![0xaa; 5])]);
        let padding = (8 - signature.len() % 8) % 8;
        out.extend(signature);
        out.extend(std::iter::repeat_n(0, padding));

        out.extend(header_bytes(main));
        out.extend_from_slice(b"payload");
        out
    }

    fn binary_rpm(name: &str, epoch: Option<u32>, version: &str, release: &str) -> Vec<u8> {
        let mut main = Vec::new();
        if let Some(epoch) = epoch {
            main.push((TAG_EPOCH, TYPE_INT32, epoch.to_be_bytes().to_vec()));
        }
        main.push((TAG_NAME, TYPE_STRING, string(name)));
        main.push((TAG_VERSION, TYPE_STRING, string(version)));
        main.push((TAG_RELEASE, TYPE_STRING, string(release)));
        main.push((TAG_ARCH, TYPE_STRING, string("x86_64")));
        rpm_bytes(0, &main)
    }

    #[test]
    fn reads_binary_package() {
        let bytes = binary_rpm("foo", None, "1.2", "1.fc40");
        let (identity, evr) = read_package(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(identity, PackageIdentity::new("foo", "x86_64"));
        assert_eq!(evr.epoch, None);
        assert_eq!(evr.version, "1.2");
        assert_eq!(evr.release, "1.fc40");
    }

    #[test]
    fn reads_epoch() {
        let bytes = binary_rpm("foo", Some(3), "1.2", "1");
        let (_, evr) = read_package(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(evr.epoch, Some(3));
    }

    #[test]
    fn source_package_uses_src_arch() {
        let main = vec![
            (TAG_NAME, TYPE_STRING, string("foo")),
            (TAG_VERSION, TYPE_STRING, string("1.2")),
            (TAG_RELEASE, TYPE_STRING, string("1")),
            (TAG_ARCH, TYPE_STRING, string("x86_64")),
            (TAG_SOURCEPACKAGE, TYPE_INT32, 1u32.to_be_bytes().to_vec()),
        ];
        let (identity, _) = read_package(&mut Cursor::new(rpm_bytes(1, &main))).unwrap();
        assert_eq!(identity, PackageIdentity::new("foo", "src"));
    }

    #[test]
    fn nosource_package_uses_nosrc_arch() {
        let main = vec![
            (TAG_NAME, TYPE_STRING, string("foo")),
            (TAG_VERSION, TYPE_STRING, string("1.2")),
            (TAG_RELEASE, TYPE_STRING, string("1")),
            (TAG_NOSOURCE, TYPE_INT32, 0u32.to_be_bytes().to_vec()),
        ];
        let (identity, _) = read_package(&mut Cursor::new(rpm_bytes(1, &main))).unwrap();
        assert_eq!(identity.arch, "nosrc");
    }

    #[test]
    fn rejects_non_rpm() {
        let err = read_package(&mut Cursor::new(b"#!/bin/sh\necho hi\n".to_vec())).unwrap_err();
        assert!(format!("{:#}", err).contains("rpm lead"));

        let mut bytes = vec![0u8; LEAD_SIZE + 64];
        bytes[..4].copy_from_slice(LEAD_MAGIC);
        let err = read_package(&mut Cursor::new(bytes)).unwrap_err();
        assert!(format!("{:#}", err).contains("bad header magic"));
    }

    #[test]
    fn rejects_truncated_header() {
        let mut bytes = binary_rpm("foo", None, "1.2", "1");
        // Drop the payload and the tail of the data store.
        bytes.truncate(bytes.len() - "payload".len() - 3);
        let err = read_package(&mut Cursor::new(bytes)).unwrap_err();
        assert!(format!("{:#}", err).contains("truncated header data"));
    }

    #[test]
    fn rejects_missing_name() {
        let main = vec![
            (TAG_VERSION, TYPE_STRING, string("1.2")),
            (TAG_RELEASE, TYPE_STRING, string("1")),
            (TAG_ARCH, TYPE_STRING, string("x86_64")),
        ];
        let err = read_package(&mut Cursor::new(rpm_bytes(0, &main))).unwrap_err();
        assert!(format!("{:#}", err).contains("no package name"));
    }

    #[test]
    fn rejects_out_of_bounds_offset() {
        let header = Header {
            entries: vec![IndexEntry {
                tag: TAG_NAME,
                kind: TYPE_STRING,
                offset: 100,
                count: 1,
            }],
            store: string("foo"),
        };
        assert!(header.string(TAG_NAME).is_err());
    }

    #[test]
    fn reader_reports_path() {
        let td = tempfile::TempDir::new().unwrap();
        let good = td.path().join("foo-1.2-1.x86_64.rpm");
        std::fs::write(&good, binary_rpm("foo", None, "1.2", "1")).unwrap();
        let bad = td.path().join("broken.rpm");
        std::fs::write(&bad, b"not an rpm").unwrap();

        let pkg = RpmHeaderReader.read(&good).unwrap();
        assert_eq!(pkg.path, good);
        assert_eq!(pkg.nevra(), "foo-1.2-1.x86_64");

        let err = RpmHeaderReader.read(&bad).unwrap_err();
        assert!(err.to_string().contains("broken.rpm"));
        assert!(err.to_string().contains("not a valid rpm package"));
    }
}

//! The 512-byte ustar header block.

use std::ops::Range;

use tracing::warn;

use crate::error::{ArchiveError, Result};
use crate::walk::Entry;

/// Size of every header and payload block.
pub const BLOCK_SIZE: usize = 512;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const DEVMAJOR: Range<usize> = 329..337;
const DEVMINOR: Range<usize> = 337..345;
const PREFIX: Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";
const OWNER_NAME: &str = "root";

/// Largest value a 7-digit octal field holds.
const MAX_ID: u64 = 0o7777777;

pub const TYPE_REGULAR: u8 = b'0';
pub const TYPE_REGULAR_OLD: u8 = b'\0';
pub const TYPE_DIRECTORY: u8 = b'5';

/// Decoded header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// Full entry path, `prefix` and `name` joined
    pub name: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub mtime: u64,
    pub typeflag: u8,
    pub linkname: String,
}

impl TarHeader {
    /// Header for a regular file read from the tree walker.
    pub fn for_file(entry: &Entry) -> Self {
        Self {
            name: entry.relative_path.clone(),
            mode: entry.mode & 0o7777,
            uid: owner_id(entry.uid, "uid", &entry.relative_path),
            gid: owner_id(entry.gid, "gid", &entry.relative_path),
            size: entry.size,
            mtime: entry.mtime.max(0) as u64,
            typeflag: TYPE_REGULAR,
            linkname: String::new(),
        }
    }

    pub fn is_regular(&self) -> bool {
        self.typeflag == TYPE_REGULAR || self.typeflag == TYPE_REGULAR_OLD
    }

    /// Bytes the payload occupies in the archive, padding included.
    pub fn padded_size(&self) -> u64 {
        self.size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
    }

    /// Encode into a header block with a valid checksum.
    pub fn to_bytes(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];
        let (prefix, name) = split_name(&self.name)?;

        put_str(&mut block[NAME], name, "name")?;
        put_octal(&mut block[MODE], u64::from(self.mode & 0o7777), 6, b" \0", "mode")?;
        put_octal(&mut block[UID], self.uid, 7, b"\0", "uid")?;
        put_octal(&mut block[GID], self.gid, 7, b"\0", "gid")?;
        put_octal(&mut block[SIZE], self.size, 11, b"\0", "size")?;
        put_octal(&mut block[MTIME], self.mtime, 11, b"\0", "mtime")?;
        block[TYPEFLAG] = self.typeflag;
        put_str(&mut block[LINKNAME], &self.linkname, "linkname")?;
        block[MAGIC].copy_from_slice(USTAR_MAGIC);
        block[VERSION].copy_from_slice(USTAR_VERSION);
        put_str(&mut block[UNAME], OWNER_NAME, "uname")?;
        put_str(&mut block[GNAME], OWNER_NAME, "gname")?;
        put_octal(&mut block[DEVMAJOR], 0, 7, b"\0", "devmajor")?;
        put_octal(&mut block[DEVMINOR], 0, 7, b"\0", "devminor")?;
        put_str(&mut block[PREFIX], prefix, "prefix")?;

        let sum = checksum(&block);
        block[CHECKSUM].copy_from_slice(format!("{sum:06o}\0 ").as_bytes());
        Ok(block)
    }

    /// Decode a header block, verifying its checksum.
    pub fn parse(block: &[u8; BLOCK_SIZE]) -> Result<Self> {
        let mut name = c_string(&block[NAME]);
        if &block[MAGIC][..5] == b"ustar" {
            let prefix = c_string(&block[PREFIX]);
            if !prefix.is_empty() {
                name = format!("{prefix}/{name}");
            }
        }

        // Stricter than tools that skip this check: a mismatch is fatal.
        let stored = parse_octal(&block[CHECKSUM], "checksum")?;
        let unsigned = u64::from(checksum(block));
        if stored != unsigned && stored as i64 != signed_checksum(block) {
            return Err(ArchiveError::integrity(format!(
                "header checksum mismatch for {name:?}: stored {stored:o}, computed {unsigned:o}"
            )));
        }

        let size = parse_octal(&block[SIZE], "size")?;
        if size > u64::MAX - (BLOCK_SIZE as u64 - 1) {
            return Err(ArchiveError::format(format!(
                "size {size} of {name:?} cannot be padded to a block boundary"
            )));
        }

        Ok(Self {
            mode: parse_octal(&block[MODE], "mode")? as u32 & 0o7777,
            uid: parse_octal(&block[UID], "uid")?,
            gid: parse_octal(&block[GID], "gid")?,
            size,
            mtime: parse_octal(&block[MTIME], "mtime")?,
            typeflag: block[TYPEFLAG],
            linkname: c_string(&block[LINKNAME]),
            name,
        })
    }
}

/// Unsigned byte sum with the checksum field read as eight spaces.
pub fn checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum()
}

// Some historic writers summed the bytes as signed chars.
fn signed_checksum(block: &[u8; BLOCK_SIZE]) -> i64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { i64::from(b' ') } else { i64::from(b as i8) })
        .sum()
}

pub fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

fn owner_id(id: u64, field: &str, path: &str) -> u64 {
    if id > MAX_ID {
        warn!(path, field, id, "owner id does not fit the ustar header, writing 0");
        0
    } else {
        id
    }
}

/// Split a path into `(prefix, name)` so each fits its header field.
fn split_name(path: &str) -> Result<(&str, &str)> {
    if path.len() <= NAME.len() {
        return Ok(("", path));
    }
    path.match_indices('/')
        .map(|(i, _)| (&path[..i], &path[i + 1..]))
        .find(|(prefix, name)| {
            !name.is_empty() && name.len() <= NAME.len() && prefix.len() <= PREFIX.len()
        })
        .ok_or_else(|| {
            ArchiveError::unsupported(format!("path too long for a ustar header: {path}"))
        })
}

fn put_str(field: &mut [u8], value: &str, what: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.len() {
        return Err(ArchiveError::unsupported(format!(
            "{what} longer than {} bytes: {value}",
            field.len()
        )));
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn put_octal(field: &mut [u8], value: u64, digits: usize, tail: &[u8], what: &str) -> Result<()> {
    let text = format!("{value:0digits$o}");
    if text.len() > digits {
        return Err(ArchiveError::unsupported(format!(
            "{what} {value} does not fit a {digits}-digit octal field"
        )));
    }
    field[..digits].copy_from_slice(text.as_bytes());
    field[digits..digits + tail.len()].copy_from_slice(tail);
    Ok(())
}

/// Parse an octal field. GNU base-256 values (high bit set) are accepted.
fn parse_octal(field: &[u8], what: &str) -> Result<u64> {
    if field.first().is_some_and(|b| b & 0x80 != 0) {
        let mut value = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .map(|v| v + u64::from(b))
                .ok_or_else(|| ArchiveError::unsupported(format!("{what} exceeds 64 bits")))?;
        }
        return Ok(value);
    }

    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let text = std::str::from_utf8(&field[..end])
        .map_err(|_| ArchiveError::format(format!("non-ASCII {what} field")))?
        .trim_matches(' ');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8)
        .map_err(|_| ArchiveError::format(format!("invalid octal {what} field: {text:?}")))
}

fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

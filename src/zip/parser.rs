//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. For extraction, read each file's Local File Header and data
//!
//! The Central Directory is authoritative for sizes and CRCs; the Local
//! File Header is only consulted for the length of its variable fields.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use tracing::debug;

use crate::compress;
use crate::crc32::crc32;
use crate::error::{ArchiveError, Result};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Generic over the reader type so archives can be parsed from disk or
/// from memory.
///
/// ## Example
///
/// ```ignore
/// let parser = ZipParser::new(reader);
/// for entry in parser.list_files().await? {
///     let data = parser.read_entry(&entry).await?;
/// }
/// ```
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Tries the comment-less position first, then searches backwards over
    /// the largest possible comment for a signature whose comment length
    /// matches the bytes that follow it.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Format`] if no valid EOCD exists.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            return Err(ArchiveError::format(format!(
                "not a ZIP file: {} bytes is smaller than an EOCD record",
                self.size
            )));
        }

        // Common case: no comment, EOCD occupies the last 22 bytes.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        // Search backwards for EOCD signature (PK\x05\x06)
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok((eocd, search_start + i as u64));
                }
            }
        }

        Err(ArchiveError::format(
            "not a ZIP file: End of Central Directory signature not found",
        ))
    }

    /// List all entries in the ZIP archive.
    ///
    /// Reads the EOCD, then fetches and parses the entire Central Directory
    /// in one read.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Unsupported`] for ZIP64 or multi-disk archives,
    /// [`ArchiveError::Format`] for a malformed Central Directory.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        if eocd.is_zip64() {
            return Err(ArchiveError::unsupported("ZIP64 archive"));
        }
        if eocd.is_multi_disk() {
            return Err(ArchiveError::unsupported("multi-volume archive"));
        }

        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > eocd_offset {
            return Err(ArchiveError::format(format!(
                "Central Directory ({cd_size} bytes at {cd_offset}) overlaps the EOCD at {eocd_offset}"
            )));
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..eocd.total_entries {
            let entry = self.parse_cdfh(&mut cursor)?;
            entries.push(entry);
        }

        debug!(entries = entries.len(), cd_offset, cd_size, "central directory parsed");
        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(&self, cursor: &mut Cursor<&[u8]>) -> Result<ZipFileEntry> {
        let remaining = cursor.get_ref().len() as u64 - cursor.position();
        if remaining < CDFH_MIN_SIZE as u64 {
            return Err(ArchiveError::format("Central Directory truncated"));
        }

        // Read and verify the signature (PK\x01\x02)
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            return Err(ArchiveError::format("invalid Central Directory File Header"));
        }

        let version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let external_attrs = cursor.read_u32::<LittleEndian>()?;
        let lfh_offset = cursor.read_u32::<LittleEndian>()?;

        if compressed_size == u32::MAX || uncompressed_size == u32::MAX || lfh_offset == u32::MAX {
            return Err(ArchiveError::unsupported("ZIP64 entry"));
        }

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor
            .read_exact(&mut file_name_bytes)
            .map_err(|_| ArchiveError::format("Central Directory truncated in file name"))?;
        // Use lossy conversion to handle non-UTF8 filenames gracefully
        let file_name = String::from_utf8_lossy(&file_name_bytes).to_string();

        // Directory entries end with '/'
        let is_directory = file_name.ends_with('/');

        // Extra fields and comments are not interpreted
        let skip = extra_field_length as u64 + file_comment_length as u64;
        if cursor.position() + skip > cursor.get_ref().len() as u64 {
            return Err(ArchiveError::format("Central Directory truncated in extra field"));
        }
        cursor.set_position(cursor.position() + skip);

        Ok(ZipFileEntry {
            file_name,
            version_made_by,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            crc32,
            lfh_offset: lfh_offset as u64,
            last_mod_time,
            last_mod_date,
            external_attrs,
            is_directory,
        })
    }

    /// Get the actual data offset for a file entry.
    ///
    /// The Local File Header (LFH) has variable-length fields (filename,
    /// extra field) that may differ from the Central Directory entry, so
    /// the LFH is read to find where the data begins.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh_buf = vec![0u8; LFH_SIZE];
        self.reader.read_exact_at(entry.lfh_offset, &mut lfh_buf).await?;

        // Verify LFH signature (PK\x03\x04)
        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ArchiveError::format(format!(
                "invalid Local File Header for {} at offset {}",
                entry.file_name, entry.lfh_offset
            )));
        }

        // Read the variable field lengths from fixed positions in LFH
        let mut cursor = Cursor::new(&lfh_buf);
        cursor.set_position(26); // Offset to filename length field

        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        Ok(entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length)
    }

    /// Read and decompress an entry, verifying its size and CRC-32.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Unsupported`] for encrypted entries or methods other
    /// than STORED and DEFLATE, [`ArchiveError::Integrity`] when the
    /// decompressed data does not match the Central Directory.
    pub async fn read_entry(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return Err(ArchiveError::unsupported(format!(
                "encrypted entry {}",
                entry.file_name
            )));
        }
        let data_offset = self.get_data_offset(entry).await?;
        if data_offset + entry.compressed_size > self.size {
            return Err(ArchiveError::format(format!(
                "data for {} runs past the end of the archive",
                entry.file_name
            )));
        }

        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.reader.read_exact_at(data_offset, &mut raw).await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                compress::inflate_raw(&raw, entry.uncompressed_size).map_err(|e| {
                    ArchiveError::format(format!("corrupt deflate stream in {}: {e}", entry.file_name))
                })?
            }
            CompressionMethod::Unknown(method) => {
                return Err(ArchiveError::unsupported(format!(
                    "compression method {method} for {}",
                    entry.file_name
                )));
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            return Err(ArchiveError::integrity(format!(
                "{}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            )));
        }
        // Enforced on every read, not only computed: a mismatch is fatal.
        let actual = crc32(&data);
        if actual != entry.crc32 {
            return Err(ArchiveError::integrity(format!(
                "{}: CRC-32 {actual:08x} does not match stored {:08x}",
                entry.file_name, entry.crc32
            )));
        }

        Ok(data)
    }
}

//! ZIP archive writer.
//!
//! Each entry is held in memory while it is checksummed and compressed,
//! then written as a Local File Header followed by its data. The Central
//! Directory is accumulated and written by [`ZipWriter::finish`].

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::compress::{self, CompressionLevel};
use crate::crc32::crc32;
use crate::error::{ArchiveError, Result};
use crate::walk::Entry;

use super::structures::*;

/// Streaming ZIP writer over any async sink.
pub struct ZipWriter<W: AsyncWrite + Unpin> {
    inner: W,
    level: CompressionLevel,
    /// Bytes written so far; the next Local File Header starts here
    offset: u64,
    central: Vec<ZipFileEntry>,
}

impl<W: AsyncWrite + Unpin> ZipWriter<W> {
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        Self {
            inner,
            level,
            offset: 0,
            central: Vec::new(),
        }
    }

    /// Number of entries written so far
    pub fn entries(&self) -> usize {
        self.central.len()
    }

    /// Add a regular file.
    ///
    /// The data is deflated unless the level is 0 or the deflated form is
    /// not smaller, in which case it is stored.
    pub async fn add_file(&mut self, name: &str, data: &[u8], mode: u32, mtime: i64) -> Result<()> {
        // 0xFFFF in the EOCD count is the ZIP64 marker.
        if self.central.len() + 1 >= u16::MAX as usize {
            return Err(ArchiveError::unsupported(
                "65535 or more entries requires ZIP64",
            ));
        }

        let crc = crc32(data);
        let deflated = if self.level.is_store() {
            None
        } else {
            Some(compress::deflate_raw(data, self.level)?).filter(|d| d.len() < data.len())
        };
        let (method, payload) = match &deflated {
            Some(d) => (CompressionMethod::Deflate, d.as_slice()),
            None => (CompressionMethod::Stored, data),
        };

        let stamp = DosDateTime::from_unix(mtime);
        let entry = ZipFileEntry {
            file_name: name.to_string(),
            version_made_by: VERSION_MADE_BY,
            flags: if name.is_ascii() { 0 } else { FLAG_UTF8 },
            compression_method: method,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc,
            lfh_offset: self.offset,
            last_mod_time: stamp.time,
            last_mod_date: stamp.date,
            external_attrs: ZipFileEntry::unix_attrs(mode),
            is_directory: false,
        };

        let mut header = Vec::with_capacity(LFH_SIZE + name.len());
        entry.write_local_header(&mut header)?;
        self.inner.write_all(&header).await?;
        self.inner.write_all(payload).await?;
        self.offset += (header.len() + payload.len()) as u64;

        debug!(
            name,
            method = method.as_u16(),
            size = entry.uncompressed_size,
            compressed = entry.compressed_size,
            "zip entry written"
        );
        self.central.push(entry);
        Ok(())
    }

    /// Add a walker entry, reading the whole file into memory. Only regular
    /// files are stored; anything else returns `false`.
    pub async fn add_entry(&mut self, entry: &Entry) -> Result<bool> {
        if !entry.is_file() {
            return Ok(false);
        }
        let data = fs::read(&entry.path).await?;
        self.add_file(&entry.relative_path, &data, entry.mode, entry.mtime)
            .await?;
        Ok(true)
    }

    /// Write the Central Directory and EOCD, then flush and return the
    /// inner writer.
    pub async fn finish(mut self) -> Result<W> {
        let cd_offset = self.offset;
        let mut cd = Vec::new();
        for entry in &self.central {
            entry.write_central_header(&mut cd)?;
        }

        let eocd = EndOfCentralDirectory::new(
            self.central.len() as u16,
            u32_field(cd.len() as u64, "Central Directory size")?,
            u32_field(cd_offset, "Central Directory offset")?,
        );
        eocd.write_to(&mut cd)?;

        self.inner.write_all(&cd).await?;
        self.inner.flush().await?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::ZipParser;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_archive_is_a_bare_eocd() {
        let bytes = ZipWriter::new(Vec::new(), CompressionLevel::default())
            .finish()
            .await
            .unwrap();
        assert_eq!(bytes.len(), EndOfCentralDirectory::SIZE);
        let eocd = EndOfCentralDirectory::from_bytes(&bytes).unwrap();
        assert_eq!(eocd.total_entries, 0);
        assert_eq!(eocd.cd_offset, 0);
    }

    #[tokio::test]
    async fn local_header_layout() {
        let mut writer = ZipWriter::new(Vec::new(), CompressionLevel::STORE);
        writer
            .add_file("a.txt", b"hello", 0o644, 1_710_510_331)
            .await
            .unwrap();
        let bytes = writer.finish().await.unwrap();

        assert_eq!(&bytes[0..4], &[0x50, 0x4b, 0x03, 0x04]);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 0); // stored
        assert_eq!(
            u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]),
            crc32(b"hello")
        );
        assert_eq!(u16::from_le_bytes([bytes[26], bytes[27]]), 5);
        assert_eq!(&bytes[30..35], b"a.txt");
        assert_eq!(&bytes[35..40], b"hello");
        assert_eq!(&bytes[40..44], &[0x50, 0x4b, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn incompressible_data_is_stored() {
        let noise: Vec<u8> = (0..256u32).map(|i| (i * 167 % 256) as u8).collect();
        let text = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(10);

        let mut writer = ZipWriter::new(Vec::new(), CompressionLevel::BEST);
        writer.add_file("noise.bin", &noise, 0o644, 0).await.unwrap();
        writer.add_file("text.txt", &text, 0o644, 0).await.unwrap();
        let bytes = writer.finish().await.unwrap();

        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        let entries = parser.list_files().await.unwrap();
        assert_eq!(entries[0].compression_method, CompressionMethod::Stored);
        assert_eq!(entries[0].compressed_size, 256);
        assert_eq!(entries[1].compression_method, CompressionMethod::Deflate);
        assert!(entries[1].compressed_size < entries[1].uncompressed_size);
        assert_eq!(parser.read_entry(&entries[0]).await.unwrap(), noise);
        assert_eq!(parser.read_entry(&entries[1]).await.unwrap(), text);
    }

    #[tokio::test]
    async fn entry_count_stops_below_zip64_marker() {
        let mut writer = ZipWriter::new(Vec::new(), CompressionLevel::STORE);
        for i in 0..u16::MAX as usize - 1 {
            writer.add_file(&i.to_string(), b"", 0o644, 0).await.unwrap();
        }
        assert!(matches!(
            writer.add_file("one-too-many", b"", 0o644, 0).await,
            Err(ArchiveError::Unsupported(_))
        ));

        let bytes = writer.finish().await.unwrap();
        let parser = ZipParser::new(Arc::new(MemoryReader::new(bytes)));
        assert_eq!(parser.list_files().await.unwrap().len(), 65534);
    }

    #[tokio::test]
    async fn non_ascii_names_set_utf8_flag() {
        let mut writer = ZipWriter::new(Vec::new(), CompressionLevel::STORE);
        writer.add_file("über.txt", b"x", 0o644, 0).await.unwrap();
        let bytes = writer.finish().await.unwrap();
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), FLAG_UTF8);
    }
}

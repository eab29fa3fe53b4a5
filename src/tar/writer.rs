use std::fs::File;
use std::io::{self, BufReader, Read, Write};

use tracing::debug;

use super::header::{BLOCK_SIZE, TarHeader};
use crate::error::Result;
use crate::walk::Entry;

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Streaming TAR writer.
///
/// Payloads are copied straight through to `inner`; nothing is buffered
/// beyond what `io::copy` uses.
pub struct TarWriter<W: Write> {
    inner: W,
    entries: usize,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            entries: 0,
        }
    }

    /// Number of entries appended so far
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write `header` followed by exactly `header.size` bytes from `data`.
    pub fn append<R: Read>(&mut self, header: &TarHeader, data: R) -> Result<()> {
        let block = header.to_bytes()?;
        self.inner.write_all(&block)?;

        let copied = io::copy(&mut data.take(header.size), &mut self.inner)?;
        if copied != header.size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} ended after {copied} of {} bytes",
                    header.name, header.size
                ),
            )
            .into());
        }

        let padding = (header.padded_size() - header.size) as usize;
        self.inner.write_all(&ZERO_BLOCK[..padding])?;

        self.entries += 1;
        debug!(name = %header.name, size = header.size, "tar entry written");
        Ok(())
    }

    /// Append a walker entry. Only regular files are stored; anything else
    /// returns `false`.
    pub fn append_entry(&mut self, entry: &Entry) -> Result<bool> {
        if !entry.is_file() {
            return Ok(false);
        }
        let file = BufReader::new(File::open(&entry.path)?);
        self.append(&TarHeader::for_file(entry), file)?;
        Ok(true)
    }

    /// Write the end-of-archive marker and hand back the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.inner.write_all(&ZERO_BLOCK)?;
        self.inner.write_all(&ZERO_BLOCK)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::tar::header::TYPE_REGULAR;

    fn header(name: &str, size: u64) -> TarHeader {
        TarHeader {
            name: name.to_string(),
            mode: 0o600,
            uid: 0,
            gid: 0,
            size,
            mtime: 0,
            typeflag: TYPE_REGULAR,
            linkname: String::new(),
        }
    }

    #[test]
    fn pads_payload_and_terminates() {
        let mut writer = TarWriter::new(Vec::new());
        writer.append(&header("a", 5), &b"hello"[..]).unwrap();
        writer.append(&header("b", 512), &[7u8; 512][..]).unwrap();
        assert_eq!(writer.entries(), 2);
        let bytes = writer.finish().unwrap();

        // a: header + 1 block, b: header + 1 block, marker: 2 blocks
        assert_eq!(bytes.len(), 6 * BLOCK_SIZE);
        assert_eq!(&bytes[512..517], b"hello");
        assert!(bytes[517..1024].iter().all(|&b| b == 0));
        assert!(bytes[4 * 512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_archive_is_two_zero_blocks() {
        let bytes = TarWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(bytes, vec![0u8; 2 * BLOCK_SIZE]);
    }

    #[test]
    fn short_payload_is_an_error() {
        let mut writer = TarWriter::new(Vec::new());
        let err = writer.append(&header("a", 10), &b"abc"[..]).unwrap_err();
        match err {
            ArchiveError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

use std::io::{self, Read};

use tracing::debug;

use super::header::{BLOCK_SIZE, TarHeader, is_zero_block};
use crate::error::{ArchiveError, Result};

/// A regular file read from a TAR stream
#[derive(Debug, Clone)]
pub struct TarEntry {
    pub header: TarHeader,
    pub data: Vec<u8>,
}

/// Sequential TAR reader.
///
/// Headers are read one at a time with [`next_header`](Self::next_header).
/// A payload left unread is skipped when the next header is requested.
pub struct TarReader<R: Read> {
    inner: R,
    /// Payload bytes (with padding) of the current entry not yet consumed
    pending: Option<(u64, u64)>,
    finished: bool,
    skipped: usize,
}

impl<R: Read> TarReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: None,
            finished: false,
            skipped: 0,
        }
    }

    /// Non-regular entries passed over by [`next_file`](Self::next_file)
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Read the next header, or `None` at the end-of-archive marker or end
    /// of input.
    pub fn next_header(&mut self) -> Result<Option<TarHeader>> {
        if self.finished {
            return Ok(None);
        }
        if let Some((_, padded)) = self.pending.take() {
            self.discard(padded)?;
        }

        let mut block = [0u8; BLOCK_SIZE];
        if !self.read_block(&mut block)? || is_zero_block(&block) {
            self.finished = true;
            return Ok(None);
        }

        let header = TarHeader::parse(&block)?;
        self.pending = Some((header.size, header.padded_size()));
        Ok(Some(header))
    }

    /// Read exactly `size` payload bytes of the current entry, discarding
    /// the padding after them.
    pub fn read_payload(&mut self) -> Result<Vec<u8>> {
        let Some((size, padded)) = self.pending.take() else {
            return Ok(Vec::new());
        };

        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        (&mut self.inner).take(size).read_to_end(&mut data)?;
        if (data.len() as u64) != size {
            return Err(ArchiveError::format(format!(
                "payload truncated: expected {size} bytes, got {}",
                data.len()
            )));
        }
        self.discard(padded - size)?;
        Ok(data)
    }

    /// Next regular file with its payload. Other entry types are skipped by
    /// their declared size.
    pub fn next_file(&mut self) -> Result<Option<TarEntry>> {
        while let Some(header) = self.next_header()? {
            if header.is_regular() {
                let data = self.read_payload()?;
                debug!(name = %header.name, size = header.size, "tar entry read");
                return Ok(Some(TarEntry { header, data }));
            }
            debug!(
                name = %header.name,
                typeflag = %char::from(header.typeflag),
                "skipping non-regular tar entry"
            );
            self.skipped += 1;
        }
        Ok(None)
    }

    /// Fill `block`. Returns `false` on a clean end of input.
    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.inner.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(false),
            BLOCK_SIZE => Ok(true),
            n => Err(ArchiveError::format(format!(
                "truncated header block: {n} of {BLOCK_SIZE} bytes"
            ))),
        }
    }

    fn discard(&mut self, len: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        if skipped != len {
            return Err(ArchiveError::format(format!(
                "archive truncated: {} of {len} bytes missing",
                len - skipped
            )));
        }
        Ok(())
    }
}

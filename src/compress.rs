//! Thin seam over `flate2`.
//!
//! ZIP method 8 uses raw deflate streams (no zlib wrapper); tar.gz wraps the
//! whole TAR stream in gzip.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};

use crate::error::{ArchiveError, Result};

/// Deflate level in `0..=9`; 0 means store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    pub const STORE: Self = Self(0);
    pub const FAST: Self = Self(1);
    pub const BEST: Self = Self(9);

    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(ArchiveError::unsupported(format!(
                "compression level {level} (expected 0..=9)"
            )));
        }
        Ok(Self(level))
    }

    pub fn level(self) -> u32 {
        self.0
    }

    pub fn is_store(self) -> bool {
        self.0 == 0
    }

    fn as_flate2(self) -> Compression {
        Compression::new(self.0)
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

/// Raw-deflate `data` in memory.
pub fn deflate_raw(data: &[u8], level: CompressionLevel) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level.as_flate2());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate a raw deflate stream expected to hold `expected` bytes.
///
/// Output stops one byte past `expected`, so a stream that inflates to more
/// than its header declares comes back longer than `expected` instead of
/// being decoded in full.
pub fn inflate_raw(data: &[u8], expected: u64) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(1 << 20) as usize);
    DeflateDecoder::new(data)
        .take(expected.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Wrap `inner` so everything written to it is gzip-compressed.
///
/// Call [`GzEncoder::finish`] to write the gzip trailer.
pub fn gzip_writer<W: Write>(inner: W, level: CompressionLevel) -> GzEncoder<W> {
    GzEncoder::new(inner, level.as_flate2())
}

/// Wrap `inner` so reads yield the decompressed gzip payload.
pub fn gzip_reader<R: Read>(inner: R) -> GzDecoder<R> {
    GzDecoder::new(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_range() {
        assert!(CompressionLevel::new(0).unwrap().is_store());
        assert_eq!(CompressionLevel::new(9).unwrap(), CompressionLevel::BEST);
        assert!(matches!(
            CompressionLevel::new(10),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn raw_deflate_has_no_zlib_header() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(20);
        let packed = deflate_raw(&data, CompressionLevel::default()).unwrap();
        assert!(packed.len() < data.len());
        // A zlib stream would start with 0x78.
        assert_ne!(packed[0], 0x78);
        assert_eq!(inflate_raw(&packed, data.len() as u64).unwrap(), data);
    }

    #[test]
    fn gzip_stream_magic() {
        let mut enc = gzip_writer(Vec::new(), CompressionLevel::FAST);
        enc.write_all(b"payload").unwrap();
        let bytes = enc.finish().unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

        let mut out = String::new();
        gzip_reader(&bytes[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");
    }

    #[test]
    fn inflate_stops_past_expected_size() {
        let zeros = vec![0u8; 8 << 20];
        let packed = deflate_raw(&zeros, CompressionLevel::BEST).unwrap();
        let out = inflate_raw(&packed, 10).unwrap();
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn inflate_garbage_fails() {
        assert!(inflate_raw(&[0xff, 0xff, 0xff, 0xff], 4).is_err());
    }
}

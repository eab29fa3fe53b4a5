//! # treearc
//!
//! Build and extract TAR, tar.gz and ZIP archives from directory trees.
//!
//! The archive formats are written byte-for-byte as independent tools expect
//! them: POSIX ustar headers with checksums, and ZIP local headers, Central
//! Directory and End of Central Directory records with CRC-32 and
//! DEFLATE-compressed payloads.
//!
//! ## Features
//!
//! - Deterministic depth-first walk of the source tree
//! - TAR and tar.gz creation with streamed payloads
//! - ZIP creation with per-entry DEFLATE, falling back to STORED when
//!   compression does not help
//! - Extraction restoring POSIX permission bits
//! - Header checksums and CRC-32 verified on read
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use treearc::{ZipOptions, create_zip_archive, extract_zip_archive};
//!
//! #[tokio::main]
//! async fn main() -> treearc::Result<()> {
//!     let summary = create_zip_archive(
//!         Path::new("evidence"),
//!         Path::new("evidence.zip"),
//!         &ZipOptions::default(),
//!     )
//!     .await?;
//!     println!("{} files archived", summary.entries);
//!
//!     extract_zip_archive(Path::new("evidence.zip"), Path::new("restored")).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod compress;
pub mod crc32;
pub mod error;
pub mod io;
pub mod tar;
pub mod walk;
pub mod zip;

pub use archive::{
    ArchiveOptions, ArchiveSummary, ExtractOptions, ExtractSummary, TarFormat, ZipOptions,
    create_archive, create_zip_archive, extract_archive, extract_zip_archive, list_archive,
    list_zip_archive,
};
pub use cli::Cli;
pub use compress::CompressionLevel;
pub use crc32::crc32;
pub use error::{ArchiveError, Result};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use walk::{Entry, EntryKind, WalkOptions, walk};
pub use zip::{ZipExtractor, ZipFileEntry};

//! POSIX ustar archives.
//!
//! A TAR stream is a sequence of 512-byte header blocks, each followed by
//! its payload padded to a block boundary, and ends with two zero blocks.
//!
//! - [`header`]: encoding and decoding of the header block
//! - [`writer`]: streaming writer over any [`std::io::Write`]
//! - [`reader`]: sequential reader over any [`std::io::Read`]
//!
//! Only regular files are written and restored. Directories, links and
//! other entry types in foreign archives are skipped by their declared
//! size. PAX and GNU extension headers are not interpreted.

pub mod header;
mod reader;
mod writer;

pub use header::{BLOCK_SIZE, TarHeader};
pub use reader::{TarEntry, TarReader};
pub use writer::TarWriter;

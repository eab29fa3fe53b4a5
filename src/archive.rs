//! Archive façade: directory tree in, archive file out, and back.
//!
//! Each operation either completes the whole archive or returns an error.
//! A failed create can leave a truncated file at the destination; removing
//! it is up to the caller.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::compress::{self, CompressionLevel};
use crate::error::{ArchiveError, Result};
use crate::io::LocalFileReader;
use crate::tar::{TarHeader, TarReader, TarWriter};
use crate::walk::{Entry, WalkOptions, walk};
use crate::zip::{ZipExtractor, ZipFileEntry, ZipParser, ZipWriter};

/// Container layout for [`create_archive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TarFormat {
    #[default]
    Tar,
    TarGz,
}

impl TarFormat {
    /// Guess from a file name: `.tar.gz` and `.tgz` are gzip-wrapped.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            TarFormat::TarGz
        } else {
            TarFormat::Tar
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Gzip the TAR stream. Also implied by [`TarFormat::TarGz`].
    pub compress: bool,
    pub format: TarFormat,
    /// Gzip level when compressing
    pub level: CompressionLevel,
    pub walk: WalkOptions,
}

impl ArchiveOptions {
    fn gzip(&self) -> bool {
        self.compress || self.format == TarFormat::TarGz
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Gunzip the archive before reading TAR blocks
    pub decompress: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ZipOptions {
    pub compression_level: CompressionLevel,
    pub walk: WalkOptions,
}

/// Outcome of a create operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// File entries stored
    pub entries: usize,
    /// Size of the archive file
    pub bytes: u64,
}

/// Outcome of an extract operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Regular files written
    pub files: usize,
    /// Entries that were not written as files (directories, links, ...)
    pub skipped: usize,
}

/// Build a TAR (or tar.gz) archive of every file below `source_dir`.
pub async fn create_archive(
    source_dir: &Path,
    archive_path: &Path,
    options: &ArchiveOptions,
) -> Result<ArchiveSummary> {
    let source = source_dir.to_path_buf();
    let archive = archive_path.to_path_buf();
    let options = options.clone();
    let gzip = options.gzip();

    let summary = blocking(move || {
        let out = BufWriter::new(File::create(&archive)?);
        let entries = without_archive(walk(&source, &options.walk)?, &source, &archive);
        let count = if options.gzip() {
            let encoder = compress::gzip_writer(out, options.level);
            let (encoder, count) = write_tar(entries, encoder)?;
            encoder.finish()?.flush()?;
            count
        } else {
            let (mut out, count) = write_tar(entries, out)?;
            out.flush()?;
            count
        };
        Ok(ArchiveSummary {
            entries: count,
            bytes: fs::metadata(&archive)?.len(),
        })
    })
    .await?;

    info!(
        archive = %archive_path.display(),
        entries = summary.entries,
        bytes = summary.bytes,
        gzip,
        "tar archive created"
    );
    Ok(summary)
}

fn write_tar<W: Write>(entries: impl Iterator<Item = Entry>, out: W) -> Result<(W, usize)> {
    let mut writer = TarWriter::new(out);
    for entry in entries {
        writer.append_entry(&entry)?;
    }
    let count = writer.entries();
    Ok((writer.finish()?, count))
}

/// Extract the regular files of a TAR (or tar.gz) archive into `dest_dir`.
pub async fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractSummary> {
    let archive = archive_path.to_path_buf();
    let dest = dest_dir.to_path_buf();
    let decompress = options.decompress;

    let summary = blocking(move || {
        fs::create_dir_all(&dest)?;
        let input = BufReader::new(File::open(&archive)?);
        if decompress {
            extract_tar(TarReader::new(compress::gzip_reader(input)), &dest)
        } else {
            extract_tar(TarReader::new(input), &dest)
        }
    })
    .await?;

    if summary.skipped > 0 {
        warn!(
            archive = %archive_path.display(),
            skipped = summary.skipped,
            "non-regular tar entries were not restored"
        );
    }
    info!(
        archive = %archive_path.display(),
        files = summary.files,
        "tar archive extracted"
    );
    Ok(summary)
}

fn extract_tar<R: Read>(mut reader: TarReader<R>, dest: &Path) -> Result<ExtractSummary> {
    let mut files = 0;
    while let Some(entry) = reader.next_file()? {
        let path = entry_destination(dest, &entry.header.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &entry.data)?;
        restore_mode(&path, entry.header.mode)?;
        files += 1;
    }
    Ok(ExtractSummary {
        files,
        skipped: reader.skipped(),
    })
}

/// List every header in a TAR (or tar.gz) archive, regular or not.
pub async fn list_archive(archive_path: &Path, options: &ExtractOptions) -> Result<Vec<TarHeader>> {
    let archive = archive_path.to_path_buf();
    let decompress = options.decompress;

    blocking(move || {
        let input = BufReader::new(File::open(&archive)?);
        if decompress {
            collect_headers(TarReader::new(compress::gzip_reader(input)))
        } else {
            collect_headers(TarReader::new(input))
        }
    })
    .await
}

fn collect_headers<R: Read>(mut reader: TarReader<R>) -> Result<Vec<TarHeader>> {
    let mut headers = Vec::new();
    while let Some(header) = reader.next_header()? {
        headers.push(header);
    }
    Ok(headers)
}

/// Build a ZIP archive of every file below `source_dir`.
pub async fn create_zip_archive(
    source_dir: &Path,
    archive_path: &Path,
    options: &ZipOptions,
) -> Result<ArchiveSummary> {
    let source = source_dir.to_path_buf();
    let walk_options = options.walk.clone();
    let archive = archive_path.to_path_buf();
    let entries: Vec<Entry> = blocking(move || {
        Ok(without_archive(walk(&source, &walk_options)?, &source, &archive).collect())
    })
    .await?;

    let file = tokio::fs::File::create(archive_path).await?;
    let mut writer = ZipWriter::new(tokio::io::BufWriter::new(file), options.compression_level);
    for entry in &entries {
        writer.add_entry(entry).await?;
    }
    let count = writer.entries();
    let mut out = writer.finish().await?;
    out.shutdown().await?;

    let summary = ArchiveSummary {
        entries: count,
        bytes: tokio::fs::metadata(archive_path).await?.len(),
    };
    info!(
        archive = %archive_path.display(),
        entries = summary.entries,
        bytes = summary.bytes,
        level = options.compression_level.level(),
        "zip archive created"
    );
    Ok(summary)
}

/// Extract a ZIP archive into `dest_dir`, restoring POSIX modes.
pub async fn extract_zip_archive(archive_path: &Path, dest_dir: &Path) -> Result<ExtractSummary> {
    let reader = Arc::new(LocalFileReader::new(archive_path)?);
    tokio::fs::create_dir_all(dest_dir).await?;

    let summary = ZipExtractor::new(reader).extract_all(dest_dir).await?;
    info!(
        archive = %archive_path.display(),
        files = summary.files,
        "zip archive extracted"
    );
    Ok(summary)
}

/// List the Central Directory of a ZIP archive.
pub async fn list_zip_archive(archive_path: &Path) -> Result<Vec<ZipFileEntry>> {
    let reader = Arc::new(LocalFileReader::new(archive_path)?);
    ZipParser::new(reader).list_files().await
}

/// Drop the entry that is the archive being written, when the destination
/// lies inside the source tree.
fn without_archive<I>(
    entries: I,
    source: &Path,
    archive: &Path,
) -> impl Iterator<Item = Entry> + use<I>
where
    I: Iterator<Item = Entry>,
{
    let own = archive_relative_path(source, archive);
    entries.filter(move |entry| {
        if own.as_deref() == Some(entry.relative_path.as_str()) {
            warn!(path = %entry.relative_path, "skipping the archive being written");
            return false;
        }
        true
    })
}

/// `/`-joined path of `archive` below `source`, resolving symlinks and
/// relative paths on both sides.
fn archive_relative_path(source: &Path, archive: &Path) -> Option<String> {
    let root = source.canonicalize().ok()?;
    let parent = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dest = parent.canonicalize().ok()?.join(archive.file_name()?);
    let rel = dest.strip_prefix(&root).ok()?;
    let parts = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Join an archive entry name onto `dest`, refusing names that would land
/// outside it.
pub(crate) fn entry_destination(dest: &Path, name: &str) -> Result<PathBuf> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(ArchiveError::format(format!("absolute entry name {name:?}")));
    }

    let mut path = dest.to_path_buf();
    let mut pushed = false;
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                return Err(ArchiveError::format(format!(
                    "entry name {name:?} escapes the destination"
                )));
            }
            part => {
                let mut components = Path::new(part).components();
                if !matches!(
                    (components.next(), components.next()),
                    (Some(Component::Normal(_)), None)
                ) {
                    return Err(ArchiveError::format(format!("invalid entry name {name:?}")));
                }
                path.push(part);
                pushed = true;
            }
        }
    }

    if !pushed {
        return Err(ArchiveError::format(format!("empty entry name {name:?}")));
    }
    Ok(path)
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn restore_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

/// Run a synchronous codec step on tokio's blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

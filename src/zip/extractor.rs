use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::archive::{ExtractSummary, entry_destination};
use crate::error::Result;
use crate::io::ReadAt;

use super::parser::ZipParser;
use super::structures::ZipFileEntry;

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        self.parser.read_entry(entry).await
    }

    /// Extract file to disk, restoring its POSIX mode when recorded
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);

        if let Some(mode) = entry.unix_mode() {
            set_mode(output_path, mode).await?;
        }

        Ok(())
    }

    /// Extract every entry below `dest`. Directory entries become
    /// directories.
    pub async fn extract_all(&self, dest: &Path) -> Result<ExtractSummary> {
        let entries = self.list_files().await?;
        let mut summary = ExtractSummary::default();

        for entry in &entries {
            let output_path = entry_destination(dest, &entry.file_name)?;
            if entry.is_directory {
                fs::create_dir_all(&output_path).await?;
                summary.skipped += 1;
                continue;
            }
            debug!(name = %entry.file_name, size = entry.uncompressed_size, "extracting");
            self.extract_to_file(entry, &output_path).await?;
            summary.files += 1;
        }

        Ok(summary)
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms).await
}

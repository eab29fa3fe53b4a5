//! Main entry point for the treearc CLI application.
//!
//! This binary exposes the archive façade: create and extract TAR/tar.gz
//! and ZIP archives, and list their contents.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use treearc::cli::{Command, is_zip_path};
use treearc::{
    ArchiveOptions, Cli, CompressionLevel, ExtractOptions, TarFormat, ZipOptions, create_archive,
    create_zip_archive, extract_archive, extract_zip_archive, list_archive, list_zip_archive,
};

/// Application entry point.
///
/// Installs the log subscriber, then dispatches to the requested command.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Create {
            source,
            archive,
            gzip,
            format,
            walk,
        } => {
            let options = ArchiveOptions {
                compress: gzip,
                format: format
                    .map(TarFormat::from)
                    .unwrap_or_else(|| TarFormat::from_path(&archive)),
                walk: walk.into(),
                ..Default::default()
            };
            let summary = create_archive(&source, &archive, &options)
                .await
                .with_context(|| format!("creating {}", archive.display()))?;
            println!(
                "{}: {} files, {}",
                archive.display(),
                summary.entries,
                format_size(summary.bytes)
            );
        }
        Command::Extract {
            archive,
            dest,
            gunzip,
        } => {
            let options = ExtractOptions {
                decompress: gunzip || TarFormat::from_path(&archive) == TarFormat::TarGz,
            };
            let summary = extract_archive(&archive, &dest, &options)
                .await
                .with_context(|| format!("extracting {}", archive.display()))?;
            println!("{}: {} files extracted", dest.display(), summary.files);
        }
        Command::Zip {
            source,
            archive,
            level,
            walk,
        } => {
            let options = ZipOptions {
                compression_level: CompressionLevel::new(level)?,
                walk: walk.into(),
            };
            let summary = create_zip_archive(&source, &archive, &options)
                .await
                .with_context(|| format!("creating {}", archive.display()))?;
            println!(
                "{}: {} files, {}",
                archive.display(),
                summary.entries,
                format_size(summary.bytes)
            );
        }
        Command::Unzip { archive, dest } => {
            let summary = extract_zip_archive(&archive, &dest)
                .await
                .with_context(|| format!("extracting {}", archive.display()))?;
            println!("{}: {} files extracted", dest.display(), summary.files);
        }
        Command::List {
            archive,
            verbose,
            gunzip,
        } => {
            if is_zip_path(&archive) {
                list_zip(&archive, verbose).await?;
            } else {
                let options = ExtractOptions {
                    decompress: gunzip || TarFormat::from_path(&archive) == TarFormat::TarGz,
                };
                list_tar(&archive, &options, verbose).await?;
            }
        }
    }

    Ok(())
}

/// List files in a ZIP archive.
///
/// Supports two output formats:
/// - Simple format: Just file names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio, and timestamps
async fn list_zip(archive: &Path, verbose: bool) -> Result<()> {
    let entries = list_zip_archive(archive)
        .await
        .with_context(|| format!("reading {}", archive.display()))?;

    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  {:>6}  Name",
            "Length", "Size", "Cmpr", "Date", "Time", "Mode"
        );
        println!("{}", "-".repeat(78));
    }

    // Track totals for summary line
    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        let mode = entry
            .unix_mode()
            .map(|m| format!("{m:04o}"))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {:>6}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            mode,
            entry.file_name
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(78));
        println!(
            "{:>10}  {:>10}  {}  {:>29}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }

    Ok(())
}

/// List every header of a TAR archive.
async fn list_tar(archive: &Path, options: &ExtractOptions, verbose: bool) -> Result<()> {
    let headers = list_archive(archive, options)
        .await
        .with_context(|| format!("reading {}", archive.display()))?;

    for header in &headers {
        if verbose {
            let stamp = chrono::DateTime::from_timestamp(header.mtime as i64, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{}  {:04o}  {:>10}  {}  {}",
                char::from(header.typeflag).escape_default(),
                header.mode,
                header.size,
                stamp,
                header.name
            );
        } else {
            println!("{}", header.name);
        }
    }

    Ok(())
}

/// Percentage saved by compression, right-aligned to five columns
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "   0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

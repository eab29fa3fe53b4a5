use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::archive::TarFormat;
use crate::walk::WalkOptions;

#[derive(Parser, Debug)]
#[command(name = "treearc")]
#[command(version)]
#[command(about = "Build and extract TAR, tar.gz and ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  treearc create -z logs/ logs.tar.gz       gzip-compressed tarball of logs/\n  \
  treearc zip -l 9 -x '*.tmp' out/ out.zip  zip out/ at best compression, skipping *.tmp\n  \
  treearc list -v out.zip                   show sizes and timestamps")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_name = "LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a TAR archive from a directory
    Create {
        /// Directory to archive
        #[arg(value_name = "SRC")]
        source: PathBuf,

        /// Archive to write
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Gzip the archive
        #[arg(short = 'z', long = "gzip")]
        gzip: bool,

        /// Archive format (default: inferred from ARCHIVE)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Extract a TAR archive into a directory
    Extract {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Destination directory
        #[arg(value_name = "DEST")]
        dest: PathBuf,

        /// Gunzip before reading (default: inferred from ARCHIVE)
        #[arg(short = 'z', long = "gunzip")]
        gunzip: bool,
    },

    /// Create a ZIP archive from a directory
    Zip {
        #[arg(value_name = "SRC")]
        source: PathBuf,

        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Deflate level, 0 stores every entry
        #[arg(short = 'l', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Extract a ZIP archive into a directory
    Unzip {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "DEST")]
        dest: PathBuf,
    },

    /// List archive contents
    List {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// List verbosely
        #[arg(short = 'v')]
        verbose: bool,

        /// Treat ARCHIVE as tar.gz
        #[arg(short = 'z', long = "gunzip")]
        gunzip: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WalkArgs {
    /// Deepest directory level to include
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Exclude files matching the pattern
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,
}

impl From<WalkArgs> for WalkOptions {
    fn from(args: WalkArgs) -> Self {
        WalkOptions {
            max_depth: args.max_depth,
            exclude: args.exclude,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Tar,
    #[value(name = "tar.gz")]
    TarGz,
}

impl From<FormatArg> for TarFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Tar => TarFormat::Tar,
            FormatArg::TarGz => TarFormat::TarGz,
        }
    }
}

pub fn is_zip_path(path: &std::path::Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

//! Deterministic directory traversal.
//!
//! The walker yields every file, directory and symlink below a root in
//! depth-first pre-order, siblings sorted by file name. The same tree always
//! produces the same sequence.

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};

use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use crate::error::Result;

/// Kind of filesystem object an [`Entry`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// A normalized filesystem entry below the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Where the entry lives on disk
    pub path: PathBuf,
    /// Path below the root, `/`-separated, never absolute, never `..`
    pub relative_path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// POSIX permission bits (`& 0o7777`)
    pub mode: u32,
    /// Seconds since the Unix epoch
    pub mtime: i64,
    pub uid: u64,
    pub gid: u64,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Traversal options.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Deepest level to descend to; direct children of the root are depth 1
    pub max_depth: Option<usize>,
    /// Glob patterns (`*`, `?`) matched against the relative path and the
    /// file name. A matching directory is pruned with its subtree.
    pub exclude: Vec<String>,
}

impl WalkOptions {
    fn is_excluded(&self, relative_path: &str) -> bool {
        let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.exclude
            .iter()
            .any(|p| glob_match(p, relative_path) || glob_match(p, name))
    }
}

/// Walk `root`, yielding entries lazily.
///
/// The root must be a readable directory; that error propagates. Failures
/// below it are logged and the affected subtree is skipped.
pub fn walk(root: &Path, options: &WalkOptions) -> Result<impl Iterator<Item = Entry> + use<>> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", root.display()),
        )
        .into());
    }

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let root = root.to_path_buf();
    let filter_root = root.clone();
    let filter_options = options.clone();

    let entries = walker
        .into_iter()
        .filter_entry(move |dent| {
            if filter_options.exclude.is_empty() {
                return true;
            }
            match relative_path(&filter_root, dent.path()) {
                Some(rel) => !filter_options.is_excluded(&rel),
                None => true,
            }
        })
        .filter_map(move |item| match item {
            Ok(dent) => to_entry(&root, &dent),
            Err(err) => {
                let at = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!(path = %at, error = %err, "skipping inaccessible entry");
                None
            }
        });

    Ok(entries)
}

fn to_entry(root: &Path, dent: &DirEntry) -> Option<Entry> {
    let Some(relative_path) = relative_path(root, dent.path()) else {
        warn!(path = %dent.path().display(), "skipping entry with non UTF-8 name");
        return None;
    };

    let meta = match dent.metadata() {
        Ok(meta) => meta,
        Err(err) => {
            warn!(path = %dent.path().display(), error = %err, "skipping entry without metadata");
            return None;
        }
    };

    let file_type = meta.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        // Sockets, FIFOs and device nodes have no archive representation.
        warn!(path = %dent.path().display(), "skipping special file");
        return None;
    };

    let (mode, uid, gid, mtime) = ownership(&meta, kind);

    Some(Entry {
        path: dent.path().to_path_buf(),
        relative_path,
        kind,
        size: if kind == EntryKind::File { meta.len() } else { 0 },
        mode,
        mtime,
        uid,
        gid,
    })
}

#[cfg(unix)]
fn ownership(meta: &Metadata, _kind: EntryKind) -> (u32, u64, u64, i64) {
    use std::os::unix::fs::MetadataExt;
    (
        meta.mode() & 0o7777,
        meta.uid() as u64,
        meta.gid() as u64,
        meta.mtime(),
    )
}

#[cfg(not(unix))]
fn ownership(meta: &Metadata, kind: EntryKind) -> (u32, u64, u64, i64) {
    let mut mode = if kind == EntryKind::Directory { 0o755 } else { 0o644 };
    if meta.permissions().readonly() {
        mode &= !0o222;
    }
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    (mode, 0, 0, mtime)
}

/// `/`-joined path of `path` below `root`, or `None` if it is not below the
/// root or contains a component that is not valid UTF-8.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Glob matching supporting `*` (any run of characters) and `?` (exactly
/// one character).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern, &text)
}

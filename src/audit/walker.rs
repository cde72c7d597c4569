use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// A regular file under the assets root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Full path on disk.
    pub path: PathBuf,
    /// Path relative to the assets root, `/`-separated.
    pub rel_path: String,
    pub size: u64,
}

/// One thing the walk found: a candidate, or something it could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    File(CandidateFile),
    Unreadable { rel_path: String, error: String },
}

impl WalkItem {
    pub fn rel_path(&self) -> &str {
        match self {
            WalkItem::File(file) => &file.rel_path,
            WalkItem::Unreadable { rel_path, .. } => rel_path,
        }
    }
}

/// Enumerate candidate files depth-first, sorted by name at each level.
///
/// Paths in `exclude` (the preview directory, the audit sink) are pruned.
/// With a `limit`, the walk stops once that many items were produced.
pub fn discover(root: &Path, exclude: &[PathBuf], limit: Option<usize>) -> Vec<WalkItem> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !exclude.iter().any(|x| entry.path() == x))
        .filter_map(|result| match result {
            Ok(entry) if entry.file_type().is_file() => {
                let rel_path = relative(root, entry.path());
                Some(match entry.metadata() {
                    Ok(meta) => WalkItem::File(CandidateFile {
                        path: entry.into_path(),
                        rel_path,
                        size: meta.len(),
                    }),
                    Err(e) => WalkItem::Unreadable {
                        rel_path,
                        error: format!("walk error: {e}"),
                    },
                })
            }
            Ok(_) => None,
            Err(e) => {
                let rel_path = e
                    .path()
                    .map(|p| relative(root, p))
                    .unwrap_or_else(|| ".".into());
                warn!("cannot read {}: {}", rel_path, e);
                Some(WalkItem::Unreadable {
                    rel_path,
                    error: format!("walk error: {e}"),
                })
            }
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        ".".into()
    } else {
        joined
    }
}

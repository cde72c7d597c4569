pub mod material;
pub mod sqlite;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use zeroize::Zeroizing;

pub use sqlite::SqliteKeyStore;

/// Key material for one attachment, as recorded by the relational store.
#[derive(Clone)]
pub struct KeyRecord {
    /// Path exactly as stored in the database.
    pub attachment_path: String,

    /// Original attachment file name, when the store records one.
    pub file_name: Option<String>,

    /// Symmetric key bytes. 32 bytes for every row the loader accepts.
    pub key_material: Zeroizing<Vec<u8>>,

    /// Expected SHA-256 of the plaintext.
    pub digest: Option<[u8; 32]>,
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("attachment_path", &self.attachment_path)
            .field("file_name", &self.file_name)
            .field("key_material", &format_args!("<{} bytes>", self.key_material.len()))
            .field("digest", &self.digest.map(hex::encode))
            .finish()
    }
}

/// Resolves an on-disk path to zero or one key record.
///
/// Absence is the normal outcome for unencrypted exports, so lookups never
/// fail.
pub trait KeyLookup: Send + Sync {
    fn find_key(&self, path: &Path) -> Option<KeyRecord>;

    /// Number of records available for lookup.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a path for comparison between the filesystem and the store:
/// forward slashes, no empty or `.` components, lowercase.
pub fn normalize_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
        .to_lowercase()
}

/// In-memory snapshot of the key store, keyed by normalized path.
#[derive(Debug, Default)]
pub struct KeyIndex {
    /// Normalized forms of the assets root: as given (when absolute) and
    /// canonicalized.
    root_prefixes: Vec<String>,
    by_path: HashMap<String, KeyRecord>,
    /// Lowercased file name -> normalized path, `None` once a name is ambiguous.
    by_name: HashMap<String, Option<String>>,
}

impl KeyIndex {
    /// Create an empty index. Paths under `assets_root` are matched relative
    /// to it, whether the store spells the root as given or canonicalized.
    pub fn new(assets_root: Option<&Path>) -> Self {
        let mut root_prefixes: Vec<String> = Vec::new();
        if let Some(root) = assets_root {
            let given = root.is_absolute().then(|| root.to_path_buf());
            for candidate in given.into_iter().chain(fs::canonicalize(root).ok()) {
                let prefix = normalize_path(&candidate.to_string_lossy());
                if !prefix.is_empty() && !root_prefixes.contains(&prefix) {
                    root_prefixes.push(prefix);
                }
            }
        }
        Self {
            root_prefixes,
            ..Default::default()
        }
    }

    /// Normalize and strip the assets root prefix, if present.
    pub fn relative_key(&self, raw: &str) -> String {
        let normalized = normalize_path(raw);
        for prefix in &self.root_prefixes {
            if let Some(rest) = normalized
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return rest.to_string();
            }
        }
        normalized
    }

    /// Insert a record. Returns `false` if a record for the same normalized
    /// path already exists; the first one stays authoritative.
    pub fn insert(&mut self, record: KeyRecord) -> bool {
        let key = self.relative_key(&record.attachment_path);
        if self.by_path.contains_key(&key) {
            return false;
        }
        if let Some(name) = &record.file_name {
            let name = name.to_lowercase();
            self.by_name
                .entry(name)
                .and_modify(|slot| *slot = None)
                .or_insert_with(|| Some(key.clone()));
        }
        self.by_path.insert(key, record);
        true
    }

    fn find_by_name(&self, name: &str) -> Option<&KeyRecord> {
        let path = self.by_name.get(&name.to_lowercase())?.as_ref()?;
        self.by_path.get(path)
    }
}

impl KeyLookup for KeyIndex {
    fn find_key(&self, path: &Path) -> Option<KeyRecord> {
        let key = self.relative_key(&path.to_string_lossy());
        if let Some(record) = self.by_path.get(&key) {
            return Some(record.clone());
        }

        // Exported copies are named `<hash>_<original name>`.
        let file_name = path.file_name()?.to_string_lossy();
        self.find_by_name(&file_name)
            .or_else(|| {
                file_name
                    .split_once('_')
                    .and_then(|(_, original)| self.find_by_name(original))
            })
            .cloned()
    }

    fn len(&self) -> usize {
        self.by_path.len()
    }
}

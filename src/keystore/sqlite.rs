use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::material::{decode_digest, decode_key_blob, decode_key_text};
use super::{KeyIndex, KeyLookup, KeyRecord};
use crate::error::{AuditError, Result};

/// Table that carries per-attachment key material.
pub const ATTACHMENT_TABLE: &str = "message_attachments";

/// Optional columns, selected as NULL when the schema lacks them.
const OPTIONAL_COLUMNS: [&str; 4] = ["fileName", "localKey", "key", "plaintextHash"];

/// Read-only key store backed by the decrypted SQLite database.
///
/// The table is read once into a [`KeyIndex`]; the connection is closed
/// before the walk starts, so external readers are never blocked.
#[derive(Debug)]
pub struct SqliteKeyStore {
    path: PathBuf,
    index: KeyIndex,
    skipped: usize,
}

impl SqliteKeyStore {
    /// Open `db_path` read-only and snapshot every usable key row.
    pub fn load(db_path: &Path, assets_root: Option<&Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| store_error(db_path, e))?;

        let columns = table_columns(&conn).map_err(|e| store_error(db_path, e))?;
        if columns.is_empty() {
            return Err(AuditError::KeyStore {
                path: db_path.to_path_buf(),
                reason: format!("table {ATTACHMENT_TABLE} not found"),
            });
        }
        if !columns.contains("path") {
            return Err(AuditError::KeyStore {
                path: db_path.to_path_buf(),
                reason: format!("table {ATTACHMENT_TABLE} has no path column"),
            });
        }

        let select = OPTIONAL_COLUMNS
            .iter()
            .map(|col| {
                if columns.contains(*col) {
                    format!("\"{col}\"")
                } else {
                    format!("NULL AS \"{col}\"")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT path, {select} FROM {ATTACHMENT_TABLE} WHERE path IS NOT NULL ORDER BY rowid"
        );

        let mut index = KeyIndex::new(assets_root);
        let mut skipped = 0usize;

        let mut stmt = conn.prepare(&sql).map_err(|e| store_error(db_path, e))?;
        let mut rows = stmt.query([]).map_err(|e| store_error(db_path, e))?;
        while let Some(row) = rows.next().map_err(|e| store_error(db_path, e))? {
            let path: String = match row.get_ref(0).map_err(|e| store_error(db_path, e))? {
                ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let file_name = text_value(row.get_ref(1).map_err(|e| store_error(db_path, e))?);
            let key_material = match key_value(row.get_ref(2).map_err(|e| store_error(db_path, e))?) {
                Some(material) => Some(material),
                None => key_value(row.get_ref(3).map_err(|e| store_error(db_path, e))?),
            };
            let digest = text_value(row.get_ref(4).map_err(|e| store_error(db_path, e))?)
                .and_then(|hex| decode_digest(&hex));

            let Some(key_material) = key_material else {
                debug!("no usable key material for {}", path);
                skipped += 1;
                continue;
            };

            let record = KeyRecord {
                attachment_path: path,
                file_name,
                key_material,
                digest,
            };
            let attachment_path = record.attachment_path.clone();
            if !index.insert(record) {
                debug!("duplicate key row for {} ignored", attachment_path);
                skipped += 1;
            }
        }

        if index.is_empty() {
            warn!(
                "no usable key records in {} ({} row(s) skipped)",
                db_path.display(),
                skipped
            );
        } else {
            info!(
                "loaded {} key record(s) from {} ({} skipped)",
                index.len(),
                db_path.display(),
                skipped
            );
        }

        Ok(Self {
            path: db_path.to_path_buf(),
            index,
            skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows that were present but unusable (no key, duplicate path).
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl KeyLookup for SqliteKeyStore {
    fn find_key(&self, path: &Path) -> Option<KeyRecord> {
        self.index.find_key(path)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

fn table_columns(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({ATTACHMENT_TABLE})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        _ => None,
    }
}

fn key_value(value: ValueRef<'_>) -> Option<Zeroizing<Vec<u8>>> {
    match value {
        ValueRef::Text(t) => decode_key_text(&String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => decode_key_blob(b),
        _ => None,
    }
}

fn store_error(path: &Path, e: rusqlite::Error) -> AuditError {
    AuditError::KeyStore {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

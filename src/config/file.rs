use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};

/// On-disk audit configuration, usually `asset-audit.yml`.
///
/// Every key is optional here; required values are enforced once the file is
/// merged with the command line in [`super::AuditConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Plaintext SQLite database holding attachment keys.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Root of the exported asset tree.
    #[serde(default)]
    pub assets_root: Option<PathBuf>,

    /// External OpenSSL-compatible tool. Unset means the in-process cipher.
    #[serde(default)]
    pub cipher_backend: Option<PathBuf>,

    /// Cap on files processed. 0 = unlimited.
    #[serde(default)]
    pub max_files: Option<usize>,

    #[serde(default)]
    pub audit_path: Option<PathBuf>,

    #[serde(default)]
    pub preview_dir: Option<PathBuf>,

    #[serde(default)]
    pub max_preview_bytes: Option<u64>,

    /// Largest keyed file that is decrypted. 0 = unlimited.
    #[serde(default)]
    pub max_keyed_bytes: Option<u64>,

    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

impl ConfigFile {
    /// Load a config file. Unlike optional project files, an explicitly named
    /// config that does not exist is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AuditError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| AuditError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("asset-audit.yml");
        std::fs::write(&path, "database_path: /data/db.sqlite\nmax_files: 25\n").unwrap();

        let file = ConfigFile::load_from(&path).unwrap();
        assert_eq!(file.database_path, Some(PathBuf::from("/data/db.sqlite")));
        assert_eq!(file.max_files, Some(25));
        assert!(file.assets_root.is_none());
    }

    #[test]
    fn test_empty_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("asset-audit.yml");
        std::fs::write(&path, "\n").unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = ConfigFile::load_from(&tmp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, AuditError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("asset-audit.yml");
        std::fs::write(&path, "databse_path: typo.db\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, AuditError::ConfigParse { .. }));
        assert!(err.is_configuration());
    }
}

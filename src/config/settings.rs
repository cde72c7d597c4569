use std::path::{Path, PathBuf};

use super::ConfigFile;
use crate::error::{AuditError, Result};

/// Default audit sink file name, relative to the working directory.
pub const DEFAULT_AUDIT_PATH: &str = "asset_audit.csv";

/// Default preview size cap: 64 MiB.
pub const DEFAULT_MAX_PREVIEW_BYTES: u64 = 64 * 1024 * 1024;

/// Default ceiling on keyed files, which are decrypted in memory: 1 GiB.
pub const DEFAULT_MAX_KEYED_BYTES: u64 = 1024 * 1024 * 1024;

/// Values supplied on the command line or through the environment.
/// They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub assets_root: Option<PathBuf>,
    pub cipher_backend: Option<PathBuf>,
    pub max_files: Option<usize>,
    pub audit_path: Option<PathBuf>,
    pub preview_dir: Option<PathBuf>,
    pub max_preview_bytes: Option<u64>,
    pub max_keyed_bytes: Option<u64>,
    pub jobs: Option<usize>,
    pub report_path: Option<PathBuf>,
}

/// Immutable configuration for one audit run, read once at start and passed
/// to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    pub database_path: PathBuf,
    pub assets_root: PathBuf,
    pub cipher_backend: Option<PathBuf>,
    /// 0 = unlimited.
    pub max_files: usize,
    pub audit_path: PathBuf,
    pub preview_dir: PathBuf,
    pub max_preview_bytes: u64,
    /// Keyed files larger than this are not decrypted. 0 = unlimited.
    pub max_keyed_bytes: u64,
    pub jobs: usize,
    pub report_path: Option<PathBuf>,
}

impl AuditConfig {
    /// Merge command line values over an optional config file, fill defaults
    /// and validate.
    pub fn resolve(overrides: ConfigOverrides, config_file: Option<&Path>) -> Result<Self> {
        let file = match config_file {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::default(),
        };

        let database_path = overrides
            .database_path
            .or(file.database_path)
            .ok_or(AuditError::MissingOption {
                name: "database_path",
            })?;
        let assets_root = overrides
            .assets_root
            .or(file.assets_root)
            .ok_or(AuditError::MissingOption {
                name: "assets_root",
            })?;
        let audit_path = overrides
            .audit_path
            .or(file.audit_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_PATH));
        let preview_dir = overrides
            .preview_dir
            .or(file.preview_dir)
            .unwrap_or_else(|| default_preview_dir(&audit_path));

        let config = Self {
            database_path,
            assets_root,
            cipher_backend: overrides.cipher_backend.or(file.cipher_backend),
            max_files: overrides.max_files.or(file.max_files).unwrap_or(0),
            audit_path,
            preview_dir,
            max_preview_bytes: overrides
                .max_preview_bytes
                .or(file.max_preview_bytes)
                .unwrap_or(DEFAULT_MAX_PREVIEW_BYTES),
            max_keyed_bytes: overrides
                .max_keyed_bytes
                .or(file.max_keyed_bytes)
                .unwrap_or(DEFAULT_MAX_KEYED_BYTES),
            jobs: overrides.jobs.or(file.jobs).unwrap_or(1),
            report_path: overrides.report_path.or(file.report_path),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the filesystem preconditions. Nothing is processed if this fails.
    pub fn validate(&self) -> Result<()> {
        if !self.database_path.is_file() {
            return Err(AuditError::DatabaseNotFound {
                path: self.database_path.clone(),
            });
        }
        if !self.assets_root.exists() {
            return Err(AuditError::AssetsRootNotFound {
                path: self.assets_root.clone(),
            });
        }
        if !self.assets_root.is_dir() {
            return Err(AuditError::AssetsRootNotDirectory {
                path: self.assets_root.clone(),
            });
        }
        if self.jobs == 0 {
            return Err(AuditError::InvalidOption {
                name: "jobs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// The cap as an `Option`, `None` meaning unlimited.
    pub fn file_limit(&self) -> Option<usize> {
        (self.max_files > 0).then_some(self.max_files)
    }

    /// The keyed-file ceiling as an `Option`, `None` meaning unlimited.
    pub fn keyed_size_limit(&self) -> Option<u64> {
        (self.max_keyed_bytes > 0).then_some(self.max_keyed_bytes)
    }
}

/// `out/asset_audit.csv` -> `out/asset_audit_previews`.
fn default_preview_dir(audit_path: &Path) -> PathBuf {
    let stem = audit_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset_audit".into());
    let dir_name = format!("{stem}_previews");
    match audit_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(dir_name),
        _ => PathBuf::from(dir_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("plain.db");
        std::fs::write(&db, b"").unwrap();
        let assets = tmp.path().join("assets");
        std::fs::create_dir(&assets).unwrap();
        (tmp, db, assets)
    }

    #[test]
    fn test_defaults_fill_in() {
        let (_tmp, db, assets) = fixture();
        let config = AuditConfig::resolve(
            ConfigOverrides {
                database_path: Some(db),
                assets_root: Some(assets),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(config.audit_path, PathBuf::from(DEFAULT_AUDIT_PATH));
        assert_eq!(config.preview_dir, PathBuf::from("asset_audit_previews"));
        assert_eq!(config.max_files, 0);
        assert_eq!(config.file_limit(), None);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.keyed_size_limit(), Some(DEFAULT_MAX_KEYED_BYTES));
        assert!(config.cipher_backend.is_none());
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let (tmp, db, assets) = fixture();
        let yml = tmp.path().join("asset-audit.yml");
        std::fs::write(
            &yml,
            format!(
                "database_path: {}\nassets_root: {}\nmax_files: 10\njobs: 4\n",
                db.display(),
                assets.display()
            ),
        )
        .unwrap();

        let config = AuditConfig::resolve(
            ConfigOverrides {
                max_files: Some(3),
                ..Default::default()
            },
            Some(&yml),
        )
        .unwrap();

        assert_eq!(config.max_files, 3);
        assert_eq!(config.file_limit(), Some(3));
        assert_eq!(config.jobs, 4);
        assert_eq!(config.database_path, db);
    }

    #[test]
    fn test_preview_dir_follows_audit_path() {
        let (tmp, db, assets) = fixture();
        let config = AuditConfig::resolve(
            ConfigOverrides {
                database_path: Some(db),
                assets_root: Some(assets),
                audit_path: Some(tmp.path().join("out").join("run1.csv")),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        assert_eq!(config.preview_dir, tmp.path().join("out").join("run1_previews"));
    }

    #[test]
    fn test_missing_database_is_configuration_error() {
        let (tmp, _db, assets) = fixture();
        let err = AuditConfig::resolve(
            ConfigOverrides {
                database_path: Some(tmp.path().join("missing.db")),
                assets_root: Some(assets),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();

        assert!(matches!(err, AuditError::DatabaseNotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_assets_root_must_be_directory() {
        let (_tmp, db, _assets) = fixture();
        let err = AuditConfig::resolve(
            ConfigOverrides {
                database_path: Some(db.clone()),
                assets_root: Some(db),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();

        assert!(matches!(err, AuditError::AssetsRootNotDirectory { .. }));
    }

    #[test]
    fn test_missing_required_option() {
        let err = AuditConfig::resolve(ConfigOverrides::default(), None).unwrap_err();
        assert!(matches!(
            err,
            AuditError::MissingOption {
                name: "database_path"
            }
        ));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let (_tmp, db, assets) = fixture();
        let err = AuditConfig::resolve(
            ConfigOverrides {
                database_path: Some(db),
                assets_root: Some(assets),
                jobs: Some(0),
                ..Default::default()
            },
            None,
        )
        .unwrap_err();

        assert!(matches!(err, AuditError::InvalidOption { name: "jobs", .. }));
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuditSummary;
use crate::config::AuditConfig;
use crate::error::Result;

/// Machine-readable record of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub database_path: PathBuf,
    pub assets_root: PathBuf,
    pub audit_path: PathBuf,
    pub preview_dir: PathBuf,
    /// `native` or `external`.
    pub backend: String,
    pub key_records: usize,
    /// Key-store rows without usable key material.
    pub skipped_key_rows: usize,
    pub max_files: usize,
    pub jobs: usize,
    pub summary: AuditSummary,
}

impl RunReport {
    /// Build a report for a run that started at `started_at` and just ended.
    pub fn finish(
        config: &AuditConfig,
        backend: &str,
        key_records: usize,
        skipped_key_rows: usize,
        started_at: DateTime<Utc>,
        summary: AuditSummary,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            database_path: config.database_path.clone(),
            assets_root: config.assets_root.clone(),
            audit_path: config.audit_path.clone(),
            preview_dir: config.preview_dir.clone(),
            backend: backend.to_string(),
            key_records,
            skipped_key_rows,
            max_files: config.max_files,
            jobs: config.jobs,
            summary,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_report_written_as_json() {
        let tmp = TempDir::new().unwrap();
        let config = AuditConfig {
            database_path: "keys.db".into(),
            assets_root: "assets".into(),
            cipher_backend: None,
            max_files: 10,
            audit_path: "asset_audit.csv".into(),
            preview_dir: "asset_audit_previews".into(),
            max_preview_bytes: 1024,
            max_keyed_bytes: 0,
            jobs: 2,
            report_path: None,
        };
        let summary = AuditSummary {
            files: 3,
            decrypted: 1,
            already_plain: 1,
            failed: 1,
        };
        let report = RunReport::finish(&config, "native", 2, 1, Utc::now(), summary);
        assert!(report.finished_at >= report.started_at);

        let path = tmp.path().join("reports").join("run.json");
        report.write_to(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["backend"], "native");
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["jobs"], 2);

        let back: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}

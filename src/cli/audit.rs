use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditSummary, Auditor, RunReport};
use crate::config::{AuditConfig, ConfigOverrides};
use crate::error::Result;
use crate::keystore::{KeyLookup, SqliteKeyStore};

/// Audit every file under the assets root and write the CSV table.
pub async fn run(overrides: ConfigOverrides, config_file: Option<&Path>) -> Result<AuditSummary> {
    let started_at = Utc::now();
    let config = AuditConfig::resolve(overrides, config_file)?;

    let store = SqliteKeyStore::load(&config.database_path, Some(&config.assets_root))?;
    let key_records = store.len();
    let skipped_key_rows = store.skipped();
    eprintln!(
        "asset-audit: {} key record(s) loaded from {}",
        key_records,
        store.path().display()
    );
    if skipped_key_rows > 0 {
        eprintln!(
            "asset-audit: {} key row(s) without usable key material",
            skipped_key_rows
        );
    }

    let auditor = Auditor::new(config, Arc::new(store));
    let summary = auditor.run().await?;
    let config = auditor.config();

    eprintln!("asset-audit: {}", summary);
    eprintln!(
        "asset-audit: audit table written to {}",
        config.audit_path.display()
    );

    if let Some(report_path) = &config.report_path {
        RunReport::finish(
            config,
            auditor.backend_name(),
            key_records,
            skipped_key_rows,
            started_at,
            summary,
        )
        .write_to(report_path)?;
        eprintln!("asset-audit: run report written to {}", report_path.display());
    }

    Ok(summary)
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::sink::{AuditSink, CsvAuditSink};
use super::walker::{discover, CandidateFile, WalkItem};
use super::{AuditEntry, AuditSummary};
use crate::cipher::DecryptionEngine;
use crate::classify::{sniff, ContentClassifier, HEAD_SAMPLE, UNKNOWN_MIME};
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::keystore::{KeyLookup, KeyRecord};

/// Everything needed to turn one walk item into one audit row.
///
/// `process` never fails: every problem below the run level ends up in the
/// row's `mode`/`error` fields.
pub struct FilePipeline {
    keys: Arc<dyn KeyLookup>,
    engine: DecryptionEngine,
    classifier: ContentClassifier,
    /// Keyed files are held in memory whole; larger ones are refused.
    keyed_size_limit: Option<u64>,
}

impl FilePipeline {
    pub fn new(
        keys: Arc<dyn KeyLookup>,
        engine: DecryptionEngine,
        classifier: ContentClassifier,
        keyed_size_limit: Option<u64>,
    ) -> Self {
        Self {
            keys,
            engine,
            classifier,
            keyed_size_limit,
        }
    }

    pub fn engine(&self) -> &DecryptionEngine {
        &self.engine
    }

    pub fn process(&self, item: &WalkItem) -> AuditEntry {
        let entry = match item {
            WalkItem::File(file) => self.process_file(file),
            WalkItem::Unreadable { rel_path, error } => {
                AuditEntry::unexamined(rel_path.clone(), error.clone())
            }
        };
        debug!(
            "{}: mode={} mime={} {}",
            entry.path, entry.mode, entry.mime_guess, entry.error
        );
        entry
    }

    fn process_file(&self, file: &CandidateFile) -> AuditEntry {
        match self.keys.find_key(Path::new(&file.rel_path)) {
            Some(key) => self.decrypt_keyed(file, &key),
            None => self.classify_plain(file),
        }
    }

    fn classify_plain(&self, file: &CandidateFile) -> AuditEntry {
        match self.classifier.classify_file(&file.rel_path, &file.path) {
            Ok(classification) => {
                let note = if classification.looks_encrypted() {
                    format!(
                        "no key record; content looks encrypted (entropy {:.2} bits/byte)",
                        classification.head_entropy
                    )
                } else {
                    String::new()
                };
                AuditEntry::plain(file.rel_path.clone(), &classification, note)
            }
            Err(e) => {
                AuditEntry::unexamined(file.rel_path.clone(), format!("classify failed: {e}"))
            }
        }
    }

    fn decrypt_keyed(&self, file: &CandidateFile, key: &KeyRecord) -> AuditEntry {
        if let Some(limit) = self.keyed_size_limit.filter(|limit| file.size > *limit) {
            return AuditEntry::failed(
                file.rel_path.clone(),
                false,
                format!(
                    "other-error: file too large: {} bytes, limit {}",
                    file.size, limit
                ),
            );
        }

        let raw = match fs::read(&file.path) {
            Ok(raw) => raw,
            Err(e) => {
                return AuditEntry::failed(
                    file.rel_path.clone(),
                    false,
                    format!("other-error: read failed: {e}"),
                )
            }
        };

        let decryption = self.engine.decrypt(&raw, key);
        let was_encrypted = decryption.was_encrypted();
        let failures = decryption.failure_summary();

        let Some((mode, plaintext)) = decryption.into_winner() else {
            return AuditEntry::failed(file.rel_path.clone(), was_encrypted, failures);
        };

        match self.classifier.classify(&file.rel_path, &plaintext) {
            Ok(classification) => {
                AuditEntry::decrypted(file.rel_path.clone(), mode, &classification)
            }
            Err(e) => {
                let head = &plaintext[..plaintext.len().min(HEAD_SAMPLE)];
                AuditEntry {
                    path: file.rel_path.clone(),
                    was_encrypted: true,
                    mode: mode.into(),
                    preview_path: String::new(),
                    mime_guess: sniff(head).unwrap_or(UNKNOWN_MIME).to_string(),
                    error: format!("preview failed: {e}"),
                }
            }
        }
    }
}

/// Drives one audit run: walk, per-file pipeline, sink.
pub struct Auditor {
    config: Arc<AuditConfig>,
    pipeline: Arc<FilePipeline>,
}

impl Auditor {
    /// Build an auditor over an already loaded key index.
    pub fn new(config: AuditConfig, keys: Arc<dyn KeyLookup>) -> Self {
        let engine = DecryptionEngine::from_backend_path(config.cipher_backend.as_deref());
        let classifier = ContentClassifier::new(&config.preview_dir, config.max_preview_bytes);
        let keyed_size_limit = config.keyed_size_limit();
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(FilePipeline::new(
                keys,
                engine,
                classifier,
                keyed_size_limit,
            )),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.pipeline.engine().backend_name()
    }

    /// Run into the configured CSV sink. The sink is truncated first.
    pub async fn run(&self) -> Result<AuditSummary> {
        let mut sink = CsvAuditSink::create(&self.config.audit_path)?;
        let summary = self.run_into(&mut sink).await?;
        info!("{} row(s) written to {}", sink.rows(), sink.path().display());
        Ok(summary)
    }

    /// Walk the assets root and record one row per item into `sink`, in walk
    /// order.
    pub async fn run_into<S: AuditSink + ?Sized>(&self, sink: &mut S) -> Result<AuditSummary> {
        fs::create_dir_all(&self.config.preview_dir).map_err(|e| AuditError::Preview {
            path: self.config.preview_dir.clone(),
            reason: e.to_string(),
        })?;

        let root = fs::canonicalize(&self.config.assets_root)?;
        let exclude = self.exclusions();
        let items = discover(&root, &exclude, self.config.file_limit());
        info!(
            "auditing {} file(s) under {} with {} backend, {} job(s)",
            items.len(),
            root.display(),
            self.backend_name(),
            self.config.jobs
        );

        let mut summary = AuditSummary::default();
        for window in items.chunks(self.config.jobs.max(1)) {
            let handles: Vec<_> = window
                .iter()
                .cloned()
                .map(|item| {
                    let pipeline = Arc::clone(&self.pipeline);
                    tokio::task::spawn_blocking(move || pipeline.process(&item))
                })
                .collect();

            for (item, handle) in window.iter().zip(handles) {
                let entry = match handle.await {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("worker for {} failed: {}", item.rel_path(), e);
                        AuditEntry::failed(
                            item.rel_path(),
                            false,
                            format!("other-error: worker failed: {e}"),
                        )
                    }
                };
                sink.record(&entry)?;
                summary.tally(&entry);
            }
        }

        info!("audit finished: {}", summary);
        Ok(summary)
    }

    /// Outputs that may sit inside the assets root and must not be audited.
    fn exclusions(&self) -> Vec<PathBuf> {
        [&self.config.preview_dir, &self.config.audit_path]
            .into_iter()
            .filter_map(|path| fs::canonicalize(path).ok())
            .collect()
    }
}

pub mod report;
pub mod runner;
pub mod sink;
pub mod walker;

use serde::{Deserialize, Serialize};

use crate::cipher::CipherMode;
use crate::classify::Classification;

pub use report::RunReport;
pub use runner::{Auditor, FilePipeline};
pub use sink::{AuditSink, CsvAuditSink, AUDIT_HEADER};
pub use walker::{discover, CandidateFile, WalkItem};

/// Which layout produced the row's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// No key record; the raw bytes were classified as-is.
    None,
    Authenticated,
    Legacy,
    /// A key record existed but no layout produced plaintext.
    Failed,
}

impl From<CipherMode> for AuditMode {
    fn from(mode: CipherMode) -> Self {
        match mode {
            CipherMode::Authenticated => AuditMode::Authenticated,
            CipherMode::Legacy => AuditMode::Legacy,
        }
    }
}

impl std::fmt::Display for AuditMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditMode::None => write!(f, "none"),
            AuditMode::Authenticated => write!(f, "authenticated"),
            AuditMode::Legacy => write!(f, "legacy"),
            AuditMode::Failed => write!(f, "failed"),
        }
    }
}

/// One row of the audit sink. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Path relative to the assets root, `/`-separated.
    pub path: String,

    /// A key record existed and at least one layout fit the file.
    pub was_encrypted: bool,

    pub mode: AuditMode,

    /// Human-viewable artifact, or empty.
    pub preview_path: String,

    /// Sniffed content type, `unknown`, or empty when nothing was recovered.
    pub mime_guess: String,

    /// Why the file is not fully resolved; empty otherwise.
    pub error: String,
}

impl AuditEntry {
    /// A file without a key record, classified from its raw bytes.
    pub fn plain(path: impl Into<String>, classification: &Classification, error: String) -> Self {
        Self {
            path: path.into(),
            was_encrypted: false,
            mode: AuditMode::None,
            preview_path: classification.preview_path.to_string_lossy().into_owned(),
            mime_guess: classification.mime_guess.clone(),
            error,
        }
    }

    /// A file recovered by one of the cipher layouts.
    pub fn decrypted(
        path: impl Into<String>,
        mode: CipherMode,
        classification: &Classification,
    ) -> Self {
        Self {
            path: path.into(),
            was_encrypted: true,
            mode: mode.into(),
            preview_path: classification.preview_path.to_string_lossy().into_owned(),
            mime_guess: classification.mime_guess.clone(),
            error: String::new(),
        }
    }

    /// A keyed file that could not be recovered.
    pub fn failed(path: impl Into<String>, was_encrypted: bool, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            was_encrypted,
            mode: AuditMode::Failed,
            preview_path: String::new(),
            mime_guess: String::new(),
            error: error.into(),
        }
    }

    /// A file or directory that could not even be examined.
    pub fn unexamined(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            was_encrypted: false,
            mode: AuditMode::None,
            preview_path: String::new(),
            mime_guess: String::new(),
            error: error.into(),
        }
    }
}

/// Counts shown at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub files: usize,
    pub decrypted: usize,
    pub already_plain: usize,
    pub failed: usize,
}

impl AuditSummary {
    pub fn tally(&mut self, entry: &AuditEntry) {
        self.files += 1;
        match entry.mode {
            AuditMode::Authenticated | AuditMode::Legacy => self.decrypted += 1,
            AuditMode::None => self.already_plain += 1,
            AuditMode::Failed => self.failed += 1,
        }
    }
}

impl std::fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s) audited: {} decrypted, {} already plain, {} failed",
            self.files, self.decrypted, self.already_plain, self.failed
        )
    }
}

pub mod entropy;
pub mod sniff;

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{AuditError, Result};

pub use entropy::{shannon_entropy, ENCRYPTED_ENTROPY_THRESHOLD};
pub use sniff::{extension_for, sniff, UNKNOWN_MIME};

/// Bytes read from the front of a file for sniffing and entropy.
pub const HEAD_SAMPLE: usize = 4096;

/// Outcome of classifying one plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Sniffed MIME type, or [`UNKNOWN_MIME`].
    pub mime_guess: String,
    pub preview_path: PathBuf,
    /// Entropy of the first [`HEAD_SAMPLE`] bytes.
    pub head_entropy: f64,
    /// Bytes written to the preview.
    pub preview_bytes: u64,
}

impl Classification {
    pub fn is_unknown(&self) -> bool {
        self.mime_guess == UNKNOWN_MIME
    }

    /// Unidentified content whose head is dense enough to be ciphertext.
    pub fn looks_encrypted(&self) -> bool {
        self.is_unknown() && self.head_entropy > ENCRYPTED_ENTROPY_THRESHOLD
    }
}

/// Sniffs content and writes preview artifacts under one directory.
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    preview_dir: PathBuf,
    max_preview_bytes: u64,
}

impl ContentClassifier {
    pub fn new(preview_dir: impl Into<PathBuf>, max_preview_bytes: u64) -> Self {
        Self {
            preview_dir: preview_dir.into(),
            max_preview_bytes,
        }
    }

    /// Deterministic preview location: `<preview_dir>/<rel_path>.<ext>`.
    /// Parent-directory components are dropped so previews cannot escape
    /// the preview directory.
    pub fn preview_path_for(&self, rel_path: &str, mime: &str) -> PathBuf {
        let parts: Vec<&str> = rel_path
            .split(['/', '\\'])
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .collect();
        let mut path = self.preview_dir.clone();
        let (name, dirs) = match parts.split_last() {
            Some((name, dirs)) => (*name, dirs),
            None => ("preview", &[][..]),
        };
        for dir in dirs {
            path.push(dir);
        }
        path.push(format!("{}.{}", name, extension_for(mime)));
        path
    }

    /// Classify recovered plaintext held in memory and write its preview.
    pub fn classify(&self, rel_path: &str, plaintext: &[u8]) -> Result<Classification> {
        let head = &plaintext[..plaintext.len().min(HEAD_SAMPLE)];
        let mime = sniff(head).unwrap_or(UNKNOWN_MIME);
        let preview_path = self.preview_path_for(rel_path, mime);

        let limit = self.preview_limit(plaintext.len() as u64);
        let preview_bytes = self.write_preview(&preview_path, &plaintext[..limit], io::empty())?;

        Ok(Classification {
            mime_guess: mime.to_string(),
            preview_path,
            head_entropy: shannon_entropy(head),
            preview_bytes,
        })
    }

    /// Classify a file by streaming it: only the head is held in memory, the
    /// rest is copied into the preview through a bounded reader.
    pub fn classify_file(&self, rel_path: &str, source: &Path) -> Result<Classification> {
        let mut file = File::open(source)?;
        let mut head = Vec::with_capacity(HEAD_SAMPLE);
        (&mut file).take(HEAD_SAMPLE as u64).read_to_end(&mut head)?;

        let mime = sniff(&head).unwrap_or(UNKNOWN_MIME);
        let preview_path = self.preview_path_for(rel_path, mime);

        let head_limit = self.preview_limit(head.len() as u64);
        let remaining = self.max_preview_bytes.saturating_sub(head_limit as u64);
        let preview_bytes =
            self.write_preview(&preview_path, &head[..head_limit], file.take(remaining))?;

        Ok(Classification {
            mime_guess: mime.to_string(),
            preview_path,
            head_entropy: shannon_entropy(&head),
            preview_bytes,
        })
    }

    fn preview_limit(&self, len: u64) -> usize {
        len.min(self.max_preview_bytes) as usize
    }

    /// Write `head` followed by `rest` to `target` through a temporary file
    /// in the same directory, then rename over any previous preview.
    fn write_preview(&self, target: &Path, head: &[u8], mut rest: impl Read) -> Result<u64> {
        let preview_error = |reason: String| AuditError::Preview {
            path: target.to_path_buf(),
            reason,
        };

        let parent = target.parent().unwrap_or(&self.preview_dir);
        fs::create_dir_all(parent).map_err(|e| preview_error(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| preview_error(e.to_string()))?;
        tmp.write_all(head).map_err(|e| preview_error(e.to_string()))?;
        let copied = io::copy(&mut rest, &mut tmp).map_err(|e| preview_error(e.to_string()))?;
        tmp.flush().map_err(|e| preview_error(e.to_string()))?;
        tmp.persist(target)
            .map_err(|e| preview_error(e.error.to_string()))?;

        Ok(head.len() as u64 + copied)
    }
}

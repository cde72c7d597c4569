use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Serialize;

use crate::cipher::{CipherMode, DecryptionEngine};
use crate::classify::{shannon_entropy, sniff, HEAD_SAMPLE, UNKNOWN_MIME};
use crate::keystore::material::decode_key_text;
use crate::keystore::KeyRecord;

#[derive(Debug, Serialize)]
struct InspectReport {
    path: String,
    size: usize,
    raw_mime: String,
    head_entropy: f64,
    backend: String,
    attempts: Vec<AttemptReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plaintext_mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plaintext_len: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AttemptReport {
    mode: CipherMode,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn mime_of(bytes: &[u8]) -> String {
    sniff(&bytes[..bytes.len().min(HEAD_SAMPLE)])
        .unwrap_or(UNKNOWN_MIME)
        .to_string()
}

/// Run the layout detector and engine on one file and print what happened.
/// Nothing is written to disk.
pub async fn run(file: &Path, key: Option<&str>, openssl: Option<&Path>) -> anyhow::Result<()> {
    let raw = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let head = &raw[..raw.len().min(HEAD_SAMPLE)];
    let engine = DecryptionEngine::from_backend_path(openssl);

    let mut report = InspectReport {
        path: file.display().to_string(),
        size: raw.len(),
        raw_mime: mime_of(&raw),
        head_entropy: shannon_entropy(head),
        backend: engine.backend_name().to_string(),
        attempts: Vec::new(),
        plaintext_mime: None,
        plaintext_len: None,
    };

    if let Some(text) = key {
        let Some(key_material) = decode_key_text(text) else {
            bail!("key is neither hex nor base64 of at least 32 bytes");
        };
        let record = KeyRecord {
            attachment_path: report.path.clone(),
            file_name: None,
            key_material,
            digest: None,
        };

        let decryption = engine.decrypt(&raw, &record);
        report.attempts = decryption
            .attempts
            .iter()
            .map(|attempt| AttemptReport {
                mode: attempt.mode,
                outcome: attempt.outcome_kind(),
                detail: attempt.failure().map(ToString::to_string),
            })
            .collect();
        if let Some((_, plaintext)) = decryption.into_winner() {
            report.plaintext_mime = Some(mime_of(&plaintext));
            report.plaintext_len = Some(plaintext.len());
        }
    }

    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{json}");
    Ok(())
}

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use super::external::ExternalBackend;
use super::native::NativeBackend;
use super::{
    candidate_layouts, AttemptFailure, AuthenticatedLayout, CipherBackend, CipherMode,
    LegacyLayout, KEY_LEN,
};
use crate::keystore::KeyRecord;

const DIGEST_CHUNK: usize = 64 * 1024;

/// Result of one layout attempt. Plaintext only exists on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(Vec<u8>),
    Failed(AttemptFailure),
}

/// One try of one layout against one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionAttempt {
    pub mode: CipherMode,
    pub outcome: AttemptOutcome,
}

impl DecryptionAttempt {
    pub fn plaintext(&self) -> Option<&[u8]> {
        match &self.outcome {
            AttemptOutcome::Success(plain) => Some(plain),
            AttemptOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::Failed(failure) => Some(failure),
        }
    }

    /// Whether the input was long enough for this layout to be tried.
    pub fn layout_applied(&self) -> bool {
        !matches!(
            self.outcome,
            AttemptOutcome::Failed(AttemptFailure::LayoutTooShort { .. })
        )
    }

    /// Short outcome name: `success` or the failure kind.
    pub fn outcome_kind(&self) -> &'static str {
        match &self.outcome {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::Failed(failure) => failure.kind(),
        }
    }
}

/// Every attempt made for one file, in order. Stops after the first success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decryption {
    pub attempts: Vec<DecryptionAttempt>,
}

impl Decryption {
    /// The successful attempt, if any. Always the last one.
    pub fn winner(&self) -> Option<&DecryptionAttempt> {
        self.attempts.last().filter(|a| a.plaintext().is_some())
    }

    pub fn into_winner(self) -> Option<(CipherMode, Vec<u8>)> {
        match self.attempts.into_iter().last() {
            Some(DecryptionAttempt {
                mode,
                outcome: AttemptOutcome::Success(plain),
            }) => Some((mode, plain)),
            _ => None,
        }
    }

    /// True when at least one layout passed its shape checks.
    pub fn was_encrypted(&self) -> bool {
        self.attempts.iter().any(DecryptionAttempt::layout_applied)
    }

    /// `authenticated: authentication-failed; legacy: padding-invalid: ...`
    pub fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter_map(|a| a.failure().map(|f| format!("{}: {}", a.mode, f)))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Tries each candidate layout against raw bytes through a pluggable
/// [`CipherBackend`].
pub struct DecryptionEngine {
    backend: Box<dyn CipherBackend>,
}

impl std::fmt::Debug for DecryptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionEngine")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Default for DecryptionEngine {
    fn default() -> Self {
        Self::native()
    }
}

impl DecryptionEngine {
    pub fn new(backend: Box<dyn CipherBackend>) -> Self {
        Self { backend }
    }

    pub fn native() -> Self {
        Self::new(Box::new(NativeBackend))
    }

    /// External tool when one is configured, in-process otherwise.
    pub fn from_backend_path(program: Option<&Path>) -> Self {
        match program {
            Some(program) => Self::new(Box::new(ExternalBackend::new(program))),
            None => Self::native(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Try a single layout.
    pub fn attempt(
        &self,
        raw: &[u8],
        key_material: &[u8],
        mode: CipherMode,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let key: Zeroizing<[u8; KEY_LEN]> =
            Zeroizing::new(key_material.try_into().map_err(|_| {
                AttemptFailure::other(format!(
                    "key must be {} bytes, got {}",
                    KEY_LEN,
                    key_material.len()
                ))
            })?);

        match mode {
            CipherMode::Authenticated => {
                let layout = AuthenticatedLayout::parse(raw)?;
                self.backend.open_authenticated(&key, &layout)
            }
            CipherMode::Legacy => {
                let layout = LegacyLayout::parse(raw)?;
                self.backend.open_legacy(&key, &layout)
            }
        }
    }

    /// Try every candidate layout in order and stop at the first success.
    /// A plaintext that contradicts the record's digest is not a success.
    pub fn decrypt(&self, raw: &[u8], key: &KeyRecord) -> Decryption {
        let mut attempts = Vec::new();
        for &mode in candidate_layouts(true) {
            let outcome = match self.attempt(raw, &key.key_material, mode) {
                Ok(plain) => match key.digest {
                    Some(expected) if !matches_digest(&plain, &expected) => AttemptOutcome::Failed(
                        AttemptFailure::other("plaintext digest mismatch"),
                    ),
                    _ => AttemptOutcome::Success(plain),
                },
                Err(failure) => AttemptOutcome::Failed(failure),
            };

            let attempt = DecryptionAttempt { mode, outcome };
            debug!(
                "{} attempt via {}: {}",
                mode,
                self.backend.name(),
                attempt.outcome_kind()
            );
            let succeeded = attempt.plaintext().is_some();
            attempts.push(attempt);
            if succeeded {
                break;
            }
        }
        Decryption { attempts }
    }
}

/// Compare the SHA-256 of `plaintext` against `expected`, hashing in chunks.
pub fn matches_digest(plaintext: &[u8], expected: &[u8; 32]) -> bool {
    let mut hasher = Sha256::new();
    for chunk in plaintext.chunks(DIGEST_CHUNK) {
        hasher.update(chunk);
    }
    hasher.finalize().as_slice() == expected
}

//! Layout detection and decryption of attachment blobs.
//!
//! Two on-disk layouts are understood, both keyed by a 256-bit AES key:
//!
//! | mode            | layout                                   |
//! |-----------------|------------------------------------------|
//! | `authenticated` | `nonce (12) ‖ ciphertext ‖ tag (16)`     |
//! | `legacy`        | `iv (16) ‖ ciphertext` (PKCS#7 padded)   |
//!
//! Layout parsing lives in [`layout`] and is shared by every
//! [`CipherBackend`], so the in-process and external backends report
//! identical failures for the same input.

pub mod engine;
pub mod external;
pub mod layout;
pub mod native;

use serde::Serialize;

pub use engine::{AttemptOutcome, DecryptionAttempt, DecryptionEngine};
pub use layout::{candidate_layouts, AuthenticatedLayout, LegacyLayout};

/// AES-256 key length.
pub const KEY_LEN: usize = 32;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const CBC_IV_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;

/// A cipher layout the engine can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// AES-256-GCM, tag checked before any plaintext is released.
    Authenticated,
    /// AES-256-CBC with PKCS#7 padding. No integrity check.
    Legacy,
}

impl std::fmt::Display for CipherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherMode::Authenticated => write!(f, "authenticated"),
            CipherMode::Legacy => write!(f, "legacy"),
        }
    }
}

/// Why a single attempt did not yield plaintext.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("layout-too-short: {len} bytes, need at least {min}")]
    LayoutTooShort { len: usize, min: usize },

    #[error("authentication-failed")]
    AuthenticationFailed,

    #[error("padding-invalid: {reason}")]
    PaddingInvalid { reason: String },

    #[error("other-error: {reason}")]
    Other { reason: String },
}

impl AttemptFailure {
    /// Stable outcome name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptFailure::LayoutTooShort { .. } => "layout-too-short",
            AttemptFailure::AuthenticationFailed => "authentication-failed",
            AttemptFailure::PaddingInvalid { .. } => "padding-invalid",
            AttemptFailure::Other { .. } => "other-error",
        }
    }

    pub(crate) fn other(reason: impl Into<String>) -> Self {
        AttemptFailure::Other {
            reason: reason.into(),
        }
    }
}

/// A way of running the two ciphers. Implementations receive layouts that
/// already passed length and alignment checks and a key of exactly
/// [`KEY_LEN`] bytes.
pub trait CipherBackend: Send + Sync {
    /// Verify the tag and return plaintext, or
    /// [`AttemptFailure::AuthenticationFailed`].
    fn open_authenticated(
        &self,
        key: &[u8; KEY_LEN],
        layout: &AuthenticatedLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure>;

    /// Decrypt and strip padding, or [`AttemptFailure::PaddingInvalid`].
    fn open_legacy(
        &self,
        key: &[u8; KEY_LEN],
        layout: &LegacyLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure>;

    /// Name of this backend (for logging and reports).
    fn name(&self) -> &str;
}

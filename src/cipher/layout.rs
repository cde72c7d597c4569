use super::{AttemptFailure, CipherMode, BLOCK_LEN, CBC_IV_LEN, GCM_NONCE_LEN, GCM_TAG_LEN};

/// Modes to try, in order. The authenticated layout comes first because a
/// wrong guess fails its tag check; the legacy layout can "succeed" into
/// garbage and is only tried after it.
pub fn candidate_layouts(key_present: bool) -> &'static [CipherMode] {
    if key_present {
        &[CipherMode::Authenticated, CipherMode::Legacy]
    } else {
        &[]
    }
}

/// Borrowed view of `nonce ‖ ciphertext ‖ tag`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedLayout<'a> {
    pub nonce: &'a [u8; GCM_NONCE_LEN],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8; GCM_TAG_LEN],
}

impl<'a> AuthenticatedLayout<'a> {
    pub const MIN_LEN: usize = GCM_NONCE_LEN + GCM_TAG_LEN;

    pub fn parse(raw: &'a [u8]) -> Result<Self, AttemptFailure> {
        if raw.len() < Self::MIN_LEN {
            return Err(AttemptFailure::LayoutTooShort {
                len: raw.len(),
                min: Self::MIN_LEN,
            });
        }
        let (nonce, rest) = raw.split_at(GCM_NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - GCM_TAG_LEN);
        Ok(Self {
            nonce: nonce.try_into().map_err(|_| AttemptFailure::other("nonce split"))?,
            ciphertext,
            tag: tag.try_into().map_err(|_| AttemptFailure::other("tag split"))?,
        })
    }
}

/// Borrowed view of `iv ‖ ciphertext`.
#[derive(Debug, Clone, Copy)]
pub struct LegacyLayout<'a> {
    pub iv: &'a [u8; CBC_IV_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> LegacyLayout<'a> {
    /// IV plus at least one block.
    pub const MIN_LEN: usize = CBC_IV_LEN + BLOCK_LEN;

    pub fn parse(raw: &'a [u8]) -> Result<Self, AttemptFailure> {
        if raw.len() < Self::MIN_LEN {
            return Err(AttemptFailure::LayoutTooShort {
                len: raw.len(),
                min: Self::MIN_LEN,
            });
        }
        let (iv, ciphertext) = raw.split_at(CBC_IV_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(AttemptFailure::PaddingInvalid {
                reason: format!(
                    "ciphertext of {} bytes is not block aligned",
                    ciphertext.len()
                ),
            });
        }
        Ok(Self {
            iv: iv.try_into().map_err(|_| AttemptFailure::other("iv split"))?,
            ciphertext,
        })
    }
}

/// Validate and strip PKCS#7 padding from a decrypted buffer.
pub fn strip_pkcs7(mut plaintext: Vec<u8>) -> Result<Vec<u8>, AttemptFailure> {
    let pad = match plaintext.last() {
        Some(&pad) => pad as usize,
        None => {
            return Err(AttemptFailure::PaddingInvalid {
                reason: "empty plaintext".into(),
            })
        }
    };
    if pad == 0 || pad > BLOCK_LEN || pad > plaintext.len() {
        return Err(AttemptFailure::PaddingInvalid {
            reason: format!("bad padding length {pad}"),
        });
    }
    let body_len = plaintext.len() - pad;
    if plaintext[body_len..].iter().any(|&b| b as usize != pad) {
        return Err(AttemptFailure::PaddingInvalid {
            reason: "inconsistent padding bytes".into(),
        });
    }
    plaintext.truncate(body_len);
    Ok(plaintext)
}

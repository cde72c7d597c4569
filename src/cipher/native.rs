use aes::cipher::{BlockDecrypt, KeyInit};
use aes::{Aes256Dec, Block};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Nonce, Tag};

use super::layout::strip_pkcs7;
use super::{AttemptFailure, AuthenticatedLayout, CipherBackend, LegacyLayout, BLOCK_LEN, KEY_LEN};

/// In-process AES via the RustCrypto crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl CipherBackend for NativeBackend {
    fn open_authenticated(
        &self,
        key: &[u8; KEY_LEN],
        layout: &AuthenticatedLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AttemptFailure::other(format!("aes-gcm key: {e}")))?;

        let mut buffer = layout.ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(layout.nonce),
                b"",
                &mut buffer,
                Tag::from_slice(layout.tag),
            )
            .map_err(|_| AttemptFailure::AuthenticationFailed)?;
        Ok(buffer)
    }

    fn open_legacy(
        &self,
        key: &[u8; KEY_LEN],
        layout: &LegacyLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let cipher = Aes256Dec::new_from_slice(key)
            .map_err(|e| AttemptFailure::other(format!("aes key: {e}")))?;

        let mut plaintext = Vec::with_capacity(layout.ciphertext.len());
        let mut previous = *layout.iv;
        for chunk in layout.ciphertext.chunks_exact(BLOCK_LEN) {
            let mut current = [0u8; BLOCK_LEN];
            current.copy_from_slice(chunk);

            let mut block = Block::from(current);
            cipher.decrypt_block(&mut block);
            plaintext.extend(block.iter().zip(previous.iter()).map(|(b, p)| b ^ p));
            previous = current;
        }

        strip_pkcs7(plaintext)
    }

    fn name(&self) -> &str {
        "native"
    }
}

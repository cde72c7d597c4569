use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use tracing::{debug, warn};

use super::{
    AttemptFailure, AuthenticatedLayout, CipherBackend, LegacyLayout, GCM_NONCE_LEN, KEY_LEN,
};

/// Known plaintext sealed under an all-zero key and nonce to test the tool.
const AEAD_PROBE_PLAINTEXT: &[u8] = b"asset-audit aead probe";

/// Delegates to an OpenSSL-compatible `enc` command line tool.
///
/// The tool reads ciphertext on stdin and writes plaintext on stdout. A
/// nonzero exit is a cipher rejection; a tool that cannot be spawned is an
/// `other-error`.
///
/// Stock `openssl enc` refuses AEAD ciphers outright, which looks exactly like
/// a failed tag check. Before the first authenticated attempt the tool is
/// asked to open a known-answer GCM sample; if it cannot, every
/// authenticated attempt is an `other-error` instead of
/// `authentication-failed`.
#[derive(Debug, Clone)]
pub struct ExternalBackend {
    program: PathBuf,
    aead: OnceLock<Result<(), AttemptFailure>>,
}

impl ExternalBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            aead: OnceLock::new(),
        }
    }

    /// Whether the tool can open GCM. Checked once, then cached.
    fn aead_support(&self) -> Result<(), AttemptFailure> {
        self.aead.get_or_init(|| self.probe_aead()).clone()
    }

    fn probe_aead(&self) -> Result<(), AttemptFailure> {
        let key = [0u8; KEY_LEN];
        let nonce = [0u8; GCM_NONCE_LEN];
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| AttemptFailure::other(format!("aes-gcm key: {e}")))?;
        let mut sample = nonce.to_vec();
        sample.extend(
            cipher
                .encrypt(Nonce::from_slice(&nonce), AEAD_PROBE_PLAINTEXT)
                .map_err(|_| AttemptFailure::other("sealing aead sample failed"))?,
        );

        let layout = AuthenticatedLayout::parse(&sample)?;
        let output = self.run(&authenticated_args(&key, &layout), layout.ciphertext)?;
        if output.success && output.stdout == AEAD_PROBE_PLAINTEXT {
            debug!("{} opens AES-256-GCM", self.program.display());
            Ok(())
        } else {
            warn!(
                "{} cannot decrypt AES-256-GCM; authenticated attempts will be reported as other-error",
                self.program.display()
            );
            Err(self.aead_unsupported())
        }
    }

    fn aead_unsupported(&self) -> AttemptFailure {
        AttemptFailure::other(format!(
            "{} cannot decrypt AEAD ciphers",
            self.program.display()
        ))
    }

    /// Run the tool with `args`, feeding `input` on stdin.
    fn run(&self, args: &[String], input: &[u8]) -> Result<ToolOutput, AttemptFailure> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AttemptFailure::other(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AttemptFailure::other("child stdin unavailable"))?;

        // Stdin is fed concurrently with draining stdout.
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || {
                // Early exit closes the pipe; the exit status reports it.
                let _ = stdin.write_all(input);
            });
            let output = child.wait_with_output();
            let _ = writer.join();
            output
        })
        .map_err(|e| {
            AttemptFailure::other(format!("waiting for {}: {}", self.program.display(), e))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            "{} exited with {:?}: {}",
            self.program.display(),
            output.status.code(),
            stderr
        );
        Ok(ToolOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr,
        })
    }
}

struct ToolOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

impl ToolOutput {
    fn unsupported_aead(&self) -> bool {
        let lower = self.stderr.to_lowercase();
        (lower.contains("aead") && lower.contains("not supported"))
            || lower.contains("unknown option")
            || lower.contains("unknown cipher")
    }
}

/// Arguments for the authenticated layout.
pub fn authenticated_args(key: &[u8; KEY_LEN], layout: &AuthenticatedLayout<'_>) -> Vec<String> {
    vec![
        "enc".into(),
        "-d".into(),
        "-aes-256-gcm".into(),
        "-K".into(),
        hex::encode(key),
        "-iv".into(),
        hex::encode(layout.nonce),
        "-nosalt".into(),
        "-nopad".into(),
        "-tag".into(),
        hex::encode(layout.tag),
    ]
}

/// Arguments for the legacy layout. The tool strips padding itself.
pub fn legacy_args(key: &[u8; KEY_LEN], layout: &LegacyLayout<'_>) -> Vec<String> {
    vec![
        "enc".into(),
        "-d".into(),
        "-aes-256-cbc".into(),
        "-K".into(),
        hex::encode(key),
        "-iv".into(),
        hex::encode(layout.iv),
        "-nosalt".into(),
    ]
}

impl CipherBackend for ExternalBackend {
    fn open_authenticated(
        &self,
        key: &[u8; KEY_LEN],
        layout: &AuthenticatedLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure> {
        self.aead_support()?;
        let output = self.run(&authenticated_args(key, layout), layout.ciphertext)?;
        if output.success {
            Ok(output.stdout)
        } else if output.unsupported_aead() {
            Err(self.aead_unsupported())
        } else {
            Err(AttemptFailure::AuthenticationFailed)
        }
    }

    fn open_legacy(
        &self,
        key: &[u8; KEY_LEN],
        layout: &LegacyLayout<'_>,
    ) -> Result<Vec<u8>, AttemptFailure> {
        let output = self.run(&legacy_args(key, layout), layout.ciphertext)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(AttemptFailure::PaddingInvalid {
                reason: if output.stderr.is_empty() {
                    "rejected by external tool".into()
                } else {
                    output.stderr.lines().next().unwrap_or_default().to_string()
                },
            })
        }
    }

    fn name(&self) -> &str {
        "external"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_args_layout() {
        let raw: Vec<u8> = (0u8..30).collect();
        let layout = AuthenticatedLayout::parse(&raw).unwrap();
        let args = authenticated_args(&[0xFFu8; KEY_LEN], &layout);

        assert_eq!(args[2], "-aes-256-gcm");
        assert_eq!(args[4], "ff".repeat(32));
        assert_eq!(args[6], "000102030405060708090a0b");
        assert_eq!(args.last().unwrap(), &hex::encode(&raw[14..30]));
    }

    #[test]
    fn test_legacy_args_layout() {
        let raw = [0x01u8; 32];
        let layout = LegacyLayout::parse(&raw).unwrap();
        let args = legacy_args(&[0u8; KEY_LEN], &layout);

        assert_eq!(args[2], "-aes-256-cbc");
        assert_eq!(args[6], "01".repeat(16));
        assert!(!args.contains(&"-nopad".to_string()));
    }

    #[test]
    fn test_missing_tool_is_other_error() {
        let backend = ExternalBackend::new("/nonexistent/openssl-for-tests");
        let raw = [0u8; 48];
        let layout = LegacyLayout::parse(&raw).unwrap();

        let err = backend.open_legacy(&[0u8; KEY_LEN], &layout).unwrap_err();
        assert_eq!(err.kind(), "other-error");
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[cfg(unix)]
    mod stub_tools {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use tempfile::TempDir;

        /// Write an executable shell script standing in for the tool.
        fn stub_tool(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-openssl");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms).unwrap();
            path
        }

        /// Accepts the all-zero key the capability check uses, rejects
        /// everything else the way a failed tag check does.
        fn gcm_capable_stub(dir: &Path) -> PathBuf {
            stub_tool(
                dir,
                &format!(
                    "cat >/dev/null\ncase \"$5\" in\n  {zeros}) printf '%s' '{plain}' ;;\n  *) echo 'bad decrypt' >&2; exit 1 ;;\nesac",
                    zeros = "0".repeat(2 * KEY_LEN),
                    plain = String::from_utf8_lossy(AEAD_PROBE_PLAINTEXT),
                ),
            )
        }

        #[test]
        fn test_openssl3_refusal_is_other_error() {
            let tmp = TempDir::new().unwrap();
            let tool = stub_tool(
                tmp.path(),
                "echo 'enc: Multiple cipher or unknown options: -aes-256-gcm and -tag' >&2\nexit 1",
            );
            let backend = ExternalBackend::new(&tool);
            let raw = [0x5Cu8; 64];
            let gcm = AuthenticatedLayout::parse(&raw).unwrap();

            let err = backend.open_authenticated(&[9u8; KEY_LEN], &gcm).unwrap_err();
            assert_eq!(err.kind(), "other-error");
            assert!(err.to_string().contains("cannot decrypt AEAD ciphers"));

            // Cached: the second attempt reports the same thing.
            let again = backend.open_authenticated(&[9u8; KEY_LEN], &gcm).unwrap_err();
            assert_eq!(again, err);
        }

        #[test]
        fn test_gcm_capable_tool_maps_rejection_to_authentication_failed() {
            let tmp = TempDir::new().unwrap();
            let backend = ExternalBackend::new(gcm_capable_stub(tmp.path()));
            let raw = [0x5Cu8; 64];
            let gcm = AuthenticatedLayout::parse(&raw).unwrap();

            assert_eq!(
                backend.open_authenticated(&[9u8; KEY_LEN], &gcm).unwrap_err(),
                AttemptFailure::AuthenticationFailed
            );
        }

        #[test]
        fn test_tool_output_is_plaintext_on_success() {
            let tmp = TempDir::new().unwrap();
            let backend = ExternalBackend::new(stub_tool(tmp.path(), "exec cat"));
            let raw: Vec<u8> = (0u8..48).collect();
            let cbc = LegacyLayout::parse(&raw).unwrap();

            let plaintext = backend.open_legacy(&[0u8; KEY_LEN], &cbc).unwrap();
            assert_eq!(plaintext, &raw[16..]);
        }

        #[test]
        fn test_echoing_tool_fails_aead_check() {
            let tmp = TempDir::new().unwrap();
            let backend = ExternalBackend::new(stub_tool(tmp.path(), "exec cat"));
            let raw = [0x11u8; 64];
            let gcm = AuthenticatedLayout::parse(&raw).unwrap();

            let err = backend.open_authenticated(&[1u8; KEY_LEN], &gcm).unwrap_err();
            assert!(err.to_string().contains("cannot decrypt AEAD ciphers"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_maps_per_mode() {
        let backend = ExternalBackend::new("false");
        let raw = [0u8; 48];

        let gcm = AuthenticatedLayout::parse(&raw).unwrap();
        assert_eq!(
            backend.open_authenticated(&[0u8; KEY_LEN], &gcm).unwrap_err().kind(),
            "other-error"
        );

        let cbc = LegacyLayout::parse(&raw).unwrap();
        assert_eq!(
            backend.open_legacy(&[0u8; KEY_LEN], &cbc).unwrap_err().kind(),
            "padding-invalid"
        );
    }
}

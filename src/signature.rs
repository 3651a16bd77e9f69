//! Detached signature sidecars for configuration files.
//!
//! A file's signature lives next to it as `<name>.sig`, holding the
//! base64-encoded signature of the file's raw bytes. Signing uses the
//! private half of a signing keypair; verification only needs the public
//! half, so deploy targets can check provenance without holding any
//! secret material.

use std::path::{Path, PathBuf};

use base64::prelude::{Engine as _, BASE64_STANDARD};

use crate::crypto::Signer;
use crate::error::{CofferError, Result};

/// Sidecar path for `path`: the same name with `.sig` appended.
pub fn signature_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

/// Sign `content` and write the sidecar. Returns the sidecar path.
pub fn sign_file(
    signer: &dyn Signer,
    path: &Path,
    content: &[u8],
    private_key: &[u8],
) -> Result<PathBuf> {
    let signature = signer.sign(content, private_key)?;
    let sidecar = signature_path(path);
    let mut encoded = BASE64_STANDARD.encode(signature);
    encoded.push('\n');
    std::fs::write(&sidecar, encoded).map_err(|e| CofferError::Io {
        path: sidecar.clone(),
        source: e,
    })?;
    Ok(sidecar)
}

/// Check `content` against the sidecar written by [`sign_file`]. A missing
/// or unreadable sidecar is an I/O error; a well-formed sidecar that does
/// not match yields `Ok(false)`.
pub fn verify_file(
    signer: &dyn Signer,
    path: &Path,
    content: &[u8],
    public_key: &[u8],
) -> Result<bool> {
    let sidecar = signature_path(path);
    let encoded = std::fs::read_to_string(&sidecar).map_err(|e| CofferError::Io {
        path: sidecar.clone(),
        source: e,
    })?;
    let signature = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| CofferError::Crypto {
            reason: format!("malformed signature sidecar {}: {e}", sidecar.display()),
        })?;
    signer.verify(content, &signature, public_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;
    use tempfile::TempDir;

    #[test]
    fn sidecar_path_appends_sig() {
        assert_eq!(
            signature_path(Path::new("config/settings.yml")),
            PathBuf::from("config/settings.yml.sig")
        );
    }

    #[test]
    fn sign_verify_and_tamper() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        let (public, private) = Ed25519Signer::generate_keypair();
        let signer = Ed25519Signer;

        let sidecar = sign_file(&signer, &path, b"a: 1\n", &private).unwrap();
        assert!(sidecar.exists());
        assert!(verify_file(&signer, &path, b"a: 1\n", &public).unwrap());
        assert!(!verify_file(&signer, &path, b"a: 2\n", &public).unwrap());
    }

    #[test]
    fn missing_sidecar_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        let (public, _) = Ed25519Signer::generate_keypair();
        assert!(matches!(
            verify_file(&Ed25519Signer, &path, b"", &public),
            Err(CofferError::Io { .. })
        ));
    }

    #[test]
    fn garbage_sidecar_is_a_crypto_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        std::fs::write(signature_path(&path), "not base64!!").unwrap();
        let (public, _) = Ed25519Signer::generate_keypair();
        assert!(matches!(
            verify_file(&Ed25519Signer, &path, b"", &public),
            Err(CofferError::Crypto { .. })
        ));
    }
}

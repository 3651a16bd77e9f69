//! Key material for the encryption, decryption, and signature collaborators.
//!
//! A [`Keyring`] maps a purpose (`default`, `signature`, ...) to an ordered
//! list of keys. Decryption tries every key under a purpose in order, which
//! is how key rotation works: add the new key first, keep the old one until
//! every file has been re-secured.
//!
//! Keys load from inline base64 or from a file containing base64 — a key
//! source string is treated as a path when a file exists at that location.

use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;

use crate::error::{CofferError, Result};

/// Purpose under which data-encryption keys are looked up.
pub const DEFAULT_PURPOSE: &str = "default";
/// Purpose under which signing keys are looked up.
pub const SIGNATURE_PURPOSE: &str = "signature";

/// Raw key bytes. The interpretation (X25519, Ed25519, ...) belongs to the
/// cipher or signer the keyring is handed to.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CofferError::Crypto {
                reason: format!("key is not valid base64: {e}"),
            })?;
        Ok(Key(bytes))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| CofferError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_base64(&contents)
    }

    /// Load from a source string: a filesystem path when a file exists
    /// there, otherwise inline base64.
    pub fn from_source(source: &str) -> Result<Self> {
        if Path::new(source).is_file() {
            Self::from_file(source)
        } else {
            Self::from_base64(source)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

// Key material never appears in logs or error output.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({} bytes)", self.0.len())
    }
}

/// Purpose-keyed, ordered key material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keyring {
    keys: IndexMap<String, Vec<Key>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key under `purpose`, preserving trial order.
    pub fn add(&mut self, purpose: impl Into<String>, key: Key) {
        self.keys.entry(purpose.into()).or_default().push(key);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, purpose: impl Into<String>, key: Key) -> Self {
        self.add(purpose, key);
        self
    }

    /// All keys for a purpose, in trial order. Empty when none configured.
    pub fn get(&self, purpose: &str) -> &[Key] {
        self.keys.get(purpose).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys under the `default` purpose.
    pub fn default_keys(&self) -> &[Key] {
        self.get(DEFAULT_PURPOSE)
    }

    /// The first key under the `signature` purpose, if any.
    pub fn signature_key(&self) -> Option<&Key> {
        self.get(SIGNATURE_PURPOSE).first()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn inline_base64_key_decodes() {
        let key = Key::from_base64(&BASE64.encode([7u8; 32])).unwrap();
        assert_eq!(key.bytes(), &[7u8; 32]);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(matches!(
            Key::from_base64("definitely not base64!"),
            Err(CofferError::Crypto { .. })
        ));
    }

    #[test]
    fn key_loads_from_file_with_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        std::fs::write(&path, format!("{}\n", BASE64.encode([9u8; 32]))).unwrap();
        let key = Key::from_file(&path).unwrap();
        assert_eq!(key.bytes(), &[9u8; 32]);
    }

    #[test]
    fn source_prefers_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k");
        std::fs::write(&path, BASE64.encode([1u8; 32])).unwrap();
        let key = Key::from_source(path.to_str().unwrap()).unwrap();
        assert_eq!(key.bytes(), &[1u8; 32]);
    }

    #[test]
    fn source_falls_back_to_inline() {
        let key = Key::from_source(&BASE64.encode([2u8; 32])).unwrap();
        assert_eq!(key.bytes(), &[2u8; 32]);
    }

    #[test]
    fn missing_key_file_is_an_io_error() {
        assert!(matches!(
            Key::from_file("/definitely/not/here.key"),
            Err(CofferError::Io { .. })
        ));
    }

    #[test]
    fn keyring_preserves_trial_order() {
        let ring = Keyring::new()
            .with(DEFAULT_PURPOSE, Key::from_bytes([1u8; 32]))
            .with(DEFAULT_PURPOSE, Key::from_bytes([2u8; 32]));
        let keys = ring.default_keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].bytes()[0], 1);
        assert_eq!(keys[1].bytes()[0], 2);
    }

    #[test]
    fn unknown_purpose_is_empty_not_error() {
        assert!(Keyring::new().get("signature").is_empty());
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let key = Key::from_bytes([0xAB; 32]);
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("171"));
        assert!(rendered.contains("32 bytes"));
    }
}

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which coercion target an environment override failed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Array,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Array => write!(f, "array"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CofferError {
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error(
        "Disallowed tagged value '{tag}' in {path} — remove the tag, \
         or pre-process the file into plain mappings and scalars before loading"
    )]
    DisallowedContent { path: PathBuf, tag: String },

    #[error("Mapping key {key} cannot be represented as a string")]
    InvalidKeyType { key: String },

    #[error("Invalid {kind} value for '{key}': {raw}")]
    InvalidValue {
        kind: ValueKind,
        key: String,
        raw: String,
    },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error(
        "No signature key configured — add a 'signature' entry to the \
         {keyring} keyring before calling sign/verify"
    )]
    MissingSignatureKey { keyring: &'static str },

    #[error(
        "No encryption key configured — add a 'default' entry to the \
         encryption keyring"
    )]
    MissingEncryptionKey,

    #[error("Could not decrypt {}: no configured key matched", paths.join(", "))]
    FailedDecryption { paths: Vec<String> },

    #[error("Crypto failure: {reason}")]
    Crypto { reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CofferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_names_kind_and_raw_string() {
        let err = CofferError::InvalidValue {
            kind: ValueKind::Boolean,
            key: "DEBUG".into(),
            raw: "foobar".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("boolean"));
        assert!(msg.contains("DEBUG"));
        assert!(msg.contains("foobar"));
    }

    #[test]
    fn failed_decryption_lists_all_paths() {
        let err = CofferError::FailedDecryption {
            paths: vec!["db.pass".into(), "api.token".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("db.pass"));
        assert!(msg.contains("api.token"));
    }

    #[test]
    fn missing_signature_key_points_at_keyring() {
        let err = CofferError::MissingSignatureKey {
            keyring: "decryption",
        };
        assert!(err.to_string().contains("decryption"));
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn key_not_found_formats() {
        let err = CofferError::KeyNotFound("database.url".into());
        assert!(err.to_string().contains("database.url"));
    }
}

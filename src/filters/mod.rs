//! The settings resolution pipeline: an ordered chain of pure transforms
//! over a configuration tree.
//!
//! Each filter is `(tree, context) → tree`, side-effect-free, never mutating
//! its input. The variant set is closed — a tagged enum rather than a plugin
//! trait — so the wiring in [`Settings`](crate::Settings) is checked
//! exhaustively at compile time. Pre-filters scope the raw tree (namespace
//! selection, partitioning); post-filters shape the presented view
//! (decryption, environment overlay, key-name translation).

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::debug;

use crate::crypto::Cipher;
use crate::error::Result;
use crate::keys::Keyring;
use crate::namespaces::NamespaceSet;

pub(crate) mod decryption;
pub(crate) mod encryption;
pub(crate) mod environment;
pub(crate) mod namespace;
pub(crate) mod partition;
pub(crate) mod translate;

pub use decryption::FailedDecryptionPolicy;

/// Everything a filter may consult. Borrowed from the owning `Settings`;
/// filters never hold state of their own.
pub struct FilterContext<'a> {
    pub decryption_keys: &'a Keyring,
    pub encryption_keys: &'a Keyring,
    pub namespaces: &'a NamespaceSet,
    pub secure_prefix: &'a str,
    /// Injected environment snapshot — a plain map, not a live global, so
    /// the environment filter stays pure and testable.
    pub env: &'a BTreeMap<String, String>,
    pub cipher: &'a dyn Cipher,
    pub failed_decryption_policy: Option<&'a FailedDecryptionPolicy>,
}

/// The closed set of pipeline transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Merge namespace-scoped branches into their parent level.
    Namespace,
    /// Overlay process-environment variables with type coercion.
    EnvironmentOverride,
    /// Encrypt plaintext values under secure-prefixed keys.
    Encryption,
    /// Decrypt ciphertext values under secure-prefixed keys.
    Decryption,
    /// Resolve failed-decryption markers per the configured policy.
    FailedDecryption,
    /// Strip the secure prefix from presented key names.
    SecureKeyTranslation,
    /// Narrow to currently-secured (prefixed, encrypted) leaves.
    SecurePartition,
    /// Narrow to prefixed leaves that are not yet encrypted.
    InsecurePartition,
}

impl Filter {
    pub fn apply(self, tree: Value, ctx: &FilterContext<'_>) -> Result<Value> {
        match self {
            Filter::Namespace => Ok(namespace::apply(tree, ctx.namespaces)),
            Filter::EnvironmentOverride => environment::apply(tree, ctx.env),
            Filter::Encryption => encryption::apply(tree, ctx),
            Filter::Decryption => Ok(decryption::apply(tree, ctx)),
            Filter::FailedDecryption => decryption::resolve_failures(tree, ctx),
            Filter::SecureKeyTranslation => Ok(translate::apply(tree, ctx.secure_prefix)),
            Filter::SecurePartition => Ok(partition::secured(tree, ctx.secure_prefix)),
            Filter::InsecurePartition => Ok(partition::insecure(tree, ctx.secure_prefix)),
        }
    }
}

/// Run a filter chain in declared order. The first failing filter aborts
/// the chain; no partially-applied tree escapes.
pub fn apply_chain(filters: &[Filter], tree: Value, ctx: &FilterContext<'_>) -> Result<Value> {
    let mut current = tree;
    for filter in filters {
        debug!(?filter, "applying filter");
        current = filter.apply(current, ctx)?;
    }
    Ok(current)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::crypto::SealedBoxCipher;
    use crate::keys::{Key, Keyring, DEFAULT_PURPOSE};
    use std::sync::LazyLock;

    pub struct TestContext {
        pub decryption_keys: Keyring,
        pub encryption_keys: Keyring,
        pub namespaces: NamespaceSet,
        pub env: BTreeMap<String, String>,
        pub policy: Option<FailedDecryptionPolicy>,
    }

    static CIPHER: LazyLock<SealedBoxCipher> = LazyLock::new(|| SealedBoxCipher);

    impl TestContext {
        pub fn empty() -> Self {
            TestContext {
                decryption_keys: Keyring::new(),
                encryption_keys: Keyring::new(),
                namespaces: NamespaceSet::new(),
                env: BTreeMap::new(),
                policy: None,
            }
        }

        /// A context with a matching sealed-box keypair under `default`.
        pub fn with_keypair() -> Self {
            let (public, private) = SealedBoxCipher::generate_keypair();
            let mut ctx = Self::empty();
            ctx.encryption_keys.add(DEFAULT_PURPOSE, Key::from_bytes(public));
            ctx.decryption_keys.add(DEFAULT_PURPOSE, Key::from_bytes(private));
            ctx
        }

        pub fn context(&self) -> FilterContext<'_> {
            FilterContext {
                decryption_keys: &self.decryption_keys,
                encryption_keys: &self.encryption_keys,
                namespaces: &self.namespaces,
                secure_prefix: "_secure_",
                env: &self.env,
                cipher: &*CIPHER,
                failed_decryption_policy: self.policy.as_ref(),
            }
        }
    }

    pub fn tree(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }
}

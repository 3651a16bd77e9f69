//! Hierarchical settings with secrets that live in the repo. Point at a
//! YAML tree, name your environments, and go.
//!
//! Coffer resolves layered configuration — namespace-scoped sections,
//! environment variable overrides, and values encrypted at rest — through
//! a filter pipeline over plain YAML. Secure values sit in the same file
//! as everything else, under `_secure_`-prefixed keys, encrypted with a
//! public key that is safe to commit.
//!
//! ```ignore
//! let settings = Settings::builder()
//!     .raw(serde_yaml::from_str(&contents)?)
//!     .namespaces(["production"].into_iter().collect())
//!     .decryption_keys(keys)
//!     .build()?;
//!
//! let password = settings.dig_strict(&["database", "password"])?;
//! ```
//!
//! That single `build` scopes the tree to the `production` namespace,
//! decrypts every secure value the keyring can open, overlays matching
//! environment variables with type coercion, and strips the secure prefix
//! so consumers address `database.password` whether or not the value was
//! encrypted on disk.
//!
//! # Why coffer
//!
//! Most applications need the same three things from configuration: one
//! source of truth across environments, a way to override values at deploy
//! time, and somewhere to put secrets that is neither plaintext in the
//! repo nor a separate out-of-band store that drifts from the code. The
//! typical answer is three separate mechanisms wired by hand.
//!
//! Coffer folds them into one tree. Environment sections live as nested
//! mappings selected by namespace tokens. Deploy-time overrides come from
//! the process environment, named by the upper-cased underscore-joined key
//! path. Secrets are ordinary values whose keys carry the secure prefix;
//! asymmetric encryption means anyone can add or rotate a secret with the
//! public key, while only holders of the private key can read it.
//!
//! # Design: filters over a tree
//!
//! A [`Settings`] is a raw [`serde_yaml::Value`] plus two ordered filter
//! chains, resolved eagerly at construction:
//!
//! - **pre-filters** shape which data is visible: namespace scoping by
//!   default, or the secure/insecure partitions used by tooling.
//! - **post-filters** shape how values present: decryption, environment
//!   override, secure-key translation.
//!
//! Every filter is a pure `tree -> tree` step in the closed [`Filter`]
//! enum, so a pipeline is data you can inspect. The intermediate trees are
//! frozen: [`Settings::raw_data`] is the tree after pre-filters,
//! [`Settings::data`] after post-filters, and neither changes for the
//! lifetime of the object.
//!
//! # Files stay files
//!
//! [`ConfigFile`] encrypts and decrypts values *inside* the original file
//! text instead of re-serializing the tree, so comments, ordering, and
//! formatting survive a `secure` pass untouched. Detached Ed25519
//! signature sidecars ([`ConfigFile::sign`] / [`ConfigFile::verify`]) let
//! deploy targets check file provenance with only public key material.
//!
//! # Key material
//!
//! A [`Keyring`] holds keys by purpose: `default` keys drive value
//! encryption and decryption (multiple decryption keys are tried in order,
//! which makes rotation a matter of listing old and new), and `signature`
//! keys drive file signing. The [`Cipher`] and [`Signer`] traits are the
//! seams for alternative schemes; the shipped [`SealedBoxCipher`] is an
//! X25519 sealed box with ChaCha20-Poly1305.

pub mod crypto;
pub mod error;
pub mod filters;
pub mod keys;
pub mod namespaces;
pub mod rewrite;
pub mod settings;
pub mod signature;
pub mod tree;

pub use crypto::{looks_encrypted, Cipher, Ed25519Signer, SealedBoxCipher, Signer};
pub use error::{CofferError, Result, ValueKind};
pub use filters::{FailedDecryptionPolicy, Filter};
pub use keys::{Key, Keyring, DEFAULT_PURPOSE, SIGNATURE_PURPOSE};
pub use namespaces::NamespaceSet;
pub use rewrite::{ConfigFile, IdentityPreprocessor, Preprocessor};
pub use settings::{RenderOptions, Settings, SettingsBuilder, DEFAULT_SECURE_PREFIX};
pub use tree::{deep_merge, expand, flatten, NamePath};

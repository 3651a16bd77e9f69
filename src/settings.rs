//! Resolved configuration: a raw tree plus two ordered filter chains.
//!
//! A [`Settings`] is built once and resolved eagerly at construction —
//! pre-filters run over the normalized raw tree producing `raw_data`,
//! post-filters run on top producing `data`. Both are frozen for the
//! object's lifetime; every accessor afterwards is a pure read, so there is
//! no lazy-memoization race to reason about. To see the same tree through
//! different filters (the [`secure`](Settings::secure) /
//! [`insecure`](Settings::insecure) / [`securable`](Settings::securable)
//! views), construct a new `Settings` — the originals never mutate.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_yaml::Value;

use crate::crypto::{Cipher, SealedBoxCipher};
use crate::error::{CofferError, Result};
use crate::filters::{apply_chain, decryption, FailedDecryptionPolicy, Filter, FilterContext};
use crate::keys::Keyring;
use crate::namespaces::NamespaceSet;
use crate::tree::{
    deep_merge, flatten, join_name, normalize_keys, scalar_to_string, stringify_key, NamePath,
};

/// Key names carrying this prefix hold values encrypted at rest.
pub const DEFAULT_SECURE_PREFIX: &str = "_secure_";

const DEFAULT_PRE: &[Filter] = &[Filter::Namespace];
const DEFAULT_POST: &[Filter] = &[
    Filter::Decryption,
    Filter::EnvironmentOverride,
    Filter::SecureKeyTranslation,
];

/// Separators and quoting for [`Settings::to_string_with`].
pub struct RenderOptions {
    pub hierarchical_separator: String,
    pub pair_separator: String,
    pub value_surrounder: String,
    pub name_value_separator: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            hierarchical_separator: "_".into(),
            pair_separator: "\n".into(),
            value_surrounder: "\"".into(),
            name_value_separator: "=".into(),
        }
    }
}

pub struct SettingsBuilder {
    raw: Value,
    decryption_keys: Keyring,
    encryption_keys: Keyring,
    namespaces: NamespaceSet,
    secure_prefix: String,
    env: Option<BTreeMap<String, String>>,
    cipher: Arc<dyn Cipher>,
    pre_filters: Vec<Filter>,
    post_filters: Vec<Filter>,
    failed_decryption_policy: Option<FailedDecryptionPolicy>,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        SettingsBuilder {
            raw: Value::Mapping(Default::default()),
            decryption_keys: Keyring::new(),
            encryption_keys: Keyring::new(),
            namespaces: NamespaceSet::new(),
            secure_prefix: DEFAULT_SECURE_PREFIX.into(),
            env: None,
            cipher: Arc::new(SealedBoxCipher),
            pre_filters: DEFAULT_PRE.to_vec(),
            post_filters: DEFAULT_POST.to_vec(),
            failed_decryption_policy: None,
        }
    }
}

impl SettingsBuilder {
    pub fn raw(mut self, tree: Value) -> Self {
        self.raw = tree;
        self
    }

    pub fn decryption_keys(mut self, keys: Keyring) -> Self {
        self.decryption_keys = keys;
        self
    }

    pub fn encryption_keys(mut self, keys: Keyring) -> Self {
        self.encryption_keys = keys;
        self
    }

    pub fn namespaces(mut self, namespaces: NamespaceSet) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn secure_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.secure_prefix = prefix.into();
        self
    }

    /// Inject an environment snapshot instead of the process environment.
    pub fn env_snapshot(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn pre_filters(mut self, filters: Vec<Filter>) -> Self {
        self.pre_filters = filters;
        self
    }

    pub fn post_filters(mut self, filters: Vec<Filter>) -> Self {
        self.post_filters = filters;
        self
    }

    /// Opt in to marker resolution; without a policy, failed-decryption
    /// markers pass through and are reported by
    /// [`Settings::failed_decryption_paths`].
    pub fn failed_decryption_policy(mut self, policy: FailedDecryptionPolicy) -> Self {
        self.failed_decryption_policy = Some(policy);
        self
    }

    /// Normalize keys and run both filter chains. The first filter error
    /// aborts construction; no partially-resolved `Settings` escapes.
    pub fn build(self) -> Result<Settings> {
        let raw = normalize_keys(&self.raw, stringify_key)?;
        let env = self.env.unwrap_or_else(|| std::env::vars().collect());

        let mut post_filters = self.post_filters;
        if self.failed_decryption_policy.is_some()
            && !post_filters.contains(&Filter::FailedDecryption)
        {
            let at = post_filters
                .iter()
                .position(|f| *f == Filter::Decryption)
                .map(|i| i + 1)
                .unwrap_or(0);
            post_filters.insert(at, Filter::FailedDecryption);
        }

        let ctx = FilterContext {
            decryption_keys: &self.decryption_keys,
            encryption_keys: &self.encryption_keys,
            namespaces: &self.namespaces,
            secure_prefix: &self.secure_prefix,
            env: &env,
            cipher: self.cipher.as_ref(),
            failed_decryption_policy: self.failed_decryption_policy.as_ref(),
        };
        let raw_data = apply_chain(&self.pre_filters, raw.clone(), &ctx)?;
        let data = apply_chain(&post_filters, raw_data.clone(), &ctx)?;

        Ok(Settings {
            raw,
            raw_data,
            data,
            decryption_keys: self.decryption_keys,
            encryption_keys: self.encryption_keys,
            namespaces: self.namespaces,
            secure_prefix: self.secure_prefix,
            env,
            cipher: self.cipher,
            failed_decryption_policy: self.failed_decryption_policy,
        })
    }
}

pub struct Settings {
    raw: Value,
    raw_data: Value,
    data: Value,
    decryption_keys: Keyring,
    encryption_keys: Keyring,
    namespaces: NamespaceSet,
    secure_prefix: String,
    env: BTreeMap<String, String>,
    cipher: Arc<dyn Cipher>,
    failed_decryption_policy: Option<FailedDecryptionPolicy>,
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// The normalized tree before any filter ran.
    pub fn raw_tree(&self) -> &Value {
        &self.raw
    }

    /// The tree after pre-filters (namespace scoping, partitioning).
    pub fn raw_data(&self) -> &Value {
        &self.raw_data
    }

    /// The fully presented tree after post-filters.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    pub fn secure_prefix(&self) -> &str {
        &self.secure_prefix
    }

    /// Independent copy of the presented tree; mutating it never touches
    /// this `Settings`.
    pub fn to_tree(&self) -> Value {
        self.data.clone()
    }

    /// Presented data as `(name path, leaf value)` pairs in tree order.
    pub fn to_flattened(&self) -> IndexMap<NamePath, Value> {
        flatten(&self.data).into_iter().collect()
    }

    /// Presented data as `(joined name, leaf value)` pairs, sorted
    /// lexicographically by the joined name.
    pub fn to_concatenated(&self, separator: &str) -> Vec<(String, Value)> {
        let mut entries: Vec<_> = flatten(&self.data)
            .into_iter()
            .map(|(path, value)| (join_name(&path, separator), value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Presented data shaped as process-environment overrides:
    /// upper-cased names joined with `_`, stringified values.
    pub fn to_environment(&self) -> BTreeMap<String, String> {
        flatten(&self.data)
            .into_iter()
            .map(|(path, value)| {
                (
                    join_name(&path, "_").to_uppercase(),
                    scalar_to_string(&value),
                )
            })
            .collect()
    }

    /// Shell-assignment rendering with configurable separators/quoting.
    pub fn to_string_with(&self, options: &RenderOptions) -> String {
        let entries: Vec<String> = self
            .to_concatenated(&options.hierarchical_separator)
            .into_iter()
            .map(|(name, value)| {
                format!(
                    "{}{}{}{}{}",
                    name.to_uppercase(),
                    options.name_value_separator,
                    options.value_surrounder,
                    scalar_to_string(&value),
                    options.value_surrounder,
                )
            })
            .collect();
        entries.join(&options.pair_separator)
    }

    /// Merge into a new `Settings`: `other`'s raw tree wins on conflict,
    /// key material is `self`'s unless empty, namespace sets concatenate.
    pub fn merge(&self, other: &Settings) -> Result<Settings> {
        let decryption_keys = if self.decryption_keys.is_empty() {
            other.decryption_keys.clone()
        } else {
            self.decryption_keys.clone()
        };
        let encryption_keys = if self.encryption_keys.is_empty() {
            other.encryption_keys.clone()
        } else {
            self.encryption_keys.clone()
        };
        let mut builder = self
            .rebuilder()
            .raw(deep_merge(self.raw.clone(), other.raw.clone()))
            .decryption_keys(decryption_keys)
            .encryption_keys(encryption_keys)
            .namespaces(self.namespaces.concat(&other.namespaces));
        if let Some(policy) = &self.failed_decryption_policy {
            builder = builder.failed_decryption_policy(policy.clone());
        }
        builder.build()
    }

    /// Lenient path lookup into the presented data.
    pub fn dig(&self, path: &[&str]) -> Option<&Value> {
        let mut current = &self.data;
        for segment in path {
            current = current.get(*segment)?;
        }
        Some(current)
    }

    /// Strict path lookup; missing segments fail with
    /// [`CofferError::KeyNotFound`] naming the full path.
    pub fn dig_strict(&self, path: &[&str]) -> Result<&Value> {
        self.dig(path)
            .ok_or_else(|| CofferError::KeyNotFound(path.join(".")))
    }

    /// The same raw tree with every secure-prefixed value encrypted and
    /// prefixes stripped from presented names: what the file would look
    /// like fully secured.
    pub fn secure(&self) -> Result<Settings> {
        self.view(
            vec![Filter::Encryption],
            vec![Filter::SecureKeyTranslation],
        )
    }

    /// Only secure-prefixed values still in plaintext, prefixes stripped.
    pub fn insecure(&self) -> Result<Settings> {
        self.view(
            vec![Filter::InsecurePartition],
            vec![Filter::SecureKeyTranslation],
        )
    }

    /// Only currently-secured values, names untouched.
    pub fn securable(&self) -> Result<Settings> {
        self.view(vec![Filter::SecurePartition], vec![])
    }

    /// Currently-secured values, decrypted where possible, names
    /// untouched. Drives the file rewriter's decrypt pass.
    pub(crate) fn decrypted_secure(&self) -> Result<Settings> {
        self.view(vec![Filter::SecurePartition], vec![Filter::Decryption])
    }

    /// Secure-prefixed plaintext values in their encrypted form, prefixes
    /// stripped. Drives the file rewriter's secure pass. Partitioning
    /// before encrypting keeps a bare sibling of a secure key from
    /// shadowing the ciphertext once names are translated.
    pub(crate) fn encrypted_insecure(&self) -> Result<Settings> {
        self.view(
            vec![Filter::InsecurePartition, Filter::Encryption],
            vec![Filter::SecureKeyTranslation],
        )
    }

    /// Joined name paths of values no configured key could decrypt.
    pub fn failed_decryption_paths(&self) -> Vec<String> {
        decryption::failed_paths(&self.data)
            .iter()
            .map(|path| join_name(path, "."))
            .collect()
    }

    /// A new `Settings` over the same raw, unfiltered tree with different
    /// chains. Views never overlay the environment and never resolve
    /// markers; they exist to compare encrypted/plaintext forms.
    fn view(&self, pre: Vec<Filter>, post: Vec<Filter>) -> Result<Settings> {
        self.rebuilder().pre_filters(pre).post_filters(post).build()
    }

    fn rebuilder(&self) -> SettingsBuilder {
        SettingsBuilder::default()
            .raw(self.raw.clone())
            .decryption_keys(self.decryption_keys.clone())
            .encryption_keys(self.encryption_keys.clone())
            .namespaces(self.namespaces.clone())
            .secure_prefix(self.secure_prefix.clone())
            .env_snapshot(self.env.clone())
            .cipher(Arc::clone(&self.cipher))
    }
}

// Key material renders through Keyring's redacting Debug; the cipher is
// elided entirely.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("data", &self.data)
            .field("namespaces", &self.namespaces)
            .field("secure_prefix", &self.secure_prefix)
            .field("decryption_keys", &self.decryption_keys)
            .field("encryption_keys", &self.encryption_keys)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_with(&RenderOptions::default()))
    }
}

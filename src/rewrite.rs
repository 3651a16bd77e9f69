//! Selective, format-preserving rewriting of configuration files.
//!
//! [`ConfigFile`] reads a YAML file's raw bytes and edits individual value
//! regions in place. Re-serializing the parsed tree would throw away
//! comments, anchors, key ordering, and incidental formatting that config
//! files routinely rely on — so instead the rewriter resolves the file
//! twice (plaintext view vs. ciphertext view), diffs the flattened views,
//! and splices each changed value into the original text with an anchored,
//! per-line regex match. Key names and values are regex-escaped before
//! matching; only the first textual occurrence of a key+value pair is
//! rewritten.
//!
//! The matching is best-effort by design: duplicate key+value pairs shared
//! through anchors update only their first occurrence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::{Captures, Regex};
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::crypto::{Cipher, Ed25519Signer, SealedBoxCipher, Signer};
use crate::error::{CofferError, Result};
use crate::keys::Keyring;
use crate::namespaces::NamespaceSet;
use crate::settings::{Settings, DEFAULT_SECURE_PREFIX};
use crate::signature;
use crate::tree::scalar_to_string;

/// The template-evaluation stage that runs over raw text before parsing.
/// External to this crate; the default passes text through untouched.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, text: &str) -> Result<String>;
}

/// No-op preprocessing.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPreprocessor;

impl Preprocessor for IdentityPreprocessor {
    fn preprocess(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

/// One on-disk configuration file plus the key material to operate on it.
pub struct ConfigFile {
    path: PathBuf,
    decryption_keys: Keyring,
    encryption_keys: Keyring,
    namespaces: NamespaceSet,
    secure_prefix: String,
    cipher: Arc<dyn Cipher>,
    signer: Arc<dyn Signer>,
    preprocessor: Arc<dyn Preprocessor>,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigFile {
            path: path.into(),
            decryption_keys: Keyring::new(),
            encryption_keys: Keyring::new(),
            namespaces: NamespaceSet::new(),
            secure_prefix: DEFAULT_SECURE_PREFIX.into(),
            cipher: Arc::new(SealedBoxCipher),
            signer: Arc::new(Ed25519Signer),
            preprocessor: Arc::new(IdentityPreprocessor),
        }
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

    pub fn cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents. A missing file is empty configuration, not an
    /// error; any other I/O failure propagates.
    pub fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(CofferError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Parse the file (after template preprocessing) and build a
    /// [`Settings`] over it.
    pub fn to_settings(&self) -> Result<Settings> {
        let tree = self.parse(&self.read()?)?;
        Settings::builder()
            .raw(tree)
            .decryption_keys(self.decryption_keys.clone())
            .encryption_keys(self.encryption_keys.clone())
            .namespaces(self.namespaces.clone())
            .secure_prefix(self.secure_prefix.clone())
            .cipher(Arc::clone(&self.cipher))
            .build()
    }

    fn parse(&self, contents: &str) -> Result<Value> {
        let expanded = self.preprocessor.preprocess(contents)?;
        if expanded.trim().is_empty() {
            return Ok(Value::Mapping(Default::default()));
        }
        let tree: Value =
            serde_yaml::from_str(&expanded).map_err(|e| CofferError::Parse {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if let Some(tag) = first_tag(&tree) {
            return Err(CofferError::DisallowedContent {
                path: self.path.clone(),
                tag,
            });
        }
        match tree {
            Value::Null => Ok(Value::Mapping(Default::default())),
            other => Ok(other),
        }
    }

    /// Encrypt every secure-prefixed plaintext value in place, leaving all
    /// other bytes untouched. Returns the number of values rewritten; the
    /// file is only written when at least one value changed, so re-running
    /// over an already-secured file is byte-identical.
    pub fn secure(&self) -> Result<usize> {
        let mut contents = self.read()?;
        if contents.is_empty() {
            return Ok(0);
        }
        let settings = self.to_settings()?;
        let insecure = settings.insecure()?.to_flattened();
        if insecure.is_empty() {
            return Ok(0);
        }
        let secured = settings.encrypted_insecure()?.to_flattened();

        let mut rewritten = 0;
        for (path, value) in &insecure {
            let Some(Value::String(ciphertext)) = secured.get(path) else {
                continue;
            };
            let Some(key) = path.last() else { continue };
            let file_key = format!("{}{}", self.secure_prefix, key);
            let plaintext = scalar_to_string(value);

            let edited = replace_inline(&contents, &file_key, &plaintext, |_| {
                ciphertext.clone()
            })
            .or_else(|| replace_block(&contents, &file_key, ciphertext));

            match edited {
                Some(new_contents) => {
                    debug!(key = %file_key, "secured value");
                    contents = new_contents;
                    rewritten += 1;
                }
                None => warn!(key = %file_key, "value not found in file text; skipped"),
            }
        }

        if rewritten > 0 {
            self.write(&contents)?;
        }
        Ok(rewritten)
    }

    /// Decrypt every currently-secured value in place. Key names keep
    /// their secure prefix; values whose decryption failed are skipped.
    /// Multi-line plaintext is re-emitted as a literal block scalar
    /// indented one level deeper than its key. Returns the number of
    /// values rewritten.
    pub fn decrypt(&self) -> Result<usize> {
        let mut contents = self.read()?;
        if contents.is_empty() {
            return Ok(0);
        }
        let settings = self.to_settings()?;
        let secured = settings.securable()?.to_flattened();
        if secured.is_empty() {
            return Ok(0);
        }
        let decrypted = settings.decrypted_secure()?.to_flattened();

        let mut rewritten = 0;
        for (path, value) in &secured {
            let Value::String(ciphertext) = value else {
                continue;
            };
            let Some(Value::String(plaintext)) = decrypted.get(path) else {
                warn!(key = %path.join("."), "could not decrypt value; skipped");
                continue;
            };
            let Some(file_key) = path.last() else { continue };

            let edited = if plaintext.contains('\n') {
                replace_inline(&contents, file_key, ciphertext, |indent| {
                    render_block_scalar(indent, file_key, plaintext)
                })
            } else {
                replace_inline(&contents, file_key, ciphertext, |_| plaintext.clone())
            };

            match edited {
                Some(new_contents) => {
                    debug!(key = %file_key, "decrypted value");
                    contents = new_contents;
                    rewritten += 1;
                }
                None => warn!(key = %file_key, "ciphertext not found in file text; skipped"),
            }
        }

        if rewritten > 0 {
            self.write(&contents)?;
        }
        Ok(rewritten)
    }

    /// Sign the file's raw bytes with the `signature` decryption key and
    /// write the detached signature sidecar. Returns the sidecar path.
    /// Unlike the read path, a missing file is an error here: a signature
    /// over nothing attests to nothing.
    pub fn sign(&self) -> Result<PathBuf> {
        let key = self
            .decryption_keys
            .signature_key()
            .ok_or(CofferError::MissingSignatureKey {
                keyring: "decryption",
            })?;
        let contents = self.read_bytes()?;
        signature::sign_file(self.signer.as_ref(), &self.path, &contents, key.bytes())
    }

    /// Verify the file's raw bytes against its signature sidecar using the
    /// `signature` encryption key. Missing file or sidecar is an error.
    pub fn verify(&self) -> Result<bool> {
        let key = self
            .encryption_keys
            .signature_key()
            .ok_or(CofferError::MissingSignatureKey {
                keyring: "encryption",
            })?;
        let contents = self.read_bytes()?;
        signature::verify_file(self.signer.as_ref(), &self.path, &contents, key.bytes())
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| CofferError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    fn write(&self, contents: &str) -> Result<()> {
        std::fs::write(&self.path, contents).map_err(|e| CofferError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

fn first_tag(tree: &Value) -> Option<String> {
    match tree {
        Value::Tagged(tagged) => Some(tagged.tag.to_string()),
        Value::Mapping(map) => map
            .iter()
            .find_map(|(key, value)| first_tag(key).or_else(|| first_tag(value))),
        Value::Sequence(seq) => seq.iter().find_map(first_tag),
        _ => None,
    }
}

/// Replace the value of the first line matching
/// `<indent><key><spacing>:<spacing>['"]?<value>['"]?`, building the new
/// line from the matched indentation. Returns `None` when no line matches.
fn replace_inline(
    contents: &str,
    key: &str,
    value: &str,
    render: impl Fn(&str) -> String,
) -> Option<String> {
    if value.is_empty() || value.contains('\n') {
        return None;
    }
    let escaped_key = regex::escape(key);
    let escaped_value = regex::escape(value);
    let pattern = format!(
        "(?m)^([ \\t]*)({escaped_key}[ \\t]*:[ \\t]*)\
         (?:\"{escaped_value}\"|'{escaped_value}'|{escaped_value})[ \\t]*$"
    );
    let re = Regex::new(&pattern).ok()?;
    let caps: Captures<'_> = re.captures(contents)?;
    let whole = caps.get(0)?;
    let indent = caps.get(1)?.as_str();
    let lead = caps.get(2)?.as_str();

    let rendered = render(indent);
    let replacement = if rendered.contains('\n') {
        // block rendering supplies its own key line
        rendered
    } else {
        format!("{indent}{lead}{rendered}")
    };

    let mut out = String::with_capacity(contents.len());
    out.push_str(&contents[..whole.start()]);
    out.push_str(&replacement);
    out.push_str(&contents[whole.end()..]);
    Some(out)
}

/// Replace a literal/folded block scalar under `key` with a single-line
/// `replacement`. Consumes the key line plus every following line indented
/// deeper than the key. Returns `None` when the key has no block value.
fn replace_block(contents: &str, key: &str, replacement: &str) -> Option<String> {
    let escaped_key = regex::escape(key);
    let pattern = format!("^([ \\t]*)({escaped_key})[ \\t]*:[ \\t]*[|>][0-9+-]*[ \\t]*$");
    let re = Regex::new(&pattern).ok()?;

    let lines: Vec<&str> = contents.split_inclusive('\n').collect();
    for (start, raw_line) in lines.iter().enumerate() {
        let line = raw_line.trim_end_matches(['\n', '\r']);
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let indent = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let mut end = start + 1;
        while end < lines.len() {
            let body = lines[end].trim_end_matches(['\n', '\r']);
            if body.trim().is_empty() {
                break;
            }
            let body_indent = body.len() - body.trim_start().len();
            if body_indent <= indent.len() {
                break;
            }
            end += 1;
        }
        if end == start + 1 {
            // indicator with no content lines — not the block we want
            continue;
        }

        let mut out = String::with_capacity(contents.len());
        out.push_str(&lines[..start].concat());
        out.push_str(&format!("{indent}{key}: {replacement}\n"));
        out.push_str(&lines[end..].concat());
        return Some(out);
    }
    None
}

/// Render a multi-line value as a literal block scalar, content indented
/// one level deeper than the key.
fn render_block_scalar(indent: &str, key: &str, value: &str) -> String {
    let mut out = format!("{indent}{key}: |\n");
    for line in value.trim_end_matches('\n').split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("{indent}  {line}\n"));
        }
    }
    out.trim_end_matches('\n').to_string()
}

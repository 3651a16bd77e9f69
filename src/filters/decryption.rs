//! Decrypt ciphertext values held under secure-prefixed keys.
//!
//! Every configured decryption key is tried in order; the first success
//! wins. When every key fails, the value becomes a tagged
//! `!decryption_failed` marker wrapping the untouched ciphertext, so
//! downstream code can detect the failure structurally instead of using
//! ciphertext as if it were plaintext. Values that are not strings, or do
//! not look like ciphertext, pass through unchanged.

use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::crypto::looks_encrypted;
use crate::error::{CofferError, Result};
use crate::filters::FilterContext;
use crate::tree::{join_name, NamePath};

/// YAML tag marking a value no configured key could decrypt.
pub const FAILED_TAG: &str = "decryption_failed";

/// What the failed-decryption filter does with markers it finds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailedDecryptionPolicy {
    /// Fail the pipeline, naming every affected key path.
    Error,
    /// Substitute a placeholder string and continue.
    Placeholder(String),
}

pub fn apply(tree: Value, ctx: &FilterContext<'_>) -> Value {
    let mut path = Vec::new();
    walk(tree, &mut path, ctx)
}

fn walk(value: Value, path: &mut NamePath, ctx: &FilterContext<'_>) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                let name = key.as_str().unwrap_or_default().to_string();
                let is_secure = name.starts_with(ctx.secure_prefix);
                path.push(name);
                let replaced = if is_secure && !child.is_mapping() {
                    decrypt_leaf(child, path, ctx)
                } else {
                    walk(child, path, ctx)
                };
                path.pop();
                out.insert(key, replaced);
            }
            Value::Mapping(out)
        }
        other => other,
    }
}

fn decrypt_leaf(value: Value, path: &NamePath, ctx: &FilterContext<'_>) -> Value {
    let Value::String(ciphertext) = value else {
        return value;
    };
    if !looks_encrypted(&ciphertext) {
        return Value::String(ciphertext);
    }
    for key in ctx.decryption_keys.default_keys() {
        if let Ok(plaintext) = ctx.cipher.decrypt(&ciphertext, key.bytes()) {
            return Value::String(plaintext);
        }
    }
    warn!(key = %join_name(path, "."), "no configured key could decrypt value");
    Value::Tagged(Box::new(TaggedValue {
        tag: Tag::new(FAILED_TAG),
        value: Value::String(ciphertext),
    }))
}

fn is_failed_marker(value: &Value) -> bool {
    matches!(value, Value::Tagged(tagged) if tagged.tag == FAILED_TAG)
}

/// Name paths of every failed-decryption marker in a tree.
pub fn failed_paths(tree: &Value) -> Vec<NamePath> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_failed(tree, &mut path, &mut out);
    out
}

fn collect_failed(value: &Value, path: &mut NamePath, out: &mut Vec<NamePath>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                path.push(key.as_str().unwrap_or_default().to_string());
                collect_failed(child, path, out);
                path.pop();
            }
        }
        marker if is_failed_marker(marker) => out.push(path.clone()),
        _ => {}
    }
}

/// Apply the context's failed-decryption policy to any markers present.
/// Without a policy the tree passes through, markers intact.
pub fn resolve_failures(tree: Value, ctx: &FilterContext<'_>) -> Result<Value> {
    let Some(policy) = ctx.failed_decryption_policy else {
        return Ok(tree);
    };
    let failed = failed_paths(&tree);
    if failed.is_empty() {
        return Ok(tree);
    }
    match policy {
        FailedDecryptionPolicy::Error => Err(CofferError::FailedDecryption {
            paths: failed.iter().map(|p| join_name(p, ".")).collect(),
        }),
        FailedDecryptionPolicy::Placeholder(placeholder) => {
            Ok(substitute(tree, placeholder.as_str()))
        }
    }
}

fn substitute(value: Value, placeholder: &str) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key, substitute(child, placeholder));
            }
            Value::Mapping(out)
        }
        marker if is_failed_marker(&marker) => Value::String(placeholder.to_string()),
        other => other,
    }
}

//! Partition a tree by at-rest encryption status.
//!
//! Both partitions look only at secure-prefixed leaves; everything else is
//! dropped. [`secured`] keeps leaves whose value already has ciphertext
//! shape — the "currently secured" view behind sign/verify and compare
//! flows. [`insecure`] keeps prefixed leaves that are still plaintext —
//! "what should be secured but is not yet", which drives the file
//! rewriter's `secure` pass. Empty mappings are pruned from the result.

use serde_yaml::{Mapping, Value};

use crate::crypto::looks_encrypted;

/// Narrow to secure-prefixed leaves whose value is already ciphertext.
pub fn secured(tree: Value, prefix: &str) -> Value {
    partition(tree, prefix, true)
}

/// Narrow to secure-prefixed leaves whose value is not yet ciphertext.
pub fn insecure(tree: Value, prefix: &str) -> Value {
    partition(tree, prefix, false)
}

fn partition(tree: Value, prefix: &str, want_encrypted: bool) -> Value {
    match tree {
        Value::Mapping(map) => Value::Mapping(partition_level(map, prefix, want_encrypted)),
        other => other,
    }
}

fn partition_level(map: Mapping, prefix: &str, want_encrypted: bool) -> Mapping {
    let mut out = Mapping::new();
    for (key, child) in map {
        let name = key.as_str().unwrap_or_default();
        match child {
            Value::Mapping(inner) => {
                let kept = partition_level(inner, prefix, want_encrypted);
                if !kept.is_empty() {
                    out.insert(key, Value::Mapping(kept));
                }
            }
            leaf => {
                if name.starts_with(prefix) && is_encrypted_leaf(&leaf) == want_encrypted {
                    out.insert(key, leaf);
                }
            }
        }
    }
    out
}

fn is_encrypted_leaf(value: &Value) -> bool {
    matches!(value, Value::String(s) if looks_encrypted(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::tree;
    use pretty_assertions::assert_eq;

    const PREFIX: &str = "_secure_";

    fn fake_ciphertext() -> String {
        // right shape, meaningless contents: the partitions only look
        // at shape
        "A".repeat(86) + "=="
    }

    #[test]
    fn insecure_keeps_plaintext_secure_keys_only() {
        let result = insecure(
            tree(&format!(
                "host: pg\n_secure_pass: hunter2\n_secure_done: {}",
                fake_ciphertext()
            )),
            PREFIX,
        );
        assert_eq!(result, tree("_secure_pass: hunter2"));
    }

    #[test]
    fn secured_keeps_ciphertext_secure_keys_only() {
        let ct = fake_ciphertext();
        let result = secured(
            tree(&format!("host: pg\n_secure_pass: hunter2\n_secure_done: {ct}")),
            PREFIX,
        );
        assert_eq!(result, tree(&format!("_secure_done: {ct}")));
    }

    #[test]
    fn nesting_is_preserved_and_empty_branches_pruned() {
        let result = insecure(
            tree("db:\n  _secure_pass: hunter2\ncache:\n  host: redis"),
            PREFIX,
        );
        assert_eq!(result, tree("db:\n  _secure_pass: hunter2"));
    }

    #[test]
    fn non_string_secure_values_count_as_insecure() {
        let result = insecure(tree("_secure_port: 5432"), PREFIX);
        assert_eq!(result, tree("_secure_port: 5432"));
        assert_eq!(secured(tree("_secure_port: 5432"), PREFIX), tree("{}"));
    }
}

//! Generic operations on parsed configuration trees.
//!
//! A tree is a `serde_yaml::Value`: scalars, sequences, and mappings with
//! insertion order preserved. Everything here is pure — inputs are consumed
//! or borrowed, never mutated in place behind the caller's back.

use serde_yaml::{Mapping, Value};

use crate::error::{CofferError, Result};

/// Ordered key sequence locating a leaf within a tree.
pub type NamePath = Vec<String>;

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a mapping for the same key, recurse.
/// Otherwise, `overlay`'s value wins. Sequences are replaced wholesale.
///
/// Base insertion order is preserved; keys new in `overlay` append.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let existing = std::mem::replace(slot, Value::Null);
                        *slot = deep_merge(existing, overlay_val);
                    }
                    None => {
                        base_map.insert(key, overlay_val);
                    }
                }
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Flatten a tree into `(name path, leaf value)` pairs in tree-walk order.
///
/// Only mappings are descended into. Sequences count as leaves: the whole
/// sequence is the value at that name path. An empty mapping contributes
/// nothing.
pub fn flatten(tree: &Value) -> Vec<(NamePath, Value)> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_leaves(tree, &mut path, &mut out);
    out
}

fn collect_leaves(value: &Value, path: &mut NamePath, out: &mut Vec<(NamePath, Value)>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = stringify_key(key) else {
                    // Keys are normalized before any pipeline runs; a
                    // container key cannot appear here.
                    continue;
                };
                path.push(key);
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        leaf => out.push((path.clone(), leaf.clone())),
    }
}

/// Rebuild a tree from flattened pairs, creating intermediate mappings.
/// Later entries targeting the same path win.
pub fn expand(pairs: impl IntoIterator<Item = (NamePath, Value)>) -> Value {
    let mut root = Mapping::new();
    for (path, value) in pairs {
        if path.is_empty() {
            continue;
        }
        set_nested(&mut root, &path, value);
    }
    Value::Mapping(root)
}

fn set_nested(map: &mut Mapping, path: &[String], value: Value) {
    let key = Value::String(path[0].clone());
    if path.len() == 1 {
        map.insert(key, value);
        return;
    }
    let slot = map
        .entry(key)
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !slot.is_mapping() {
        *slot = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(inner) = slot {
        set_nested(inner, &path[1..], value);
    }
}

/// Canonical string form of a mapping key. `None` for container keys,
/// which have no sensible string rendering.
pub fn stringify_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}

/// Recursively rewrite every mapping key via `normalize`, returning a new
/// tree. Fails with [`CofferError::InvalidKeyType`] when a key has no
/// canonical form (e.g. a sequence used as a key).
pub fn normalize_keys(
    tree: &Value,
    normalize: impl Fn(&Value) -> Option<String> + Copy,
) -> Result<Value> {
    match tree {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                let name = normalize(key).ok_or_else(|| CofferError::InvalidKeyType {
                    key: format!("{key:?}"),
                })?;
                out.insert(Value::String(name), normalize_keys(child, normalize)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(seq) => Ok(Value::Sequence(
            seq.iter()
                .map(|item| normalize_keys(item, normalize))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

/// Join a name path into a single name.
pub fn join_name(path: &[String], separator: &str) -> String {
    path.join(separator)
}

/// Render a leaf as a plain string, the way it would appear in an
/// environment variable. Containers fall back to their YAML rendering.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    // --- deep_merge ---

    #[test]
    fn disjoint_keys_merge() {
        let merged = deep_merge(tree("host: localhost"), tree("port: 3000"));
        assert_eq!(merged, tree("host: localhost\nport: 3000"));
    }

    #[test]
    fn same_scalar_key_overlay_wins() {
        let merged = deep_merge(tree("port: 8080"), tree("port: 3000"));
        assert_eq!(merged, tree("port: 3000"));
    }

    #[test]
    fn nested_mappings_recurse() {
        let base = tree("database:\n  url: postgres://old\n  pool: 5");
        let overlay = tree("database:\n  pool: 20");
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, tree("database:\n  url: postgres://old\n  pool: 20"));
    }

    #[test]
    fn overlay_scalar_replaces_mapping() {
        let merged = deep_merge(tree("database:\n  url: x"), tree("database: flat"));
        assert_eq!(merged, tree("database: flat"));
    }

    #[test]
    fn sequences_replaced_wholesale() {
        let merged = deep_merge(tree("tags: [a, b]"), tree("tags: [c]"));
        assert_eq!(merged, tree("tags: [c]"));
    }

    #[test]
    fn base_key_order_is_preserved() {
        let merged = deep_merge(tree("a: 1\nb: 2\nc: 3"), tree("b: 9\nd: 4"));
        let Value::Mapping(map) = merged else {
            panic!("expected mapping")
        };
        let keys: Vec<_> = map.keys().map(|k| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    // --- flatten / expand ---

    #[test]
    fn flatten_emits_one_entry_per_leaf() {
        let pairs = flatten(&tree("database:\n  host: pg\n  port: 5432\ndebug: true"));
        assert_eq!(
            pairs,
            vec![
                (
                    vec!["database".into(), "host".into()],
                    Value::String("pg".into())
                ),
                (vec!["database".into(), "port".into()], tree("5432")),
                (vec!["debug".into()], Value::Bool(true)),
            ]
        );
    }

    #[test]
    fn flatten_treats_sequences_as_leaves() {
        let pairs = flatten(&tree("tags: [a, b]"));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, vec!["tags".to_string()]);
        assert!(pairs[0].1.is_sequence());
    }

    #[test]
    fn flatten_expand_round_trips() {
        let original = tree("a:\n  b: 1\n  c: [x, y]\nd: hello");
        let pairs = flatten(&original);
        let rebuilt = expand(pairs.clone());
        assert_eq!(flatten(&rebuilt), pairs);
    }

    #[test]
    fn expand_later_entry_wins() {
        let rebuilt = expand(vec![
            (vec!["a".to_string()], tree("1")),
            (vec!["a".to_string()], tree("2")),
        ]);
        assert_eq!(rebuilt, tree("a: 2"));
    }

    // --- normalize_keys ---

    #[test]
    fn numeric_and_bool_keys_become_strings() {
        let normalized = normalize_keys(&tree("1: one\ntrue: yes_value"), stringify_key).unwrap();
        assert_eq!(normalized, tree("\"1\": one\n\"true\": yes_value"));
    }

    #[test]
    fn container_key_is_rejected() {
        let result = normalize_keys(&tree("[a, b]: value"), stringify_key);
        assert!(matches!(result, Err(CofferError::InvalidKeyType { .. })));
    }

    #[test]
    fn nested_keys_normalized_inside_sequences() {
        let normalized = normalize_keys(&tree("list:\n  - 2: two"), stringify_key).unwrap();
        assert_eq!(normalized, tree("list:\n  - \"2\": two"));
    }

    // --- helpers ---

    #[test]
    fn join_name_concatenates() {
        let path = vec!["database".to_string(), "host".to_string()];
        assert_eq!(join_name(&path, "_"), "database_host");
        assert_eq!(join_name(&path, "."), "database.host");
    }

    #[test]
    fn scalar_to_string_renders_plain_forms() {
        assert_eq!(scalar_to_string(&Value::Null), "");
        assert_eq!(scalar_to_string(&Value::Bool(true)), "true");
        assert_eq!(scalar_to_string(&tree("42")), "42");
        assert_eq!(scalar_to_string(&Value::String("x".into())), "x");
    }
}

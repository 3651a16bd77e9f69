//! Namespace scoping: merge the branches selected by the namespace set
//! into their parent level, so one file can carry per-environment overrides
//! without duplicating unrelated keys.
//!
//! A mapping level is *namespaced* when at least one of its keys matches a
//! token in the set. At such a level:
//!
//! - matching branches are merged into the parent in token order, later
//!   tokens overriding earlier ones per the deep-merge rule;
//! - sibling mappings are other namespaces' branches and are dropped;
//! - scalar and sequence siblings are literal configuration and kept.
//!
//! Levels with no matching key pass through untouched, recursing into
//! children so nesting namespaces below ordinary keys works.

use serde_yaml::{Mapping, Value};

use crate::namespaces::NamespaceSet;
use crate::tree::deep_merge;

pub fn apply(tree: Value, namespaces: &NamespaceSet) -> Value {
    if namespaces.is_empty() {
        return tree;
    }
    match tree {
        Value::Mapping(map) => apply_level(map, namespaces),
        other => other,
    }
}

fn apply_level(map: Mapping, namespaces: &NamespaceSet) -> Value {
    let is_namespaced = map.keys().any(|key| {
        key.as_str()
            .map(|name| namespaces.contains(name))
            .unwrap_or(false)
    });

    if !is_namespaced {
        let mut out = Mapping::with_capacity(map.len());
        for (key, value) in map {
            out.insert(key, apply(value, namespaces));
        }
        return Value::Mapping(out);
    }

    // Literal (non-mapping) siblings survive alongside the merged branches.
    let mut result = Mapping::new();
    for (key, value) in &map {
        let matches = key
            .as_str()
            .map(|name| namespaces.contains(name))
            .unwrap_or(false);
        if !matches && !value.is_mapping() {
            result.insert(key.clone(), value.clone());
        }
    }

    let mut merged = Value::Mapping(result);
    for token in namespaces.iter() {
        let token_key = Value::String(token.to_string());
        if let Some(branch) = map.get(&token_key) {
            let scoped = apply(branch.clone(), namespaces);
            merged = deep_merge(merged, scoped);
        }
    }
    merged
}

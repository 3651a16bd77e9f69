//! Environment-variable overlay with type coercion.
//!
//! Every leaf's name path maps to a composite variable name: segments
//! upper-cased and joined with `_` (`database.host` → `DATABASE_HOST`).
//! When the injected environment snapshot holds that exact name, the
//! string value replaces the tree value, coerced to the *original* value's
//! type — never the key's name or any schema. Rules, first match wins:
//!
//! 1. literal `___nil___` / `___null___` → null
//! 2. original boolean: `true/t/yes` and `false/f/no`, case-insensitive;
//!    anything else fails
//! 3. original sequence: the string is parsed as a sequence literal and
//!    each element coerced to the original element type
//! 4. original integer/float: used when the string parses cleanly
//! 5. otherwise the raw string verbatim

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::error::{CofferError, Result, ValueKind};
use crate::tree::{join_name, NamePath};

const NULL_SENTINELS: [&str; 2] = ["___nil___", "___null___"];

/// Composite variable name for a name path.
pub fn variable_name(path: &[String]) -> String {
    join_name(path, "_").to_uppercase()
}

pub fn apply(tree: Value, env: &BTreeMap<String, String>) -> Result<Value> {
    let mut path = Vec::new();
    overlay(tree, &mut path, env)
}

fn overlay(value: Value, path: &mut NamePath, env: &BTreeMap<String, String>) -> Result<Value> {
    match value {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                let segment = key.as_str().unwrap_or_default().to_string();
                path.push(segment);
                let replaced = overlay(child, path, env)?;
                path.pop();
                out.insert(key, replaced);
            }
            Ok(Value::Mapping(out))
        }
        leaf => {
            let name = variable_name(path);
            match env.get(&name) {
                Some(raw) => coerce(leaf, raw, &name),
                None => Ok(leaf),
            }
        }
    }
}

fn coerce(original: Value, raw: &str, name: &str) -> Result<Value> {
    if NULL_SENTINELS.contains(&raw) {
        return Ok(Value::Null);
    }
    match original {
        Value::Bool(_) => coerce_bool(raw, name),
        Value::Sequence(seq) => coerce_sequence(seq.first(), raw, name),
        Value::Number(n) if n.is_i64() => Ok(raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string()))),
        Value::Number(_) => Ok(raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string()))),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn coerce_bool(raw: &str, name: &str) -> Result<Value> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" => Ok(Value::Bool(true)),
        "false" | "f" | "no" => Ok(Value::Bool(false)),
        _ => Err(CofferError::InvalidValue {
            kind: ValueKind::Boolean,
            key: name.to_string(),
            raw: raw.to_string(),
        }),
    }
}

fn coerce_sequence(template: Option<&Value>, raw: &str, name: &str) -> Result<Value> {
    let invalid = || CofferError::InvalidValue {
        kind: ValueKind::Array,
        key: name.to_string(),
        raw: raw.to_string(),
    };
    let parsed: Value = serde_yaml::from_str(raw).map_err(|_| invalid())?;
    let Value::Sequence(items) = parsed else {
        return Err(invalid());
    };
    let coerced = items
        .into_iter()
        .map(|item| coerce_element(template, item, name, raw))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Sequence(coerced))
}

/// Coerce one parsed element toward the original sequence's element type,
/// taken from its first entry. An empty original keeps parsed types as-is.
fn coerce_element(template: Option<&Value>, item: Value, name: &str, raw: &str) -> Result<Value> {
    let invalid = || CofferError::InvalidValue {
        kind: ValueKind::Array,
        key: name.to_string(),
        raw: raw.to_string(),
    };
    match template {
        Some(Value::String(_)) => Ok(Value::String(crate::tree::scalar_to_string(&item))),
        Some(Value::Bool(_)) => match item {
            Value::Bool(_) => Ok(item),
            Value::String(s) => coerce_bool(&s, name),
            _ => Err(invalid()),
        },
        Some(Value::Number(n)) if n.is_i64() => match item {
            Value::Number(ref m) if m.is_i64() => Ok(item),
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        Some(Value::Number(_)) => match item {
            Value::Number(m) => Ok(Value::from(m.as_f64().unwrap_or_default())),
            Value::String(s) => s.parse::<f64>().map(Value::from).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        _ => Ok(item),
    }
}

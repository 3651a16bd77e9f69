//! Strip the secure prefix from presented key names, so consumers address
//! `database.password` no matter whether the value is encrypted at rest.
//! When both `_secure_name` and a bare `name` exist at one level, the
//! translated key wins.

use serde_yaml::{Mapping, Value};

pub fn apply(tree: Value, prefix: &str) -> Value {
    match tree {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                let translated = match key.as_str().and_then(|name| name.strip_prefix(prefix)) {
                    Some(bare) => Value::String(bare.to_string()),
                    None => key,
                };
                out.insert(translated, apply(child, prefix));
            }
            Value::Mapping(out)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::tree;
    use pretty_assertions::assert_eq;

    #[test]
    fn prefix_is_stripped_at_every_level() {
        let result = apply(
            tree("_secure_token: t\ndb:\n  _secure_pass: p\n  host: h"),
            "_secure_",
        );
        assert_eq!(result, tree("token: t\ndb:\n  pass: p\n  host: h"));
    }

    #[test]
    fn unprefixed_keys_untouched() {
        let input = tree("host: pg\nport: 5432");
        assert_eq!(apply(input.clone(), "_secure_"), input);
    }

    #[test]
    fn translated_key_wins_on_collision() {
        let result = apply(tree("pass: old\n_secure_pass: new"), "_secure_");
        assert_eq!(result, tree("pass: new"));
    }
}

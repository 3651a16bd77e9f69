//! Encrypt plaintext values held under secure-prefixed keys.
//!
//! A key whose last segment starts with the secure prefix marks its value
//! as to-be-encrypted at rest. Values already shaped like ciphertext are
//! left alone, so re-running the filter over secured data is a no-op.
//! Non-string values are rendered to their plain string form first;
//! ciphertext is always a single flow scalar.

use serde_yaml::{Mapping, Value};

use crate::crypto::looks_encrypted;
use crate::error::{CofferError, Result};
use crate::filters::FilterContext;
use crate::tree::scalar_to_string;

pub fn apply(tree: Value, ctx: &FilterContext<'_>) -> Result<Value> {
    match tree {
        Value::Mapping(map) => {
            let mut out = Mapping::with_capacity(map.len());
            for (key, child) in map {
                let is_secure = key
                    .as_str()
                    .map(|name| name.starts_with(ctx.secure_prefix))
                    .unwrap_or(false);
                let replaced = if is_secure && !child.is_mapping() {
                    encrypt_leaf(child, ctx)?
                } else {
                    apply(child, ctx)?
                };
                out.insert(key, replaced);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other),
    }
}

fn encrypt_leaf(value: Value, ctx: &FilterContext<'_>) -> Result<Value> {
    if let Value::String(ref s) = value
        && looks_encrypted(s)
    {
        return Ok(value);
    }
    let key = ctx
        .encryption_keys
        .default_keys()
        .first()
        .ok_or(CofferError::MissingEncryptionKey)?;
    let plaintext = scalar_to_string(&value);
    let ciphertext = ctx.cipher.encrypt(&plaintext, key.bytes())?;
    Ok(Value::String(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::{tree, TestContext};

    #[test]
    fn secure_prefixed_value_is_encrypted() {
        let tc = TestContext::with_keypair();
        let result = apply(tree("_secure_pass: hunter2\nhost: pg"), &tc.context()).unwrap();
        let Value::Mapping(map) = result else {
            panic!("expected mapping")
        };
        let sealed = map
            .get(&Value::String("_secure_pass".into()))
            .and_then(Value::as_str)
            .unwrap();
        assert!(looks_encrypted(sealed));
        assert_eq!(
            map.get(&Value::String("host".into())),
            Some(&Value::String("pg".into()))
        );
    }

    #[test]
    fn nested_secure_keys_are_found() {
        let tc = TestContext::with_keypair();
        let result = apply(tree("db:\n  _secure_pass: hunter2"), &tc.context()).unwrap();
        let sealed = result["db"]["_secure_pass"].as_str().unwrap();
        assert!(looks_encrypted(sealed));
    }

    #[test]
    fn already_encrypted_value_is_untouched() {
        let tc = TestContext::with_keypair();
        let once = apply(tree("_secure_pass: hunter2"), &tc.context()).unwrap();
        let twice = apply(once.clone(), &tc.context()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_string_secure_value_is_stringified_then_encrypted() {
        let tc = TestContext::with_keypair();
        let result = apply(tree("_secure_port: 5432"), &tc.context()).unwrap();
        assert!(looks_encrypted(result["_secure_port"].as_str().unwrap()));
    }

    #[test]
    fn missing_encryption_key_is_an_error() {
        let tc = TestContext::empty();
        let result = apply(tree("_secure_pass: hunter2"), &tc.context());
        assert!(matches!(result, Err(CofferError::MissingEncryptionKey)));
    }

    #[test]
    fn unprefixed_keys_are_never_encrypted() {
        let tc = TestContext::with_keypair();
        let input = tree("pass: hunter2");
        assert_eq!(apply(input.clone(), &tc.context()).unwrap(), input);
    }
}

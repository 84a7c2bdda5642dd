//! Layered YAML configuration: load, deep-merge, canonicalize, hash.
//!
//! Config files never carry secret values directly — only env var NAMES
//! (see [`secrets`]). [`load_layered_yaml`] rejects any literal value that
//! looks like a credential before it is ever merged into the in-memory tree,
//! so a leaked key never makes it into a config hash, a log line, or a
//! debug dump.

pub mod consumption;
pub mod queue;
pub mod secrets;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use consumption::consumed_pointers;
pub use queue::{resolve_max_connections, validate_pool_capacity, ProcessorConfig, QueueConfig};
pub use secrets::{resolve_db_url, ResolvedDbSecret};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut contents = Vec::with_capacity(paths.len());
    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        contents.push(s);
    }
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Same as [`load_layered_yaml`] but takes YAML source already in memory —
/// used by tests and by callers composing config from something other than
/// the filesystem (e.g. an embedded default layer).
pub fn load_layered_yaml_from_strings(yamls: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for (i, s) in yamls.iter().enumerate() {
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(s).with_context(|| format!("parse yaml layer {i}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    reject_literal_secrets(&merged)?;

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Reject any string leaf that looks like a credential rather than an env
/// var name or a plain config value. Config stores env var NAMES only; a
/// literal secret in the tree is a config-authoring bug we fail closed on.
fn reject_literal_secrets(v: &Value) -> Result<()> {
    walk_for_secrets(v, &mut String::new())
}

fn walk_for_secrets(v: &Value, pointer: &mut String) -> Result<()> {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let depth = pointer.len();
                pointer.push('/');
                pointer.push_str(k);
                walk_for_secrets(child, pointer)?;
                pointer.truncate(depth);
            }
            Ok(())
        }
        Value::Array(arr) => {
            for (i, child) in arr.iter().enumerate() {
                let depth = pointer.len();
                pointer.push('/');
                pointer.push_str(&i.to_string());
                walk_for_secrets(child, pointer)?;
                pointer.truncate(depth);
            }
            Ok(())
        }
        Value::String(s) => {
            if looks_like_secret_value(s) {
                bail!("CONFIG_SECRET_DETECTED: literal secret-like value at {pointer}");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn looks_like_secret_value(s: &str) -> bool {
    if s.starts_with("sk-") || s.starts_with("sk-proj-") {
        return true;
    }
    if s.starts_with("AKIA") && s.len() >= 16 && s.chars().all(|c| c.is_ascii_alphanumeric()) {
        return true;
    }
    if s.contains("BEGIN RSA PRIVATE KEY")
        || s.contains("BEGIN PRIVATE KEY")
        || s.contains("BEGIN EC PRIVATE KEY")
    {
        return true;
    }
    false
}

/// How strictly [`report_unused_keys`] treats config keys that nothing reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct UnusedKeysReport {
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeysReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Walk every leaf in `config_json` and flag pointers that fall outside
/// every registered prefix in [`consumed_pointers`]. Under
/// [`UnusedKeyPolicy::Fail`] a non-empty report is an error; under `Warn`
/// it is returned for the caller to log.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeysReport> {
    let consumed = consumed_pointers();
    let mut unused = Vec::new();
    collect_unused_leaves(config_json, &mut String::new(), consumed, &mut unused);
    unused.sort();

    let report = UnusedKeysReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config key(s): {}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.join(", "),
        );
    }

    Ok(report)
}

fn collect_unused_leaves(v: &Value, pointer: &mut String, consumed: &[&str], out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let depth = pointer.len();
                pointer.push('/');
                pointer.push_str(k);
                collect_unused_leaves(child, pointer, consumed, out);
                pointer.truncate(depth);
            }
        }
        _ => {
            if !is_consumed(pointer, consumed) {
                out.push(pointer.clone());
            }
        }
    }
}

/// A leaf pointer is consumed if it falls under (or exactly matches) a
/// registered prefix. `/queue/db_table` is consumed by `/queue`, but
/// `/queue_extra/foo` is not.
fn is_consumed(pointer: &str, consumed: &[&str]) -> bool {
    consumed
        .iter()
        .any(|p| pointer == *p || pointer.starts_with(&format!("{p}/")))
}

//! Layered YAML import.
//!
//! Documents are merged in order (earlier = base, later = override) into a
//! single JSON value. The integration section, keyed by [`DOMAIN`], becomes
//! the import payload for the config flow. The canonical JSON of the merged
//! section is hashed so callers can tell whether an import changed anything.

use std::fs;

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{UserInput, DOMAIN};

#[derive(Debug, Clone)]
pub struct LoadedImport {
    pub config_hash: String,
    pub canonical_json: String,
    /// `None` when no document carries the integration section.
    pub import: Option<UserInput>,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedImport> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedImport> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let section = merged.get(DOMAIN).cloned().unwrap_or(Value::Null);
    let import = match &section {
        Value::Null => None,
        // An explicit empty mapping means "import with defaults".
        Value::Object(map) if map.is_empty() => Some(UserInput::default()),
        other => Some(
            serde_json::from_value::<UserInput>(other.clone())
                .with_context(|| format!("invalid `{DOMAIN}` section"))?,
        ),
    };

    let canonical_json =
        serde_json::to_string(&section).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedImport {
        config_hash,
        canonical_json,
        import,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

//! Override-framework manifest for generated Mixin and Accessor artifacts.
//!
//! The loader discovers mixin configurations through the `mixins` array of
//! the application metadata entry, so besides writing the configuration the
//! processor appends its entry name to that array.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use classweave_archive::ArchiveEntry;

pub const DEFAULT_METADATA_ENTRY: &str = "fabric.mod.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixinConfig {
    pub required: bool,
    pub package: String,
    pub compatibility_level: String,
    pub mixins: Vec<String>,
}

impl MixinConfig {
    /// Config for artifacts `<group>/mixin/...`; listed names are relative
    /// to the `<group>.mixin` package.
    pub fn new(group: &str, artifacts: &[String]) -> Self {
        let prefix = format!("{}/mixin/", group);
        let mut mixins: Vec<String> = artifacts
            .iter()
            .map(|name| name.strip_prefix(&prefix).unwrap_or(name).replace('/', "."))
            .collect();
        mixins.sort();
        Self {
            required: true,
            package: format!("{}.mixin", group.replace('/', ".")),
            compatibility_level: "JAVA_8".to_string(),
            mixins,
        }
    }

    pub fn to_entry(&self, group: &str) -> Result<ArchiveEntry> {
        let json = serde_json::to_vec_pretty(self)?;
        Ok(ArchiveEntry::file(&config_entry_name(group), json))
    }
}

pub fn config_entry_name(group: &str) -> String {
    format!("mixins.classweave-generated.{}.json", group)
}

/// Appends `config_name` to the metadata's `mixins` array, creating it when
/// missing. Already registered names are left alone.
pub fn register_config(metadata: &[u8], config_name: &str) -> Result<Vec<u8>> {
    let mut root: Value = serde_json::from_slice(metadata).context("Failed to parse application metadata")?;
    let object = root
        .as_object_mut()
        .ok_or_else(|| anyhow!("application metadata is not a JSON object"))?;
    let mixins = object
        .entry("mixins")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| anyhow!("application metadata `mixins` is not an array"))?;

    let registered = mixins.iter().any(|m| match m {
        Value::String(s) => s == config_name,
        Value::Object(o) => o.get("config").and_then(Value::as_str) == Some(config_name),
        _ => false,
    });
    if !registered {
        mixins.push(Value::String(config_name.to_string()));
    }
    Ok(serde_json::to_vec_pretty(&root)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_shape() {
        let config = MixinConfig::new(
            "g0a1b2c3d4e",
            &[
                "g0a1b2c3d4e/mixin/m/net/minecraft/FooMixin".to_string(),
                "g0a1b2c3d4e/mixin/a/net/minecraft/FooAccessor".to_string(),
            ],
        );
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({
                "required": true,
                "package": "g0a1b2c3d4e.mixin",
                "compatibilityLevel": "JAVA_8",
                "mixins": ["a.net.minecraft.FooAccessor", "m.net.minecraft.FooMixin"]
            })
        );
        let entry = config.to_entry("g0a1b2c3d4e").unwrap();
        assert_eq!(entry.name, "mixins.classweave-generated.g0a1b2c3d4e.json");
    }

    #[test]
    fn test_register_creates_and_appends() {
        let created = register_config(br#"{"id":"mod"}"#, "a.json").unwrap();
        let value: Value = serde_json::from_slice(&created).unwrap();
        assert_eq!(value["mixins"], json!(["a.json"]));

        let appended = register_config(&created, "b.json").unwrap();
        let again = register_config(&appended, "b.json").unwrap();
        let value: Value = serde_json::from_slice(&again).unwrap();
        assert_eq!(value["mixins"], json!(["a.json", "b.json"]));
        assert_eq!(value["id"], json!("mod"));
    }

    #[test]
    fn test_register_rejects_non_object() {
        assert!(register_config(b"[]", "a.json").is_err());
        assert!(register_config(br#"{"mixins":"x"}"#, "a.json").is_err());
    }
}

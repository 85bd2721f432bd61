//! # Configuration
//!
//! Two kinds of configuration live here.
//!
//! - **Template settings**: the `limits`, `resolver` and `runtime` blobs a
//!   template stores as opaque JSON. [`TemplateSettings::decode`] turns them
//!   into typed structs at the point of use. Missing fields take the stock
//!   defaults, and a `null` or absent blob decodes to the defaults.
//! - **CLI configuration**: an optional TOML file read by the `vmsys` binary
//!   ([`CliConfig::load`]).

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::VmError;
use crate::models::{TemplateId, TemplateSettingsRecord};

/// Resource limits declared on a template. Only `max_events` and
/// `max_output_kb` are checked, by the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub cpu_ms: u64,
    pub wall_ms: u64,
    pub mem_mb: u64,
    pub max_events: u64,
    pub max_output_kb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            cpu_ms: 2000,
            wall_ms: 5000,
            mem_mb: 128,
            max_events: 50_000,
            max_output_kb: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub roots: Vec<String>,
    pub extensions: Vec<String>,
    pub allow_absolute_repo_imports: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            roots: vec![".".to_string()],
            extensions: vec![".js".to_string(), ".mjs".to_string()],
            allow_absolute_repo_imports: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Stored and round-tripped but not applied: the runtime evaluates every
    /// snippet and file as a classic script.
    pub esm: bool,
    /// Stored and round-tripped but not applied.
    pub strict: bool,
    /// Install the `console` shim.
    pub console: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            esm: true,
            strict: true,
            console: true,
        }
    }
}

/// Decoded template settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemplateSettings {
    pub limits: LimitsConfig,
    pub resolver: ResolverConfig,
    pub runtime: RuntimeConfig,
}

impl TemplateSettings {
    pub fn defaults() -> Self {
        Self::default()
    }

    pub fn decode(record: &TemplateSettingsRecord) -> Result<Self, VmError> {
        Ok(Self {
            limits: decode_blob("limits", &record.limits)?,
            resolver: decode_blob("resolver", &record.resolver)?,
            runtime: decode_blob("runtime", &record.runtime)?,
        })
    }

    pub fn to_record(&self, template_id: &TemplateId) -> Result<TemplateSettingsRecord, VmError> {
        let encode = |field: &'static str, value: Result<Value, serde_json::Error>| {
            value.map_err(|source| VmError::InvalidConfig { field, source })
        };
        Ok(TemplateSettingsRecord {
            template_id: template_id.clone(),
            limits: encode("limits", serde_json::to_value(&self.limits))?,
            resolver: encode("resolver", serde_json::to_value(&self.resolver))?,
            runtime: encode("runtime", serde_json::to_value(&self.runtime))?,
        })
    }
}

/// Decode one blob; JSON `null` yields the type's defaults.
pub fn decode_blob<T>(field: &'static str, raw: &Value) -> Result<T, VmError>
where
    T: DeserializeOwned + Default,
{
    if raw.is_null() {
        return Ok(T::default());
    }
    T::deserialize(raw).map_err(|source| VmError::InvalidConfig { field, source })
}

/// Settings file for the `vmsys` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub log_level: String,
    pub log_to_file: bool,
    /// Directory holding cached `<name>.js` libraries.
    pub library_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            library_dir: PathBuf::from(".vm-cache/libraries"),
        }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

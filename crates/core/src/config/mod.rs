//! Instrumentation configuration.
//!
//! Every knob has a default matching the LAVA runtime (`vm_lava_query_buffer`,
//! `vm_lava_attack_point`, `pirate_mark_lava.h`), so a config file only needs
//! to list what it changes. Files may be YAML (`.yaml`/`.yml`) or JSON (`.json`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
}

/// Function-name patterns: a name matches if it equals any `exact` entry or
/// contains any `contains` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTable {
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub contains: Vec<String>,
}

impl PatternTable {
    pub fn new<E, C>(exact: E, contains: C) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            contains: contains.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.exact.iter().any(|e| e == name)
            || self.contains.iter().any(|c| !c.is_empty() && name.contains(c.as_str()))
    }
}

/// Which calls get which wrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallPolicy {
    /// Callees treated as attack points (copy, allocation, exec-family, ...).
    pub attack_points: PatternTable,
    /// Callees whose arguments and return value are never probed.
    pub taint_exclusions: PatternTable,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            attack_points: PatternTable::new(
                Vec::<String>::new(),
                [
                    "memcpy", "malloc", "memmove", "bcopy", "strcpy", "strncpy", "strcat",
                    "strncat", "exec", "popen",
                ],
            ),
            taint_exclusions: PatternTable::new(
                [
                    "vm_lava_query_buffer",
                    "va_start",
                    "va_arg",
                    "va_end",
                    "va_copy",
                    "__builtin_va_start",
                    "__builtin_va_arg",
                    "__builtin_va_end",
                    "__builtin_va_copy",
                ],
                ["free"],
            ),
        }
    }
}

impl CallPolicy {
    pub fn is_attack_point(&self, callee: &str) -> bool {
        self.attack_points.matches(callee)
    }

    pub fn excludes_argument_taint(&self, callee: &str) -> bool {
        self.taint_exclusions.matches(callee)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Oracle call `f(addr, size, file_id, symbol_id, line)`.
    pub probe_function: String,
    /// Oracle call `f(file_id, line, callee_id)`.
    pub attack_function: String,
    /// Header declaring both oracle calls; included at the top of every output.
    pub header: String,
    /// Prefix for synthesized temporaries; a random number is appended.
    pub temp_prefix: String,
    /// Struct members never probed during field expansion.
    pub reserved_fields: Vec<String>,
    /// Also probe file-scope variables at every function entry.
    pub probe_globals: bool,
    pub policy: CallPolicy,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            probe_function: "vm_lava_query_buffer".to_string(),
            attack_function: "vm_lava_attack_point".to_string(),
            header: "pirate_mark_lava.h".to_string(),
            temp_prefix: "kbcieiubweuhc".to_string(),
            reserved_fields: vec!["__st_ino".to_string()],
            probe_globals: false,
            policy: CallPolicy::default(),
        }
    }
}

impl InstrumentConfig {
    /// Whether `callee` may receive the argument-taint wrap.
    pub fn wants_argument_taint(&self, callee: &str) -> bool {
        callee != self.probe_function
            && callee != self.attack_function
            && !self.policy.excludes_argument_taint(callee)
    }
}

/// Load an `InstrumentConfig` from a YAML or JSON file, chosen by extension.
pub fn load_config(path: &Path) -> Result<InstrumentConfig, ConfigError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    if !matches!(ext.as_str(), "yaml" | "yml" | "json") {
        return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
    }
    let body = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if ext == "json" {
        serde_json::from_str(&body)
            .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
    } else {
        serde_yaml::from_str(&body)
            .map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })
    }
}

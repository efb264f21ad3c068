//! Supervisor and console-client configuration.
//!
//! Concrete config structs carry no optional fields; user input arrives
//! as all-optional patch structs and is folded over the defaults by pure
//! merge functions with per-field precedence (patch wins, everything else
//! comes from the default). Patches deserialize from TOML.

mod patterns;

pub use patterns::{EventPatternSet, LineCategory};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error building a configuration from a patch
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A supplied event pattern failed to compile
    #[error("invalid {category} pattern: {source}")]
    Pattern {
        category: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Connection settings for the RCON client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Dispatch tick period: at most one command is sent per tick
    pub dispatch_interval_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25575,
            password: "password".to_string(),
            dispatch_interval_ms: 200,
        }
    }
}

/// Optional overrides for [`RconConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RconConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub dispatch_interval_ms: Option<u64>,
}

impl RconConfig {
    /// Fold a patch over the defaults; set fields win
    pub fn merged(patch: RconConfigPatch) -> Self {
        let defaults = Self::default();
        Self {
            host: patch.host.unwrap_or(defaults.host),
            port: patch.port.unwrap_or(defaults.port),
            password: patch.password.unwrap_or(defaults.password),
            dispatch_interval_ms: patch
                .dispatch_interval_ms
                .unwrap_or(defaults.dispatch_interval_ms),
        }
    }
}

/// One `server.properties` value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(value) => write!(f, "{value}"),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u16> for PropertyValue {
    fn from(value: u16) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// User-supplied `server.properties` entries, keyed by property name.
///
/// Sorted storage keeps the generated file deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerProperties(pub BTreeMap<String, PropertyValue>);

impl ServerProperties {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }
}

/// Optional overrides for the built-in event patterns, as regex source
/// strings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatternsPatch {
    pub start: Option<String>,
    pub stop: Option<String>,
    pub crash: Option<String>,
    pub eula: Option<String>,
}

/// Everything needed to supervise one server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server jar file name, relative to `path`
    pub jar: String,
    /// Server flavor, selects the built-in pattern profile
    pub flavor: String,
    /// Working directory the server runs in
    pub path: PathBuf,
    pub executable: String,
    /// JVM arguments, placed before `-jar`
    pub args: Vec<String>,
    /// Whether to accept the EULA in the generated `eula.txt`
    pub eula: bool,
    pub properties: ServerProperties,
    pub event_patterns: EventPatternSet,
    /// Game port written to `server.properties`
    pub port: u16,
    pub rcon: RconConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            jar: "server.jar".to_string(),
            flavor: "vanilla".to_string(),
            path: PathBuf::from("."),
            executable: "java".to_string(),
            args: vec!["-Xms1G".to_string(), "-Xmx1G".to_string()],
            eula: false,
            properties: ServerProperties::default(),
            event_patterns: EventPatternSet::profile("vanilla").clone(),
            port: 25565,
            rcon: RconConfig::default(),
        }
    }
}

/// Optional overrides for [`ServerConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigPatch {
    pub jar: Option<String>,
    pub flavor: Option<String>,
    pub path: Option<PathBuf>,
    pub executable: Option<String>,
    pub args: Option<Vec<String>>,
    pub eula: Option<bool>,
    pub properties: Option<ServerProperties>,
    pub event_patterns: Option<EventPatternsPatch>,
    pub port: Option<u16>,
    pub rcon: Option<RconConfigPatch>,
}

impl ServerConfig {
    /// Fold a patch over the defaults.
    ///
    /// The pattern profile follows the patched flavor; individual pattern
    /// overrides are compiled on top of the profile and win per category.
    pub fn merged(patch: ServerConfigPatch) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let flavor = patch.flavor.unwrap_or(defaults.flavor);

        let mut event_patterns = EventPatternSet::profile(&flavor).clone();
        if let Some(overrides) = patch.event_patterns {
            if let Some(pattern) = overrides.start {
                event_patterns.start = compile("start", &pattern)?;
            }
            if let Some(pattern) = overrides.stop {
                event_patterns.stop = compile("stop", &pattern)?;
            }
            if let Some(pattern) = overrides.crash {
                event_patterns.crash = compile("crash", &pattern)?;
            }
            if let Some(pattern) = overrides.eula {
                event_patterns.eula = Some(compile("eula", &pattern)?);
            }
        }

        Ok(Self {
            jar: patch.jar.unwrap_or(defaults.jar),
            flavor,
            path: patch.path.unwrap_or(defaults.path),
            executable: patch.executable.unwrap_or(defaults.executable),
            args: patch.args.unwrap_or(defaults.args),
            eula: patch.eula.unwrap_or(defaults.eula),
            properties: patch.properties.unwrap_or(defaults.properties),
            event_patterns,
            port: patch.port.unwrap_or(defaults.port),
            rcon: RconConfig::merged(patch.rcon.unwrap_or_default()),
        })
    }

    /// Load a patch from a TOML file and merge it over the defaults
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let patch: ServerConfigPatch = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        Ok(Self::merged(patch)?)
    }
}

fn compile(category: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern { category, source })
}

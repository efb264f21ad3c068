//! `server.properties` generation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{PropertyValue, ServerConfig};

/// Write `server.properties` into the server directory.
///
/// User-supplied properties are written as-is except for the
/// supervisor-controlled core keys (game port, RCON wiring), which always
/// override user entries so the console client can actually reach the
/// server it launched.
pub fn write_properties(dir: &Path, config: &ServerConfig) -> Result<()> {
    let path = dir.join("server.properties");

    let mut entries = config.properties.0.clone();
    entries.insert("server-port".to_string(), PropertyValue::from(config.port));
    entries.insert("rcon.port".to_string(), PropertyValue::from(config.rcon.port));
    entries.insert(
        "rcon.password".to_string(),
        PropertyValue::from(config.rcon.password.as_str()),
    );
    entries.insert("enable-rcon".to_string(), PropertyValue::from(true));

    let body = entries
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n");

    std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
}

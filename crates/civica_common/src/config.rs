//! Daemon configuration.
//!
//! Config file: /etc/civica/config.toml, overridable on the command line.
//! Every section has workable defaults so a missing file still boots a
//! development instance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gateway::GatewayConfig;
use crate::llm_client::LlmConfig;
use crate::retrieval::RetrievalConfig;

/// Session-store tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is eligible for eviction
    pub idle_secs: u64,
    /// Sweep period in seconds
    pub sweep_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_secs: 3600,
            sweep_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/civica/civica.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the inbound surface
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CivicaConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl CivicaConfig {
    /// Load from a path, falling back to defaults when the file is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        let config: CivicaConfig = toml::from_str(&contents)
            .with_context(|| format!("parsing config at {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CivicaConfig::default();
        assert_eq!(config.sessions.idle_secs, 3600);
        assert_eq!(config.sessions.sweep_secs, 3600);
        assert!(config.llm.enabled);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let original = CivicaConfig::default();
        let toml_string = toml::to_string(&original).unwrap();
        let parsed: CivicaConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.llm.model, original.llm.model);
        assert_eq!(parsed.database.path, original.database.path);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let partial = r#"
            [llm]
            enabled = true
            endpoint = "http://localhost:11434"
            model = "llama3.2:3b"
            timeout_secs = 30
        "#;
        let config: CivicaConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.llm.model, "llama3.2:3b");
        assert_eq!(config.sessions.idle_secs, 3600);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = CivicaConfig::load("/nonexistent/civica.toml").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }
}

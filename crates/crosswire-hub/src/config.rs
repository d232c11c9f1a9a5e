//! Hub config loader (strict parsing).

use std::fs;
use std::time::Duration;

use crosswire_core::{CrosswireError, Result};
use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::server::ServerOptions;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub version: u32,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub server: ServerSection,
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CrosswireError::UnsupportedVersion);
        }
        self.engine.validate()?;
        self.server.validate()?;
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            prefix: self.engine.prefix.clone(),
            timeout: Duration::from_millis(self.engine.timeout_ms),
            sweep_interval: Duration::from_millis(self.engine.sweep_interval_ms),
            throw_status: self.engine.throw_status,
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            engine: self.engine_options(),
            emit_timeout: Duration::from_millis(self.server.emit_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default = "default_throw_status")]
    pub throw_status: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            timeout_ms: default_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            throw_status: default_throw_status(),
        }
    }
}

impl EngineSection {
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(CrosswireError::Config(
                "engine.sweep_interval_ms must be greater than 0".into(),
            ));
        }
        if self.timeout_ms < self.sweep_interval_ms {
            return Err(CrosswireError::Config(
                "engine.timeout_ms must be at least sweep_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

// 10 minutes, matching the engine default.
fn default_timeout_ms() -> u64 {
    1000 * 60 * 10
}
fn default_sweep_interval_ms() -> u64 {
    5000
}
fn default_throw_status() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_emit_timeout_ms")]
    pub emit_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            emit_timeout_ms: default_emit_timeout_ms(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.emit_timeout_ms == 0 {
            return Err(CrosswireError::Config(
                "server.emit_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// 8 minutes, matching the broadcast default.
fn default_emit_timeout_ms() -> u64 {
    1000 * 60 * 8
}

pub fn load_from_file(path: &str) -> Result<HubConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CrosswireError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<HubConfig> {
    let cfg: HubConfig = serde_yaml::from_str(s)
        .map_err(|e| CrosswireError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

//! Node configuration file.

use std::path::Path;

use postmatch_types::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::{Result, read_json};

/// Log output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub engine: EngineConfig,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            log_filter: "info".into(),
            log_format: LogFormat::Human,
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file and validate the engine section.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = read_json(path, "node config")?;
        config.engine.validate()?;
        Ok(config)
    }
}

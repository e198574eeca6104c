//! # postmatch-node
//!
//! Runs the P2P engine outside a chain: loads a [`NodeConfig`], installs
//! logging, and replays a scenario file of blocks whose commands arrive as
//! ed25519-signed envelopes.
//!
//! ```text
//! scenario.json ─▶ SignedCommand::verify ─▶ P2pEngine::execute ─▶ end_block ─▶ JSON lines
//! ```

pub mod config;
pub mod envelope;
pub mod replay;
pub mod telemetry;

use std::path::PathBuf;

use postmatch_types::PostmatchError;

pub use config::{LogFormat, NodeConfig};
pub use envelope::SignedCommand;
pub use replay::{GenesisBalance, ReplayLine, ReplaySummary, Replayer, Scenario, ScenarioBlock};

/// Errors surfaced by the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("telemetry setup failed: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Engine(#[from] PostmatchError),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Read and parse a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path, what: &'static str) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|source| NodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| NodeError::Parse { what, source })
}

//! `postmatch-node` binary entrypoint.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use postmatch_node::{NodeConfig, NodeError, Replayer, Scenario, SignedCommand, read_json, telemetry};
use postmatch_settlement::Command;
use postmatch_types::Address;

#[derive(Debug, Parser)]
#[command(name = "postmatch-node", version, about = "Replay signed P2P desk commands block by block")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a scenario file and print one JSON line per block.
    Replay {
        /// Node config (JSON); defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scenario file (JSON).
        scenario: PathBuf,
    },
    /// Generate an ed25519 key pair and its account address.
    Keygen,
    /// Sign an unsigned command file with a hex secret key.
    Sign {
        #[arg(long, env = "POSTMATCH_SECRET_KEY")]
        secret_key: String,
        /// Command file (JSON).
        command: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Commands::Replay { config, scenario } => {
            let config = match config {
                Some(path) => NodeConfig::load(&path)?,
                None => NodeConfig::default(),
            };
            telemetry::init(&config.log_filter, config.log_format)?;
            let scenario: Scenario = read_json(&scenario, "scenario")?;
            let mut replayer = Replayer::new(config.engine, io::stdout().lock())?;
            replayer.run(scenario)?;
            Ok(())
        }
        Commands::Keygen => {
            let key = SigningKey::generate(&mut rand::rngs::OsRng);
            let verifying = key.verifying_key();
            print_json(&serde_json::json!({
                "secret_key": hex::encode(key.to_bytes()),
                "public_key": hex::encode(verifying.as_bytes()),
                "address": Address::from_verifying_key(&verifying),
            }))
        }
        Commands::Sign {
            secret_key,
            command,
        } => {
            let secret: [u8; 32] = hex::decode(secret_key.trim())
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| NodeError::Engine(postmatch_types::PostmatchError::InvalidSignature {
                    reason: "secret key must be 32 hex-encoded bytes".into(),
                }))?;
            let command: Command = read_json(&command, "command")?;
            let envelope = SignedCommand::sign(command, &SigningKey::from_bytes(&secret))?;
            print_json(&envelope)
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), NodeError> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).map_err(|e| NodeError::Output(e.into()))?;
    writeln!(out).map_err(NodeError::Output)
}

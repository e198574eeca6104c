//! Block replay driver.
//!
//! A scenario is a genesis allocation plus a list of blocks, each carrying
//! signed commands:
//!
//! ```json
//! {
//!   "genesis": [{ "account": "pm1…", "amount": "10000" }],
//!   "blocks": [{ "height": 1, "time": "2024-01-01T00:00:00Z", "commands": [ … ] }]
//! }
//! ```
//!
//! Each command that fails verification or execution is reported as a
//! `rejected` line and skipped; the block still seals. Every sealed block
//! is written as one `block` line, and a final `summary` line carries the
//! state digest and custody audit.

use std::io::Write;

use chrono::{DateTime, Utc};
use postmatch_settlement::{AuditReport, P2pEngine, SweepReport};
use postmatch_types::{Address, BlockContext, EngineConfig, Event};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::envelope::SignedCommand;
use crate::{NodeError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: Address,
    pub amount: Decimal,
    /// Defaults to the engine's settlement asset.
    #[serde(default)]
    pub asset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioBlock {
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub commands: Vec<SignedCommand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub genesis: Vec<GenesisBalance>,
    pub blocks: Vec<ScenarioBlock>,
}

impl Scenario {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|source| NodeError::Parse {
            what: "scenario",
            source,
        })
    }
}

/// One output record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayLine {
    Rejected {
        height: u64,
        index: usize,
        command: &'static str,
        error: String,
    },
    Block {
        height: u64,
        time: DateTime<Utc>,
        trade_root: String,
        trades: usize,
        events: Vec<Event>,
        sweep: SweepReport,
    },
    Summary(ReplaySummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub blocks: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub state_digest: String,
    pub audit: AuditReport,
}

/// Feeds a scenario through a fresh engine.
pub struct Replayer<W> {
    engine: P2pEngine,
    out: W,
}

impl<W: Write> Replayer<W> {
    pub fn new(config: EngineConfig, out: W) -> Result<Self> {
        Ok(Self {
            engine: P2pEngine::new(config)?,
            out,
        })
    }

    #[must_use]
    pub fn engine(&self) -> &P2pEngine {
        &self.engine
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn run(&mut self, scenario: Scenario) -> Result<ReplaySummary> {
        let asset = self.engine.config().asset.clone();
        for grant in &scenario.genesis {
            let asset = grant.asset.as_deref().unwrap_or(&asset);
            self.engine.bank_mut().mint(&grant.account, asset, grant.amount)?;
        }

        let (mut accepted, mut rejected) = (0, 0);
        let blocks = scenario.blocks.len();
        for block in scenario.blocks {
            let height = block.height;
            self.engine
                .begin_block(BlockContext::new(height, block.time))?;

            for (index, envelope) in block.commands.into_iter().enumerate() {
                let kind = envelope.command.kind();
                let verified = envelope.verify().map(|_| ());
                let outcome = verified.and_then(|()| self.engine.execute(envelope.into_command()));
                match outcome {
                    Ok(_) => accepted += 1,
                    Err(err) => {
                        rejected += 1;
                        tracing::warn!(height, index, command = kind, error = %err, "command rejected");
                        self.emit(&ReplayLine::Rejected {
                            height,
                            index,
                            command: kind,
                            error: err.to_string(),
                        })?;
                    }
                }
            }

            let sealed = self.engine.end_block()?;
            self.emit(&ReplayLine::Block {
                height: sealed.height,
                time: sealed.time,
                trade_root: sealed.trade_root,
                trades: sealed.trades.len(),
                events: sealed.events,
                sweep: sealed.sweep,
            })?;
        }

        let summary = ReplaySummary {
            blocks,
            accepted,
            rejected,
            state_digest: self.engine.store().state_digest_hex(),
            audit: self.engine.audit()?,
        };
        tracing::info!(
            blocks,
            accepted,
            rejected,
            digest = %summary.state_digest,
            "replay finished"
        );
        self.emit(&ReplayLine::Summary(summary.clone()))?;
        Ok(summary)
    }

    fn emit(&mut self, line: &ReplayLine) -> Result<()> {
        serde_json::to_writer(&mut self.out, line).map_err(|e| NodeError::Output(e.into()))?;
        writeln!(self.out).map_err(NodeError::Output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use postmatch_settlement::Command;
    use postmatch_types::{OrderId, OrderSide, OrderStatus};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(seed: u64) -> (SigningKey, Address) {
        let key = SigningKey::generate(&mut StdRng::seed_from_u64(seed));
        let address = Address::from_verifying_key(&key.verifying_key());
        (key, address)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn replay_creates_funds_and_reports() {
        let (seller_key, seller) = key(1);
        let (_, stranger) = key(2);
        let create = Command::CreateOrder {
            creator: seller,
            order: postmatch_ingress::OrderRequest::dummy(OrderSide::Sell, "110001", Decimal::new(100, 0)),
        };
        // The first id in block 1 is deterministic.
        let order_id = OrderId::deterministic(1, 0);
        let fund = Command::DepositToEscrow {
            order_id,
            depositor: seller,
            amount: Decimal::new(100, 0),
        };
        let forged = SignedCommand::sign(
            Command::CancelOrder {
                order_id,
                by: stranger,
                reason: "forged".into(),
            },
            &seller_key,
        )
        .unwrap();

        let scenario = Scenario {
            genesis: vec![GenesisBalance {
                account: seller,
                amount: Decimal::new(1_000, 0),
                asset: None,
            }],
            blocks: vec![ScenarioBlock {
                height: 1,
                time: at(0),
                commands: vec![
                    SignedCommand::sign(create, &seller_key).unwrap(),
                    SignedCommand::sign(fund, &seller_key).unwrap(),
                    forged,
                ],
            }],
        };

        let mut replayer = Replayer::new(EngineConfig::default(), Vec::new()).unwrap();
        let summary = replayer.run(scenario).unwrap();
        assert_eq!((summary.accepted, summary.rejected), (2, 1));
        assert_eq!(summary.audit.escrows_holding, 1);
        assert_eq!(
            replayer.engine().order(&order_id).unwrap().status,
            OrderStatus::Active
        );

        let output = String::from_utf8(replayer.into_output()).unwrap();
        let kinds: Vec<String> = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["type"].to_string())
            .collect();
        assert_eq!(kinds, vec!["\"rejected\"", "\"block\"", "\"summary\""]);
    }

    #[test]
    fn blocks_must_advance() {
        let scenario = Scenario {
            genesis: Vec::new(),
            blocks: vec![
                ScenarioBlock {
                    height: 2,
                    time: at(10),
                    commands: Vec::new(),
                },
                ScenarioBlock {
                    height: 1,
                    time: at(20),
                    commands: Vec::new(),
                },
            ],
        };
        let mut replayer = Replayer::new(EngineConfig::default(), Vec::new()).unwrap();
        assert!(matches!(replayer.run(scenario), Err(NodeError::Engine(_))));
    }

    #[test]
    fn malformed_scenario_is_a_parse_error() {
        assert!(matches!(
            Scenario::parse(r#"{ "blocks": [{ "height": "one" }] }"#),
            Err(NodeError::Parse { what: "scenario", .. })
        ));
        assert!(Scenario::parse(r#"{ "blocks": [] }"#).unwrap().blocks.is_empty());
    }
}

//! # postmatch-matchcore
//!
//! **Pure deterministic matching logic for the postmatch P2P desk.**
//!
//! MatchCore is the compute plane. Given the live book and a read-only view
//! of counterparty reputation it decides who trades with whom. It has:
//!
//! - **Zero side effects**: no store writes, no balance moves
//! - **Deterministic output**: same book and block time give the same match
//!   on every node
//! - **Locality first**: candidates widen from postal code to district to state
//! - **Trust scoring**: reputation derived from user stats, never stored

pub mod determinism;
pub mod matcher;
pub mod orderbook;
pub mod price_level;
pub mod scoring;
pub mod trust;

pub use determinism::compute_trade_root;
pub use matcher::{Incompatibility, MatchingEngine, RankedCandidate, Reputation, TradePlan, plan_trade};
pub use orderbook::{BookStats, LiveBook};
pub use price_level::{DepthLevel, MarketDepth};
pub use scoring::ScoreBreakdown;
pub use trust::{TrustLevel, TrustScoreEngine};

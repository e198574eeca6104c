//! # postmatch-types
//!
//! Shared types, errors, and configuration for the **postmatch** P2P engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`TradeId`], [`EscrowId`], [`DisputeId`], [`Address`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`], [`AmountRange`]
//! - **Trade model**: [`Trade`], [`TradeStatus`]
//! - **Escrow model**: [`Escrow`], [`EscrowStatus`], [`EscrowSubject`]
//! - **Dispute model**: [`Dispute`], [`DisputeStatus`], [`Resolution`]
//! - **Reputation inputs**: [`UserStats`]
//! - **Routing**: [`Location`] postal-code bucketing and [`PaymentMethod`]
//! - **Events**: [`Event`]
//! - **Configuration**: [`EngineConfig`], [`MatchingConfig`]
//! - **Errors**: [`PostmatchError`] with `PM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod block;
pub mod config;
pub mod constants;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod event;
pub mod ids;
pub mod location;
pub mod order;
pub mod payment;
pub mod stats;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use postmatch_types::{Order, OrderSide, Trade, Escrow, ...};

pub use block::*;
pub use config::*;
pub use dispute::*;
pub use error::*;
pub use escrow::*;
pub use event::*;
pub use ids::*;
pub use location::*;
pub use order::*;
pub use payment::*;
pub use stats::*;
pub use trade::*;

// Constants are accessed via `postmatch_types::constants::FOO`
// (not re-exported to avoid name collisions).

//! # postmatch-settlement
//!
//! **Settlement plane**: the command surface of the P2P desk.
//!
//! ## Architecture
//!
//! [`P2pEngine`] owns the store, the balance ledger and the live book, and
//! drives every state change inside a block:
//! 1. Orders are validated, funded into escrow and matched on deposit
//! 2. Trades settle on seller confirmation, paying the buyer from escrow
//! 3. Disputes freeze the seller's escrow until a resolver splits it
//! 4. At block end the expiry sweep refunds, cancels and escalates
//!
//! Each command is all-or-nothing: store and balances are journaled together
//! and a failed command leaves both untouched.
//!
//! ## Auditing
//!
//! [`CustodyAudit`] checks that every custody account holds exactly what its
//! escrows say it does, and that total supply equals minted supply.

pub mod command;
pub mod custody_audit;
pub mod dispute;
pub mod engine;
pub mod expiry;
pub mod hooks;
pub mod reputation;

pub use command::Command;
pub use custody_audit::{AuditReport, CustodyAudit};
pub use dispute::{DisputeResolver, ResolvedDispute};
pub use engine::{BlockResult, P2pEngine};
pub use expiry::{ExpiryScheduler, SweepPlan, SweepReport};
pub use hooks::{HookCall, MultiHooks, NoopHooks, RecordingHooks, SubsystemHooks};
pub use reputation::StoreReputation;

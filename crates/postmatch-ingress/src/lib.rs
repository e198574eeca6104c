//! # postmatch-ingress
//!
//! **Money plane**: order intake, token balances and escrow custody.
//!
//! ## Architecture
//!
//! Ingress sits between the command surface and the matcher:
//! 1. **OrderValidator**: fail-closed gate on every new order
//! 2. **BalanceManager**: journaled (account, asset) balances behind the
//!    [`FundsTransfer`] interface
//! 3. **EscrowLedger**: locks principal plus fee at a derived custody
//!    address and pays it out on release, settlement or refund
//!
//! ## Funding Flow
//!
//! ```text
//! CreateOrder → OrderValidator.validate() → PENDING
//! DepositToEscrow → EscrowLedger.create() → ACTIVE → MatchCore
//! ```
//!
//! No order reaches the live book without an active escrow.

pub mod balance_manager;
pub mod escrow;
pub mod validation;

pub use balance_manager::{BalanceManager, FundsTransfer};
pub use escrow::{Authorizer, EscrowLedger, EscrowRequest, Payout};
pub use validation::{OrderRequest, OrderValidator, validate_reason};

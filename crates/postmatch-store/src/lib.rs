//! # postmatch-store
//!
//! **Authoritative state for the postmatch engine.**
//!
//! Everything the engine persists goes through a [`KvStore`]:
//!
//! - **Order book**: [`OrderBook`] writes orders with their type, postal,
//!   district, state, creator and expiry indexes, and keeps the matchcore
//!   live book in step
//! - **Records**: [`trades`], [`escrows`], [`disputes`], [`accounts`]
//! - **Layout**: [`keys`] defines every prefix and index key
//! - **Ids**: [`sequence`] issues deterministic per-block ids
//!
//! [`MemStore`] journals writes so a failed command can be rolled back
//! without leaving partial state.

pub mod accounts;
pub mod disputes;
pub mod escrows;
pub mod keys;
pub mod kv;
pub mod orders;
pub mod sequence;
pub mod trades;

pub use escrows::ExpiryEntry;
pub use kv::{Entries, KvStore, MemStore, get_json, prefix_end, put_json};
pub use orders::{OrderBook, index_keys};

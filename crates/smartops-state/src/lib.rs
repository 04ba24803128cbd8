//! smartops-state — embedded record store for SmartOps.
//!
//! Backed by [redb](https://docs.rs/redb), holds apps and the records they
//! own (status, blueprint, SLA, capacity plan) plus the lease table used by
//! the serialized action lock and the pending task table.
//!
//! # Architecture
//!
//! Records are JSON-serialized into `u64 → &[u8]` tables keyed by surrogate
//! integer ids handed out by a sequence table. Unique names live in
//! separate `name → id` index tables.
//!
//! Multi-record operations run through [`StateStore::write`], which hands
//! the closure a [`WriteTxn`] and commits only if the closure returns `Ok`.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{NameIndex, ReadTxn, StateStore, WriteTxn};
pub use types::*;

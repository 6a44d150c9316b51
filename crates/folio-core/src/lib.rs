//! Multi-tenant double-entry fund ledger with pluggable asset valuation.
//!
//! The [`accounting`] module is the generic double-entry primitive: per-pool
//! accounts, an exclusive unlock/lock transaction window, and an append-only
//! journal. The [`holdings`] module is the domain layer on top: it tracks the
//! quantity and pool-currency value of each (pool, share class, asset)
//! position and computes the value deltas a caller routes into ledger
//! accounts. [`engine::Engine`] ties both together so that every holding
//! mutation and its matching balanced ledger entries happen inside a single
//! window.

pub mod accounting;
pub mod auth;
pub mod engine;
pub mod holdings;
pub mod pool;

//! # clearcore-ledger
//!
//! **Settlement ledger for ClearCore.**
//!
//! Consumes trade executions from the matching engine and records their
//! monetary effects with double-entry discipline:
//!
//! 1. Replay check — an already-settled trade id returns the recorded
//!    outcome, never a second movement
//! 2. Posting derivation — base leg, quote leg, fee legs against the
//!    platform fee account, verified to net to zero per asset
//! 3. Balance application — compare-and-set on each balance's version,
//!    with bounded retries on conflict
//!
//! The ledger trusts the upstream risk pre-check for solvency: trade
//! settlement never rejects for funds. Deposits and withdrawals carry
//! their own idempotency keys, and withdrawals alone check sufficiency.

pub mod applied;
pub mod balance;
pub mod settlement;

pub use applied::AppliedLog;
pub use balance::BalanceStore;
pub use settlement::{Ledger, SettlementOutcome, TransferOutcome};

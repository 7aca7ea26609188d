//! # clearcore-matching
//!
//! **Per-instrument order books and the ClearCore matching engine.**
//!
//! Matching is continuous price-time priority: every fill prints at the
//! resting maker's price, sequence numbers break ties within a level,
//! and identical command streams replay to identical trades. The engine
//! linearizes book mutations with one dedicated worker per instrument:
//!
//! - **Single writer per instrument**: commands for one instrument never
//!   interleave; different instruments match in parallel
//! - **No I/O on the hot path**: book operations are pure in-memory
//!   transitions; trades and book deltas leave through an event channel
//! - **Fail fatal, fail local**: a detected book invariant violation
//!   halts that instrument only
//!
//! ## Command Flow
//!
//! ```text
//! SubmitOrder → validate + risk pre-check → worker mailbox
//!            → InstrumentBook::submit → {TradeExecuted*, BookUpdated}
//! ```

pub mod book;
pub mod engine;
pub mod orderbook;
pub mod price_level;
pub mod registry;
pub mod risk;

pub use book::{CancelOutcome, InstrumentBook, SubmitOutcome};
pub use engine::MatchingEngine;
pub use orderbook::{Fill, OrderBook};
pub use price_level::PriceLevel;
pub use registry::InstrumentRegistry;
pub use risk::{AllowAll, RiskPrecheck};

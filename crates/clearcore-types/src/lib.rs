//! # clearcore-types
//!
//! Shared types, errors, and configuration for the **ClearCore**
//! exchange transactional core.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`AccountId`], [`InstrumentId`], [`TradeId`], [`EntryId`], [`TransferId`], [`TickId`]
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderType`], [`OrderStatus`], [`PositionIntent`]
//! - **Trade model**: [`TradeExecution`]
//! - **Instrument model**: [`Instrument`], [`Asset`]
//! - **Ledger model**: [`LedgerEntry`], [`LedgerBalance`], [`LedgerAccount`], [`EntryType`], [`EntryReference`], [`BalanceChanged`]
//! - **Commands & events**: [`SubmitOrder`], [`CancelOrder`], [`EngineEvent`], [`OrderBookUpdated`], [`PositionEvent`], [`MarkPriceUpdate`], [`LiquidationSignal`]
//! - **Configuration**: [`EngineConfig`], [`FeeSchedule`]
//! - **Errors**: [`ClearcoreError`] with `CC_ERR_` prefix codes

pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod instrument;
pub mod ledger;
pub mod order;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use clearcore_types::{Order, OrderSide, TradeExecution, ...};

pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use instrument::*;
pub use ledger::*;
pub use order::*;
pub use trade::*;

// Constants are accessed via `clearcore_types::constants::FOO`
// (not re-exported to avoid name collisions).

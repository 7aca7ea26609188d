//! # clearcore-position
//!
//! **Position & mark-price projection for ClearCore.**
//!
//! Consumes trade executions from the matching engine and mark-price
//! ticks from the market-data feed, maintains per-(account, instrument)
//! position state, and notifies the external risk/liquidation service
//! with one event per mutation:
//!
//! - same-direction fills grow the position at weighted-average cost
//! - opposing fills consume the reservation first, then position size;
//!   an oversized fill closes and flips
//! - mark-price ticks touch every open position on the instrument, but
//!   only when the price actually changed
//! - liquidation signals force a close-equivalent transition
//!
//! All application is idempotent by event id, with the projection's own
//! applied record — independent of the settlement ledger's.

pub mod applied;
pub mod position;
pub mod projection;

pub use applied::AppliedSet;
pub use position::Position;
pub use projection::PositionProjection;

//! Command and event shapes at the core's boundaries.
//!
//! Inbound commands arrive from the order service; outbound events feed
//! the settlement ledger, the position projection, market data, and the
//! external risk/liquidation service. All shapes are transport-agnostic
//! serde structs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AccountId, InstrumentId, OrderId, OrderSide, OrderStatus, OrderType, PositionIntent, TickId,
    TradeExecution, TradeId,
};

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Submit a new order to the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Required for `Limit`, forbidden for `Market`.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub intent: PositionIntent,
}

/// Cancel a resting order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

// ---------------------------------------------------------------------------
// Book events
// ---------------------------------------------------------------------------

/// Per-order delta inside an [`OrderBookUpdated`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub remaining_qty: Decimal,
    /// `true` for the incoming (aggressive) order, `false` for makers.
    pub is_taker: bool,
}

/// One aggregated price level of a depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Published after every processed command that touched a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookUpdated {
    pub instrument_id: InstrumentId,
    /// The taker's and touched makers' order deltas.
    pub updates: Vec<OrderUpdate>,
    /// Top-of-book aggregated depth, best first.
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the matching engine publishes downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    TradeExecuted(TradeExecution),
    BookUpdated(OrderBookUpdated),
}

// ---------------------------------------------------------------------------
// Mark price
// ---------------------------------------------------------------------------

/// A mark-price tick from the market-data feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPriceUpdate {
    /// Idempotency key for the position projection.
    pub tick_id: TickId,
    pub instrument_id: InstrumentId,
    pub mark_price: Decimal,
    /// Set when the tick was derived from a trade print.
    pub trade_id: Option<TradeId>,
    pub trade_executed_at: Option<DateTime<Utc>>,
    pub calculated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Position events
// ---------------------------------------------------------------------------

/// What happened to a position. One event per projection mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionEventType {
    PositionOpened,
    PositionIncreased,
    PositionDecreased,
    PositionReserved,
    PositionClosed,
    LiquidationTriggered,
    MarkPriceUpdated,
}

impl std::fmt::Display for PositionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PositionOpened => "POSITION_OPENED",
            Self::PositionIncreased => "POSITION_INCREASED",
            Self::PositionDecreased => "POSITION_DECREASED",
            Self::PositionReserved => "POSITION_RESERVED",
            Self::PositionClosed => "POSITION_CLOSED",
            Self::LiquidationTriggered => "LIQUIDATION_TRIGGERED",
            Self::MarkPriceUpdated => "MARK_PRICE_UPDATED",
        };
        write!(f, "{s}")
    }
}

/// Notification emitted by the position projection, consumed by
/// risk/liquidation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub event_type: PositionEventType,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    /// Signed position quantity after the mutation (+long / −short).
    pub quantity: Decimal,
    pub reserved_qty: Decimal,
    pub entry_price: Decimal,
    /// Signed quantity change caused by this mutation.
    pub delta_qty: Decimal,
    /// The trade or tick that caused the mutation, when applicable.
    pub reference: Option<Uuid>,
    pub as_of: DateTime<Utc>,
}

/// Liquidation signal raised by the external risk service. Consuming it
/// forces a close-equivalent transition in the projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationSignal {
    /// Idempotency key for the position projection.
    pub event_id: Uuid,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub mark_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

//! Order model and lifecycle state machine.
//!
//! Status transitions are enforced by [`OrderStatus::transition`] — an
//! exhaustive match over (from, to) pairs. Terminal states are absorbing;
//! an illegal transition is an error, never a silent field write.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, ClearcoreError, InstrumentId, OrderId, Result};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side this order matches against.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}

/// What the order is meant to do to the submitter's position.
///
/// Carried through [`crate::TradeExecution`] into the position projection,
/// which uses it to decide reservation consumption and close semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PositionIntent {
    Increase,
    Reduce,
    Close,
}

impl std::fmt::Display for PositionIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increase => write!(f, "INCREASE"),
            Self::Reduce => write!(f, "REDUCE"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

/// Lifecycle status of an order.
///
/// ```text
/// Pending → Submitted → Accepted ⇄ PartialFilled → Filled
///                          │            │
///                          └─ CancelRequested ─→ Cancelled
/// Rejected / Failed / Expired  (from Pending/Submitted only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Accepted,
    PartialFilled,
    Filled,
    CancelRequested,
    Cancelled,
    Rejected,
    Failed,
    Expired,
}

impl OrderStatus {
    /// Whether this status is terminal. Terminal orders are immutable.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Failed | Self::Expired
        )
    }

    /// Whether an order in this status is resting in a book and may be
    /// cancelled.
    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Accepted | Self::PartialFilled)
    }

    /// Whether the transition `self → to` is legal.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        use OrderStatus::{
            Accepted, CancelRequested, Cancelled, Expired, Failed, Filled, PartialFilled, Pending,
            Rejected, Submitted,
        };
        match (self, to) {
            (Pending, Submitted)
            | (Pending | Submitted, Rejected | Failed | Expired)
            | (Submitted, Accepted)
            // A taker can fill (fully or partially) without ever resting.
            | (Submitted | Accepted, PartialFilled)
            | (Submitted | Accepted | PartialFilled, Filled)
            | (Accepted | PartialFilled, CancelRequested)
            // A partially filled market remainder is discarded as cancelled.
            | (PartialFilled | CancelRequested, Cancelled) => true,
            _ => false,
        }
    }

    /// Perform the transition, rejecting illegal ones.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::InvalidTransition`] if `self → to` is not
    /// in the state machine.
    pub fn transition(self, to: Self) -> Result<Self> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(ClearcoreError::InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Accepted => "ACCEPTED",
            Self::PartialFilled => "PARTIAL_FILLED",
            Self::Filled => "FILLED",
            Self::CancelRequested => "CANCEL_REQUESTED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// Core order struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Limit price. `None` iff `order_type == Market`.
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub remaining_qty: Decimal,
    pub intent: PositionIntent,
    /// Monotonic per-instrument sequence, assigned at acceptance.
    /// The tie-break for price-time priority.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a new order in `Pending` status from a submit command's fields.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        instrument_id: InstrumentId,
        side: OrderSide,
        order_type: OrderType,
        price: Option<Decimal>,
        quantity: Decimal,
        intent: PositionIntent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            account_id,
            instrument_id,
            side,
            order_type,
            status: OrderStatus::Pending,
            price,
            quantity,
            remaining_qty: quantity,
            intent,
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this order crosses a resting level at `price`.
    /// Market orders cross any level while liquidity exists.
    #[must_use]
    pub fn crosses(&self, price: Decimal) -> bool {
        match (self.order_type, self.price) {
            (OrderType::Market, _) | (OrderType::Limit, None) => true,
            (OrderType::Limit, Some(limit)) => match self.side {
                OrderSide::Buy => limit >= price,
                OrderSide::Sell => limit <= price,
            },
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining_qty.is_zero()
    }

    #[must_use]
    pub fn filled_qty(&self) -> Decimal {
        self.quantity - self.remaining_qty
    }

    /// Move to a new status, enforcing the state machine.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::InvalidTransition`] on an illegal move.
    pub fn set_status(&mut self, to: OrderStatus) -> Result<()> {
        self.status = self.status.transition(to)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, qty: Decimal) -> Self {
        Self::dummy_limit_for(AccountId::new(), side, price, qty)
    }

    pub fn dummy_limit_for(
        account_id: AccountId,
        side: OrderSide,
        price: Decimal,
        qty: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account_id,
            instrument_id: InstrumentId(1),
            side,
            order_type: OrderType::Limit,
            status: OrderStatus::Pending,
            price: Some(price),
            quantity: qty,
            remaining_qty: qty,
            intent: PositionIntent::Increase,
            sequence: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn dummy_market(side: OrderSide, qty: Decimal) -> Self {
        let mut order = Self::dummy_limit(side, Decimal::ZERO, qty);
        order.order_type = OrderType::Market;
        order.price = None;
        order
    }
}

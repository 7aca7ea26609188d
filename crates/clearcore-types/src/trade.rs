//! Trade types produced by the ClearCore matching engine.
//!
//! A [`TradeExecution`] is the immutable record of one fill between a
//! taker and a maker at the maker's resting price. It is the unit of
//! truth consumed by the settlement ledger and the position projection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, InstrumentId, OrderId, OrderSide, PositionIntent, TradeId};

/// A single fill produced by the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecution {
    /// Deterministic from (instrument, trade sequence).
    pub trade_id: TradeId,
    pub instrument_id: InstrumentId,
    /// The passive (resting) order.
    pub maker_order_id: OrderId,
    pub maker_account_id: AccountId,
    /// The aggressive (incoming) order.
    pub taker_order_id: OrderId,
    pub taker_account_id: AccountId,
    /// Execution price — always the maker's resting price.
    pub price: Decimal,
    /// Executed quantity in base asset.
    pub quantity: Decimal,
    /// Quote amount = price × quantity.
    pub quote_amount: Decimal,
    /// Which side the taker was on.
    pub taker_side: OrderSide,
    pub maker_intent: PositionIntent,
    pub taker_intent: PositionIntent,
    pub executed_at: DateTime<Utc>,
}

impl TradeExecution {
    /// Fee-relevant notional value (quote amount).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quote_amount
    }

    /// Returns `true` if the taker was buying.
    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side == OrderSide::Buy
    }

    /// The buyer's and seller's account ids, in that order.
    #[must_use]
    pub fn buyer_seller(&self) -> (AccountId, AccountId) {
        if self.taker_is_buyer() {
            (self.taker_account_id, self.maker_account_id)
        } else {
            (self.maker_account_id, self.taker_account_id)
        }
    }
}

impl std::fmt::Display for TradeExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} {} @ {} = {}",
            self.trade_id,
            self.instrument_id,
            self.taker_side,
            self.quantity,
            self.price,
            self.quote_amount,
        )
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl TradeExecution {
    pub fn dummy(
        maker_account_id: AccountId,
        taker_account_id: AccountId,
        taker_side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            instrument_id: InstrumentId(1),
            maker_order_id: OrderId::new(),
            maker_account_id,
            taker_order_id: OrderId::new(),
            taker_account_id,
            price,
            quantity,
            quote_amount: price * quantity,
            taker_side,
            maker_intent: PositionIntent::Increase,
            taker_intent: PositionIntent::Increase,
            executed_at: Utc::now(),
        }
    }
}

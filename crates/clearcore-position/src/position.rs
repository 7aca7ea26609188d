//! The position model: signed quantity with reservation accounting.
//!
//! A position's quantity is signed (+long / −short). `reserved_qty`
//! holds quantity against pending reduce/close intents so the same size
//! cannot be committed twice; it never exceeds the absolute position
//! size.

use chrono::{DateTime, Utc};
use clearcore_types::{
    AccountId, ClearcoreError, InstrumentId, PositionIntent, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-(account, instrument) position state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    /// Signed: positive = long, negative = short. Zero = flat.
    pub quantity: Decimal,
    /// Weighted-average entry price of the open quantity.
    pub avg_entry_price: Decimal,
    /// Quantity held against pending reduce/close intents.
    pub reserved_qty: Decimal,
    /// Intent applied during the last mutation.
    pub last_intent: PositionIntent,
    pub last_mark_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// A fresh flat position.
    #[must_use]
    pub fn flat(account_id: AccountId, instrument_id: InstrumentId) -> Self {
        Self {
            account_id,
            instrument_id,
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            reserved_qty: Decimal::ZERO,
            last_intent: PositionIntent::Increase,
            last_mark_price: None,
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    #[must_use]
    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    /// Quantity not yet held by a pending reduce/close intent.
    #[must_use]
    pub fn available_to_close(&self) -> Decimal {
        self.abs_quantity() - self.reserved_qty
    }

    /// Fold a same-direction fill into the weighted-average entry price.
    #[must_use]
    pub fn weighted_entry_price(&self, fill_price: Decimal, fill_qty: Decimal) -> Decimal {
        let open = self.abs_quantity();
        if (open + fill_qty).is_zero() {
            return Decimal::ZERO;
        }
        (self.avg_entry_price * open + fill_price * fill_qty) / (open + fill_qty)
    }

    /// Runtime invariant check, run after every mutation.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::PositionInvariantViolation`] if the
    /// reservation exceeds the position size or went negative.
    pub fn check_invariants(&self) -> Result<()> {
        if self.reserved_qty.is_sign_negative() {
            return Err(ClearcoreError::PositionInvariantViolation {
                reason: format!(
                    "negative reservation {} on {}/{}",
                    self.reserved_qty, self.account_id, self.instrument_id
                ),
            });
        }
        if self.reserved_qty > self.abs_quantity() {
            return Err(ClearcoreError::PositionInvariantViolation {
                reason: format!(
                    "reservation {} exceeds |quantity| {} on {}/{}",
                    self.reserved_qty,
                    self.abs_quantity(),
                    self.account_id,
                    self.instrument_id
                ),
            });
        }
        Ok(())
    }
}

//! Instrument metadata.
//!
//! Instruments are configured by an external admin service; the core only
//! needs enough to validate and route orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::InstrumentId;

/// Type alias for asset identifiers (e.g., "BTC", "USDT", "ETH").
pub type Asset = String;

/// A tradable instrument (e.g., BTC/USDT).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    /// Base asset (e.g., "BTC").
    pub base: String,
    /// Quote asset (e.g., "USDT").
    pub quote: String,
    /// Price granularity.
    pub tick_size: Decimal,
    /// Quantity granularity.
    pub lot_size: Decimal,
    /// Orders are only accepted while the instrument is tradable.
    pub tradable: bool,
}

impl Instrument {
    #[must_use]
    pub fn new(id: InstrumentId, base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            id,
            base: base.into(),
            quote: quote.into(),
            tick_size: Decimal::new(1, 2),
            lot_size: Decimal::new(1, 8),
            tradable: true,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

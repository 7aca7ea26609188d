//! Configuration types for the ClearCore core.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;

/// Tuning knobs for the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each instrument worker's command mailbox.
    pub mailbox_capacity: usize,
    /// Capacity of the outbound event channel.
    pub event_channel_capacity: usize,
    /// Processed-order cache size per book.
    pub processed_cache_size: usize,
    /// Order-to-instrument routing cache size.
    pub routing_cache_size: usize,
    /// Depth levels in published book snapshots.
    pub depth_levels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: constants::WORKER_MAILBOX_CAPACITY,
            event_channel_capacity: constants::EVENT_CHANNEL_CAPACITY,
            processed_cache_size: constants::PROCESSED_ORDER_CACHE_SIZE,
            routing_cache_size: constants::ORDER_ROUTING_CACHE_SIZE,
            depth_levels: constants::DEFAULT_DEPTH_LEVELS,
        }
    }
}

/// Maker/taker fee rates applied to a trade's quote notional.
///
/// Fees are charged to each party and credited to the platform fee
/// account, so per-trade entries still net to zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fraction of notional charged to the maker (e.g., 0.0002 = 2 bps).
    pub maker_rate: Decimal,
    /// Fraction of notional charged to the taker.
    pub taker_rate: Decimal,
}

impl FeeSchedule {
    /// No fees at all. The default until the fee model is configured.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            maker_rate: Decimal::ZERO,
            taker_rate: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn maker_fee(&self, notional: Decimal) -> Decimal {
        (notional * self.maker_rate).round_dp(constants::PRICE_PRECISION)
    }

    #[must_use]
    pub fn taker_fee(&self, notional: Decimal) -> Decimal {
        (notional * self.taker_rate).round_dp(constants::PRICE_PRECISION)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::zero()
    }
}

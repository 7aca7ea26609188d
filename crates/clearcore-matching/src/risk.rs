//! Risk pre-check seam.
//!
//! The real risk service lives outside the core. Commands are checked
//! through this trait before they reach an instrument's worker; the
//! engine never re-validates solvency internally.

use clearcore_types::{AccountId, InstrumentId, OrderType};

/// External risk pre-check consulted before a command enters matching.
///
/// Returning `false` rejects the command with an account-suspended
/// reason; no book state is touched.
pub trait RiskPrecheck: Send + Sync {
    fn validate(&self, account: AccountId, instrument: InstrumentId, order_type: OrderType)
    -> bool;
}

/// Permissive pre-check for tests and standalone operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RiskPrecheck for AllowAll {
    fn validate(&self, _: AccountId, _: InstrumentId, _: OrderType) -> bool {
        true
    }
}

//! Ledger entry and balance types.
//!
//! Every monetary movement is recorded as signed entries that sum to zero
//! per (reference, asset) — double-entry closure. Balances carry a
//! monotonic version for optimistic concurrency.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Asset, EntryId, InstrumentId, TradeId, TransferId};

/// The account a ledger entry posts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum LedgerAccount {
    /// A user's trading account.
    User(AccountId),
    /// The platform's fee-revenue account.
    PlatformFees,
}

impl std::fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::PlatformFees => write!(f, "platform:fees"),
        }
    }
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryReference {
    Trade(TradeId),
    Transfer(TransferId),
}

impl std::fmt::Display for EntryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trade(id) => write!(f, "trade:{id}"),
            Self::Transfer(id) => write!(f, "{id}"),
        }
    }
}

/// Classification of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    TradeSettlement,
    Fee,
    Deposit,
    Withdrawal,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TradeSettlement => "TRADE_SETTLEMENT",
            Self::Fee => "FEE",
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
        };
        write!(f, "{s}")
    }
}

/// One immutable posting line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub account: LedgerAccount,
    pub asset: Asset,
    /// Signed: positive credits the account, negative debits it.
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub reference: EntryReference,
    /// Account balance after this entry was applied.
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A versioned balance for one (account, asset) pair.
///
/// `version` increments on every successful mutation; writers must
/// compare-and-set against the version they read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub account: LedgerAccount,
    pub asset: Asset,
    pub balance: Decimal,
    pub version: u64,
}

impl LedgerBalance {
    #[must_use]
    pub fn new(account: LedgerAccount, asset: impl Into<Asset>) -> Self {
        Self {
            account,
            asset: asset.into(),
            balance: Decimal::ZERO,
            version: 0,
        }
    }
}

/// Notification that a balance changed, published with each settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub account: LedgerAccount,
    pub asset: Asset,
    pub delta: Decimal,
    pub balance: Decimal,
    pub version: u64,
    pub reference: EntryReference,
    /// Set for trade settlements; transfers carry no instrument.
    pub instrument_id: Option<InstrumentId>,
    pub occurred_at: DateTime<Utc>,
}

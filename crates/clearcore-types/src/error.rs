//! Error types for the ClearCore transactional core.
//!
//! All errors use the `CC_ERR_` prefix convention for easy grepping in
//! logs. Error codes are grouped by subsystem:
//! - 1xx: Order / validation errors
//! - 2xx: Instrument / engine errors
//! - 3xx: Ledger errors
//! - 4xx: Position errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, InstrumentId, LedgerAccount, OrderId, OrderStatus};

/// Central error enum for all ClearCore operations.
#[derive(Debug, Error)]
pub enum ClearcoreError {
    // =================================================================
    // Order Errors (1xx)
    // =================================================================
    /// The requested order was not found in the book.
    #[error("CC_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order failed validation (missing fields, bad values, etc.).
    #[error("CC_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// An order with this ID already exists in the book.
    #[error("CC_ERR_102: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order cannot be cancelled in its current state.
    #[error("CC_ERR_103: Order not cancellable: {0}")]
    OrderNotCancellable(OrderId),

    /// An illegal status transition was attempted.
    #[error("CC_ERR_104: Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    // =================================================================
    // Instrument / Engine Errors (2xx)
    // =================================================================
    /// The instrument is not in the registry.
    #[error("CC_ERR_200: Unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    /// The instrument exists but is not currently tradable.
    #[error("CC_ERR_201: Instrument not tradable: {0}")]
    InstrumentNotTradable(InstrumentId),

    /// The account failed the external risk pre-check.
    #[error("CC_ERR_202: Account suspended or rejected by risk pre-check: {0}")]
    AccountSuspended(AccountId),

    /// Matching for this instrument has been halted after a detected
    /// invariant violation. No further trades until operator action.
    #[error("CC_ERR_203: Matching halted for instrument {0}")]
    MatchingHalted(InstrumentId),

    /// Corrupted book state detected at runtime. Fatal for the
    /// instrument: continuing would risk incorrect settlement.
    #[error("CC_ERR_204: Book invariant violation on {instrument}: {reason}")]
    InvariantViolation {
        instrument: InstrumentId,
        reason: String,
    },

    /// The instrument's worker is no longer accepting commands.
    #[error("CC_ERR_205: Matching worker unavailable for instrument {0}")]
    WorkerUnavailable(InstrumentId),

    // =================================================================
    // Ledger Errors (3xx)
    // =================================================================
    /// Not enough balance for a withdrawal-type operation.
    #[error("CC_ERR_300: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// A compare-and-set lost the race on the balance's version.
    /// Retried internally; surfaces only through [`Self::RetriesExhausted`].
    #[error("CC_ERR_301: Version conflict on {account}/{asset}: expected {expected}")]
    VersionConflict {
        account: LedgerAccount,
        asset: String,
        expected: u64,
    },

    /// Bounded optimistic-lock retries exhausted — transient failure.
    #[error("CC_ERR_302: Optimistic retries exhausted after {attempts} attempts on {account}/{asset}")]
    RetriesExhausted {
        account: LedgerAccount,
        asset: String,
        attempts: u32,
    },

    /// A balance operation would produce a negative value.
    #[error("CC_ERR_303: Balance underflow on {account}")]
    BalanceUnderflow { account: LedgerAccount },

    /// A transfer-type request carried a non-positive amount.
    #[error("CC_ERR_304: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // Position Errors (4xx)
    // =================================================================
    /// No open position for the (account, instrument) pair.
    #[error("CC_ERR_400: Position not found for account {account} on {instrument}")]
    PositionNotFound {
        account: AccountId,
        instrument: InstrumentId,
    },

    /// Reservation request exceeds the unreserved position size.
    #[error("CC_ERR_401: Insufficient quantity to reserve: requested {requested}, available {available}")]
    InsufficientAvailable {
        requested: Decimal,
        available: Decimal,
    },

    /// Position invariant violated at runtime (reservation exceeding
    /// size, sign corruption). Fatal for the position.
    #[error("CC_ERR_402: Position invariant violation: {reason}")]
    PositionInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CC_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CC_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// I/O error (disk, network).
    #[error("CC_ERR_902: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ClearcoreError>;

impl From<std::io::Error> for ClearcoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

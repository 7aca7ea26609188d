//! Double-entry settlement of trade executions and transfers.
//!
//! For every trade, the ledger derives balanced postings: the base asset
//! moves seller → buyer, the quote asset moves buyer → seller, and fee
//! entries charge each party and credit the platform fee account. Per
//! (trade, asset), signed amounts always sum to zero — verified before
//! anything is posted.
//!
//! Trades are settled against orders that passed the upstream risk
//! pre-check, so settlement never re-validates solvency; only
//! withdrawal-type transfers check sufficiency.

use std::collections::HashMap;

use chrono::Utc;
use clearcore_types::{
    AccountId, Asset, BalanceChanged, ClearcoreError, EntryId, EntryReference, EntryType,
    FeeSchedule, Instrument, InstrumentId, LedgerAccount, LedgerBalance, LedgerEntry, Result,
    TradeExecution, TradeId, TransferId, constants,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::applied::AppliedLog;
use crate::balance::BalanceStore;

/// The recorded result of settling one trade. Replays return the same
/// outcome with `replayed` set.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub trade_id: TradeId,
    pub entries: Vec<LedgerEntry>,
    pub balance_changes: Vec<BalanceChanged>,
    pub replayed: bool,
}

/// The recorded result of a deposit or withdrawal.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transfer_id: TransferId,
    pub entry: LedgerEntry,
    pub balance: LedgerBalance,
    pub replayed: bool,
}

/// One planned balance movement, not yet applied.
struct Posting {
    account: LedgerAccount,
    asset: Asset,
    amount: Decimal,
    entry_type: EntryType,
}

/// The settlement ledger.
pub struct Ledger {
    store: BalanceStore,
    fees: FeeSchedule,
    instruments: RwLock<HashMap<InstrumentId, Instrument>>,
    applied_trades: Mutex<AppliedLog<TradeId, SettlementOutcome>>,
    applied_transfers: Mutex<AppliedLog<TransferId, TransferOutcome>>,
}

impl Ledger {
    #[must_use]
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            store: BalanceStore::new(),
            fees,
            instruments: RwLock::new(HashMap::new()),
            applied_trades: Mutex::new(AppliedLog::new(constants::SETTLEMENT_APPLIED_LOG_SIZE)),
            applied_transfers: Mutex::new(AppliedLog::new(constants::SETTLEMENT_APPLIED_LOG_SIZE)),
        }
    }

    /// The ledger resolves a trade's assets through its own instrument
    /// view, fed by the admin service.
    pub fn register_instrument(&self, instrument: Instrument) {
        self.instruments.write().insert(instrument.id, instrument);
    }

    /// Current balance for a user account.
    #[must_use]
    pub fn balance(&self, account: AccountId, asset: &str) -> LedgerBalance {
        self.store.get(LedgerAccount::User(account), asset)
    }

    /// Current balance of the platform fee account.
    #[must_use]
    pub fn platform_fee_balance(&self, asset: &str) -> LedgerBalance {
        self.store.get(LedgerAccount::PlatformFees, asset)
    }

    /// Total of all balances held in `asset`. Trade settlement conserves
    /// this; only deposits and withdrawals change it.
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.store.total_supply(asset)
    }

    /// Settle one trade execution, exactly once.
    ///
    /// A replayed trade id returns the recorded outcome with `replayed`
    /// set and moves no balances.
    ///
    /// # Errors
    /// - [`ClearcoreError::UnknownInstrument`] if the trade's instrument
    ///   was never registered
    /// - [`ClearcoreError::RetriesExhausted`] if a posting kept losing
    ///   the balance version race
    pub fn apply_trade(&self, trade: &TradeExecution) -> Result<SettlementOutcome> {
        let mut applied = self.applied_trades.lock();
        if let Some(prior) = applied.get(&trade.trade_id) {
            tracing::debug!(trade_id = %trade.trade_id, "Trade already settled, replay absorbed");
            let mut outcome = prior.clone();
            outcome.replayed = true;
            return Ok(outcome);
        }

        let instrument = self
            .instruments
            .read()
            .get(&trade.instrument_id)
            .cloned()
            .ok_or(ClearcoreError::UnknownInstrument(trade.instrument_id))?;

        let postings = self.trade_postings(trade, &instrument);
        verify_closure(&trade.trade_id, &postings)?;

        let reference = EntryReference::Trade(trade.trade_id);
        let (entries, balance_changes) =
            self.apply_postings(&postings, reference, Some(trade.instrument_id))?;

        let outcome = SettlementOutcome {
            trade_id: trade.trade_id,
            entries,
            balance_changes,
            replayed: false,
        };
        applied.record(trade.trade_id, outcome.clone());

        tracing::info!(
            trade_id = %trade.trade_id,
            instrument = %trade.instrument_id,
            entries = outcome.entries.len(),
            quote_amount = %trade.quote_amount,
            "Trade settled"
        );
        Ok(outcome)
    }

    /// Credit a user's balance. Idempotent by transfer id.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::InvalidAmount`] for non-positive amounts.
    pub fn deposit(
        &self,
        transfer_id: TransferId,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<TransferOutcome> {
        self.transfer(transfer_id, account, asset, amount, EntryType::Deposit)
    }

    /// Debit a user's balance. Idempotent by transfer id; rejects when
    /// the balance is insufficient.
    ///
    /// # Errors
    /// - [`ClearcoreError::InvalidAmount`] for non-positive amounts
    /// - [`ClearcoreError::InsufficientBalance`] when funds are short
    pub fn withdraw(
        &self,
        transfer_id: TransferId,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<TransferOutcome> {
        self.transfer(transfer_id, account, asset, amount, EntryType::Withdrawal)
    }

    fn transfer(
        &self,
        transfer_id: TransferId,
        account: AccountId,
        asset: &str,
        amount: Decimal,
        entry_type: EntryType,
    ) -> Result<TransferOutcome> {
        if amount <= Decimal::ZERO {
            return Err(ClearcoreError::InvalidAmount {
                reason: format!("{entry_type} amount must be positive, got {amount}"),
            });
        }

        let mut applied = self.applied_transfers.lock();
        if let Some(prior) = applied.get(&transfer_id) {
            tracing::debug!(transfer = %transfer_id, "Transfer already applied, replay absorbed");
            let mut outcome = prior.clone();
            outcome.replayed = true;
            return Ok(outcome);
        }

        let account = LedgerAccount::User(account);
        let signed = match entry_type {
            EntryType::Withdrawal => -amount,
            _ => amount,
        };
        let check_funds = entry_type == EntryType::Withdrawal;
        let balance = self.apply_delta(account, asset, signed, check_funds)?;

        let now = Utc::now();
        let reference = EntryReference::Transfer(transfer_id);
        let entry = LedgerEntry {
            entry_id: EntryId::new(),
            account,
            asset: asset.to_string(),
            amount: signed,
            entry_type,
            reference,
            balance_after: balance.balance,
            created_at: now,
        };

        let outcome = TransferOutcome {
            transfer_id,
            entry,
            balance,
            replayed: false,
        };
        applied.record(transfer_id, outcome.clone());

        tracing::info!(transfer = %transfer_id, account = %account, %amount, kind = %entry_type, "Transfer applied");
        Ok(outcome)
    }

    /// Plan the balanced postings for one trade.
    fn trade_postings(&self, trade: &TradeExecution, instrument: &Instrument) -> Vec<Posting> {
        let (buyer, seller) = trade.buyer_seller();
        let buyer = LedgerAccount::User(buyer);
        let seller = LedgerAccount::User(seller);
        let (maker, taker) = if trade.taker_is_buyer() {
            (seller, buyer)
        } else {
            (buyer, seller)
        };

        let mut postings = vec![
            Posting {
                account: seller,
                asset: instrument.base.clone(),
                amount: -trade.quantity,
                entry_type: EntryType::TradeSettlement,
            },
            Posting {
                account: buyer,
                asset: instrument.base.clone(),
                amount: trade.quantity,
                entry_type: EntryType::TradeSettlement,
            },
            Posting {
                account: buyer,
                asset: instrument.quote.clone(),
                amount: -trade.quote_amount,
                entry_type: EntryType::TradeSettlement,
            },
            Posting {
                account: seller,
                asset: instrument.quote.clone(),
                amount: trade.quote_amount,
                entry_type: EntryType::TradeSettlement,
            },
        ];

        let maker_fee = self.fees.maker_fee(trade.notional());
        let taker_fee = self.fees.taker_fee(trade.notional());
        if maker_fee > Decimal::ZERO {
            postings.push(Posting {
                account: maker,
                asset: instrument.quote.clone(),
                amount: -maker_fee,
                entry_type: EntryType::Fee,
            });
        }
        if taker_fee > Decimal::ZERO {
            postings.push(Posting {
                account: taker,
                asset: instrument.quote.clone(),
                amount: -taker_fee,
                entry_type: EntryType::Fee,
            });
        }
        if maker_fee + taker_fee > Decimal::ZERO {
            postings.push(Posting {
                account: LedgerAccount::PlatformFees,
                asset: instrument.quote.clone(),
                amount: maker_fee + taker_fee,
                entry_type: EntryType::Fee,
            });
        }

        postings
    }

    /// Apply planned postings, producing entries and balance-changed
    /// notifications in posting order.
    fn apply_postings(
        &self,
        postings: &[Posting],
        reference: EntryReference,
        instrument_id: Option<InstrumentId>,
    ) -> Result<(Vec<LedgerEntry>, Vec<BalanceChanged>)> {
        let now = Utc::now();
        let mut entries = Vec::with_capacity(postings.len());
        let mut changes = Vec::with_capacity(postings.len());

        for posting in postings {
            let balance = self.apply_delta(posting.account, &posting.asset, posting.amount, false)?;
            entries.push(LedgerEntry {
                entry_id: EntryId::new(),
                account: posting.account,
                asset: posting.asset.clone(),
                amount: posting.amount,
                entry_type: posting.entry_type,
                reference,
                balance_after: balance.balance,
                created_at: now,
            });
            changes.push(BalanceChanged {
                account: posting.account,
                asset: posting.asset.clone(),
                delta: posting.amount,
                balance: balance.balance,
                version: balance.version,
                reference,
                instrument_id,
                occurred_at: now,
            });
        }

        Ok((entries, changes))
    }

    /// Optimistic read-modify-write with bounded retries. A version
    /// conflict re-reads and tries again; only exhaustion surfaces.
    fn apply_delta(
        &self,
        account: LedgerAccount,
        asset: &str,
        delta: Decimal,
        check_funds: bool,
    ) -> Result<LedgerBalance> {
        let attempts = constants::OPTIMISTIC_LOCK_MAX_RETRIES;
        for _ in 0..attempts {
            let snapshot = self.store.get(account, asset);
            if check_funds && snapshot.balance + delta < Decimal::ZERO {
                return Err(ClearcoreError::InsufficientBalance {
                    needed: -delta,
                    available: snapshot.balance,
                });
            }
            match self.store.compare_and_set(&snapshot, snapshot.balance + delta) {
                Ok(updated) => return Ok(updated),
                Err(ClearcoreError::VersionConflict { .. }) => {
                    tracing::debug!(account = %account, asset, "Balance version race, retrying");
                }
                Err(other) => return Err(other),
            }
        }
        Err(ClearcoreError::RetriesExhausted {
            account,
            asset: asset.to_string(),
            attempts,
        })
    }
}

/// Double-entry closure: per asset, planned amounts must sum to zero.
/// A violation means a bug in posting derivation — nothing is applied.
fn verify_closure(trade_id: &TradeId, postings: &[Posting]) -> Result<()> {
    let mut sums: HashMap<&str, Decimal> = HashMap::new();
    for posting in postings {
        *sums.entry(posting.asset.as_str()).or_insert(Decimal::ZERO) += posting.amount;
    }
    for (asset, sum) in sums {
        if !sum.is_zero() {
            return Err(ClearcoreError::Internal(format!(
                "trade {trade_id} postings for {asset} sum to {sum}, expected zero"
            )));
        }
    }
    Ok(())
}

//! Versioned balance store with compare-and-set semantics.
//!
//! Every mutation must present the version it read; a stale version is a
//! [`ClearcoreError::VersionConflict`] and the caller re-reads and
//! retries. Concurrent settlements touching the same (account, asset)
//! therefore retry rather than block each other.

use std::collections::HashMap;

use clearcore_types::{Asset, ClearcoreError, LedgerAccount, LedgerBalance, Result};
use parking_lot::RwLock;
use rust_decimal::Decimal;

type BalanceKey = (LedgerAccount, Asset);

/// Shared store of versioned balances, keyed by (account, asset).
#[derive(Debug, Default)]
pub struct BalanceStore {
    balances: RwLock<HashMap<BalanceKey, LedgerBalance>>,
}

impl BalanceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance snapshot for (account, asset). Unknown pairs read
    /// as a fresh zero balance at version 0.
    #[must_use]
    pub fn get(&self, account: LedgerAccount, asset: &str) -> LedgerBalance {
        self.balances
            .read()
            .get(&(account, asset.to_string()))
            .cloned()
            .unwrap_or_else(|| LedgerBalance::new(account, asset))
    }

    /// Replace the balance amount iff the stored version still matches
    /// the snapshot the caller read. On success the version increments
    /// and the updated balance is returned.
    ///
    /// # Errors
    /// Returns [`ClearcoreError::VersionConflict`] if another writer got
    /// there first.
    pub fn compare_and_set(
        &self,
        snapshot: &LedgerBalance,
        new_amount: Decimal,
    ) -> Result<LedgerBalance> {
        let mut balances = self.balances.write();
        let key = (snapshot.account, snapshot.asset.clone());
        let entry = balances
            .entry(key)
            .or_insert_with(|| LedgerBalance::new(snapshot.account, snapshot.asset.clone()));

        if entry.version != snapshot.version {
            return Err(ClearcoreError::VersionConflict {
                account: snapshot.account,
                asset: snapshot.asset.clone(),
                expected: snapshot.version,
            });
        }

        entry.balance = new_amount;
        entry.version += 1;
        Ok(entry.clone())
    }

    /// Sum of all balances held in `asset` across every account.
    /// Settlement only moves value between accounts, so this is
    /// conserved by [`crate::Ledger::apply_trade`].
    #[must_use]
    pub fn total_supply(&self, asset: &str) -> Decimal {
        self.balances
            .read()
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, balance)| balance.balance)
            .sum()
    }
}

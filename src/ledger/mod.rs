//! Balance ledger (§4.1, component 2).
//!
//! Per-(account, asset) balance and locked amounts, derived from an
//! append-only journal. `apply_changes` never rejects — the dispatcher is
//! responsible for validating amounts before calling it (§4.1 Failure
//! semantics) — so this module has no `thiserror` enum of its own.

use crate::domain::{AccountId, Asset, EventId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A single account/asset credit, debit, lock, or unlock instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub asset: Asset,
    pub amount: Decimal,
}

impl BalanceChange {
    pub fn new(account_id: AccountId, asset: Asset, amount: Decimal) -> Self {
        Self {
            account_id,
            asset,
            amount,
        }
    }
}

/// The four buckets applied atomically by `Ledger::apply_changes`, in the
/// fixed order debits, credits, locks, unlocks (§4.1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceChanges {
    pub credits: Vec<BalanceChange>,
    pub debits: Vec<BalanceChange>,
    pub locks: Vec<BalanceChange>,
    pub unlocks: Vec<BalanceChange>,
}

impl BalanceChanges {
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty()
            && self.debits.is_empty()
            && self.locks.is_empty()
            && self.unlocks.is_empty()
    }

    /// Sum of credits minus debits per asset, for a given account — used by
    /// the maker solvency check (§4.4.3 Phase C.1).
    pub fn net_outflow_for(&self, account_id: &AccountId) -> HashMap<Asset, Decimal> {
        let mut net: HashMap<Asset, Decimal> = HashMap::new();
        for change in &self.debits {
            if &change.account_id == account_id {
                *net.entry(change.asset.clone()).or_default() += change.amount;
            }
        }
        for change in &self.credits {
            if &change.account_id == account_id {
                *net.entry(change.asset.clone()).or_default() -= change.amount;
            }
        }
        for change in &self.locks {
            if &change.account_id == account_id {
                *net.entry(change.asset.clone()).or_default() += change.amount;
            }
        }
        for change in &self.unlocks {
            if &change.account_id == account_id {
                *net.entry(change.asset.clone()).or_default() -= change.amount;
            }
        }
        net
    }

    /// Every (account, asset) pair touched by this set of changes, in a
    /// stable order — used to emit one `balance_updated` event per pair.
    pub fn touched_accounts(&self) -> Vec<(AccountId, Asset)> {
        let mut seen = Vec::new();
        for change in self
            .debits
            .iter()
            .chain(self.credits.iter())
            .chain(self.locks.iter())
            .chain(self.unlocks.iter())
        {
            let key = (change.account_id.clone(), change.asset.clone());
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen
    }
}

/// An append-only journal record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EventId,
    pub ts: Timestamp,
    pub changes: BalanceChanges,
    pub metadata: Option<serde_json::Value>,
}

/// A resolved balance/lock pair, returned by `Ledger::replay`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AccountBalance {
    pub balance: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Default)]
pub struct Ledger {
    balances: HashMap<(AccountId, Asset), Decimal>,
    locked: HashMap<(AccountId, Asset), Decimal>,
    journal: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a full `LedgerEntry` atomically: debits, then credits, then
    /// locks, then unlocks (§4.1). Returns the (account, asset) pairs
    /// touched, for the dispatcher to turn into `balance_updated` events.
    pub fn apply_changes(&mut self, entry: LedgerEntry) -> Vec<(AccountId, Asset)> {
        for change in &entry.changes.debits {
            self.debit_raw(&change.account_id, &change.asset, change.amount);
        }
        for change in &entry.changes.credits {
            self.credit_raw(&change.account_id, &change.asset, change.amount);
        }
        for change in &entry.changes.locks {
            self.lock_raw(&change.account_id, &change.asset, change.amount);
        }
        for change in &entry.changes.unlocks {
            self.unlock_raw(&change.account_id, &change.asset, change.amount);
        }

        let touched = entry.changes.touched_accounts();
        debug!(entry_id = %entry.id, touched = touched.len(), "applied ledger entry");
        self.journal.push(entry);
        touched
    }

    /// Convenience single-op lock, identical semantics to the mixed form.
    pub fn lock(&mut self, id: EventId, ts: Timestamp, change: BalanceChange) {
        self.apply_changes(LedgerEntry {
            id,
            ts,
            changes: BalanceChanges {
                locks: vec![change],
                ..Default::default()
            },
            metadata: None,
        });
    }

    /// Convenience single-op unlock, identical semantics to the mixed form.
    pub fn unlock(&mut self, id: EventId, ts: Timestamp, change: BalanceChange) {
        self.apply_changes(LedgerEntry {
            id,
            ts,
            changes: BalanceChanges {
                unlocks: vec![change],
                ..Default::default()
            },
            metadata: None,
        });
    }

    pub fn get_balance(&self, account_id: &AccountId, asset: &Asset) -> Decimal {
        self.balances
            .get(&(account_id.clone(), asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn get_locked(&self, account_id: &AccountId, asset: &Asset) -> Decimal {
        self.locked
            .get(&(account_id.clone(), asset.clone()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Read-only, insertion-ordered view of every applied entry.
    pub fn history(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.journal.iter()
    }

    /// Pure reducer over the journal (§4.7) — replaying from an empty
    /// ledger must reproduce the current balances and locked amounts (I5).
    pub fn replay(&self) -> HashMap<(AccountId, Asset), AccountBalance> {
        let mut sheet: HashMap<(AccountId, Asset), AccountBalance> = HashMap::new();
        for entry in &self.journal {
            for change in &entry.changes.debits {
                let key = (change.account_id.clone(), change.asset.clone());
                sheet.entry(key).or_default().balance -= change.amount;
            }
            for change in &entry.changes.credits {
                let key = (change.account_id.clone(), change.asset.clone());
                sheet.entry(key).or_default().balance += change.amount;
            }
            for change in &entry.changes.locks {
                let key = (change.account_id.clone(), change.asset.clone());
                let entry = sheet.entry(key).or_default();
                entry.balance -= change.amount;
                entry.locked += change.amount;
            }
            for change in &entry.changes.unlocks {
                let key = (change.account_id.clone(), change.asset.clone());
                let entry = sheet.entry(key).or_default();
                entry.balance += change.amount;
                entry.locked = (entry.locked - change.amount).max(Decimal::ZERO);
            }
        }
        sheet
    }

    fn debit_raw(&mut self, account_id: &AccountId, asset: &Asset, amount: Decimal) {
        let balance = self
            .balances
            .entry((account_id.clone(), asset.clone()))
            .or_insert(Decimal::ZERO);
        *balance -= amount;
    }

    fn credit_raw(&mut self, account_id: &AccountId, asset: &Asset, amount: Decimal) {
        let balance = self
            .balances
            .entry((account_id.clone(), asset.clone()))
            .or_insert(Decimal::ZERO);
        *balance += amount;
    }

    fn lock_raw(&mut self, account_id: &AccountId, asset: &Asset, amount: Decimal) {
        let key = (account_id.clone(), asset.clone());
        *self.balances.entry(key.clone()).or_insert(Decimal::ZERO) -= amount;
        *self.locked.entry(key).or_insert(Decimal::ZERO) += amount;
    }

    /// Unlock beyond currently-locked clamps `locked` at zero but still
    /// credits `balance` by the full stated amount — documented edge case
    /// compensating for rounding drift at settlement boundaries (§4.1).
    fn unlock_raw(&mut self, account_id: &AccountId, asset: &Asset, amount: Decimal) {
        let key = (account_id.clone(), asset.clone());
        *self.balances.entry(key.clone()).or_insert(Decimal::ZERO) += amount;
        let locked = self.locked.entry(key).or_insert(Decimal::ZERO);
        *locked = (*locked - amount).max(Decimal::ZERO);
    }
}

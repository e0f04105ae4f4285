//! Token balance ledger interface
//!
//! The governance engine only ever reads balances. The ledger that owns
//! transfers lives outside this workspace; `MemoryLedger` is a reference
//! implementation used by tests and the scenario simulator.

use crate::address::Address;
use crate::clock::{Clock, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger does not keep balance history")]
    HistoryUnavailable,

    #[error("Insufficient balance for {address}: requested {requested}, available {available}")]
    InsufficientBalance {
        address: Address,
        requested: u64,
        available: u64,
    },

    #[error("Balance overflow for {0}")]
    Overflow(Address),
}

/// Read-only view of token balances used as voting weight
pub trait TokenLedger: Send + Sync {
    /// Current balance of `address`
    fn balance(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Current total supply
    fn total_supply(&self) -> Result<u64, LedgerError>;

    /// Balance of `address` as of `at`. Ledgers without history keep the default.
    fn balance_at(&self, _address: &Address, _at: Timestamp) -> Result<u64, LedgerError> {
        Err(LedgerError::HistoryUnavailable)
    }
}

/// In-memory ledger with a per-address balance history.
///
/// Each change is stamped with the clock's current time so `balance_at`
/// can answer snapshot queries.
pub struct MemoryLedger {
    clock: Arc<dyn Clock>,
    history: RwLock<HashMap<Address, Vec<(Timestamp, u64)>>>,
}

impl MemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Overwrite the balance of `address`
    pub fn set_balance(&self, address: &Address, amount: u64) {
        let now = self.clock.now();
        let mut history = self.history.write();
        Self::record(history.entry(address.clone()).or_default(), now, amount);
    }

    pub fn mint(&self, address: &Address, amount: u64) -> Result<u64, LedgerError> {
        let now = self.clock.now();
        let mut history = self.history.write();
        let entries = history.entry(address.clone()).or_default();
        let current = Self::latest(entries);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(address.clone()))?;
        Self::record(entries, now, updated);
        Ok(updated)
    }

    pub fn burn(&self, address: &Address, amount: u64) -> Result<u64, LedgerError> {
        let now = self.clock.now();
        let mut history = self.history.write();
        let entries = history.entry(address.clone()).or_default();
        let current = Self::latest(entries);
        if current < amount {
            return Err(LedgerError::InsufficientBalance {
                address: address.clone(),
                requested: amount,
                available: current,
            });
        }
        Self::record(entries, now, current - amount);
        Ok(current - amount)
    }

    pub fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), LedgerError> {
        let now = self.clock.now();
        let mut history = self.history.write();

        let available = history.get(from).map(|e| Self::latest(e)).unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address: from.clone(),
                requested: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }

        let receiver = history.get(to).map(|e| Self::latest(e)).unwrap_or(0);
        let credited = receiver
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(to.clone()))?;

        Self::record(history.entry(from.clone()).or_default(), now, available - amount);
        Self::record(history.entry(to.clone()).or_default(), now, credited);

        log::debug!("ledger transfer {} -> {}: {}", from, to, amount);
        Ok(())
    }

    fn latest(entries: &[(Timestamp, u64)]) -> u64 {
        entries.last().map(|(_, amount)| *amount).unwrap_or(0)
    }

    /// Append a change. A change stamped earlier than the newest entry
    /// (clock moved backwards) is folded into that entry, so the history
    /// stays sorted by time and no change is lost.
    fn record(entries: &mut Vec<(Timestamp, u64)>, at: Timestamp, amount: u64) {
        match entries.last_mut() {
            Some((last_at, last_amount)) if *last_at >= at => *last_amount = amount,
            _ => entries.push((at, amount)),
        }
    }
}

impl TokenLedger for MemoryLedger {
    fn balance(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self
            .history
            .read()
            .get(address)
            .map(|e| Self::latest(e))
            .unwrap_or(0))
    }

    fn total_supply(&self) -> Result<u64, LedgerError> {
        self.history
            .read()
            .iter()
            .try_fold(0u64, |acc, (address, entries)| {
                acc.checked_add(Self::latest(entries))
                    .ok_or_else(|| LedgerError::Overflow(address.clone()))
            })
    }

    fn balance_at(&self, address: &Address, at: Timestamp) -> Result<u64, LedgerError> {
        let history = self.history.read();
        let Some(entries) = history.get(address) else {
            return Ok(0);
        };
        let applied = entries.partition_point(|(changed_at, _)| *changed_at <= at);
        Ok(applied
            .checked_sub(1)
            .map(|index| entries[index].1)
            .unwrap_or(0))
    }
}

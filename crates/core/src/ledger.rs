//! Append-only transaction log.
//!
//! The ledger keeps transactions in arrival order. Administrative removal
//! (`pop`, `remove`) tombstones a slot instead of shifting the sequence, so
//! positions of live entries never change and the id index stays valid.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::id::TransactionId;
use crate::transaction::Transaction;

/// Tombstones are compacted once they outnumber live entries and exceed this count.
const COMPACT_THRESHOLD: usize = 64;

/// Ordered transaction log that mimics a chain.
///
/// `append` is the only operation on the normal transaction path; `pop`
/// and `remove` exist for tooling and return `None` rather than failing
/// when the entry is absent.
pub trait Ledger: Send + Sync {
    /// The earliest live transaction (the "genesis" entry), if any.
    fn head(&self) -> Option<Transaction>;

    /// Look up a transaction by id.
    fn find(&self, id: TransactionId) -> Option<Transaction>;

    /// Add a transaction after the current last entry. Duplicate ids are a
    /// caller error and are not detected.
    fn append(&self, txn: Transaction);

    /// Remove and return the most recent transaction.
    fn pop(&self) -> Option<Transaction>;

    /// Excise an arbitrary transaction.
    fn remove(&self, id: TransactionId) -> Option<Transaction>;

    /// Number of live transactions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Ledger for Arc<S>
where
    S: Ledger + ?Sized,
{
    fn head(&self) -> Option<Transaction> {
        (**self).head()
    }

    fn find(&self, id: TransactionId) -> Option<Transaction> {
        (**self).find(id)
    }

    fn append(&self, txn: Transaction) {
        (**self).append(txn)
    }

    fn pop(&self) -> Option<Transaction> {
        (**self).pop()
    }

    fn remove(&self, id: TransactionId) -> Option<Transaction> {
        (**self).remove(id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

#[derive(Debug, Default)]
struct Slots {
    entries: Vec<Option<Transaction>>,
    index: HashMap<TransactionId, usize>,
    /// Position of the first live slot (or `entries.len()` when empty).
    first: usize,
    live: usize,
}

impl Slots {
    fn push(&mut self, txn: Transaction) {
        let pos = self.entries.len();
        self.index.insert(txn.id(), pos);
        self.entries.push(Some(txn));
        self.live += 1;
    }

    fn take(&mut self, pos: usize) -> Option<Transaction> {
        let txn = self.entries.get_mut(pos)?.take()?;
        self.live -= 1;
        if self.index.get(&txn.id()) == Some(&pos) {
            self.index.remove(&txn.id());
        }
        self.trim();
        Some(txn)
    }

    /// Drop trailing tombstones, advance `first`, compact when sparse.
    fn trim(&mut self) {
        while matches!(self.entries.last(), Some(None)) {
            self.entries.pop();
        }
        if self.live == 0 {
            self.entries.clear();
            self.index.clear();
            self.first = 0;
            return;
        }
        while self.first < self.entries.len() && self.entries[self.first].is_none() {
            self.first += 1;
        }
        let tombstones = self.entries.len() - self.live;
        if tombstones > COMPACT_THRESHOLD && tombstones > self.live {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        self.index.clear();
        for (pos, txn) in self.entries.iter().enumerate() {
            if let Some(txn) = txn {
                self.index.insert(txn.id(), pos);
            }
        }
        self.first = 0;
    }
}

/// In-memory ledger.
///
/// Safe for concurrent use; append order is the order in which `append`
/// calls acquire the write lock.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    slots: RwLock<Slots>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All live transactions, oldest first.
    pub fn snapshot(&self) -> Vec<Transaction> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.entries.iter().flatten().cloned().collect()
    }
}

impl Ledger for InMemoryLedger {
    fn head(&self) -> Option<Transaction> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.entries.get(slots.first).cloned().flatten()
    }

    fn find(&self, id: TransactionId) -> Option<Transaction> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let pos = *slots.index.get(&id)?;
        slots.entries.get(pos).cloned().flatten()
    }

    fn append(&self, txn: Transaction) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(txn);
    }

    fn pop(&self) -> Option<Transaction> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let last = slots.entries.len().checked_sub(1)?;
        slots.take(last)
    }

    fn remove(&self, id: TransactionId) -> Option<Transaction> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let pos = *slots.index.get(&id)?;
        slots.take(pos)
    }

    fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).live
    }
}

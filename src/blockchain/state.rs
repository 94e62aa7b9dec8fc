use crate::amount::Amount;
use crate::crypto::{Address, Sha256Hash, NULL_ADDRESS};
use crate::transaction::Transaction;
use std::collections::HashMap;

/// In-memory indices over the confirmed transactions, rebuilt from storage on
/// open and updated after every durable append.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    transactions: HashMap<Sha256Hash, Transaction>,
    by_address: HashMap<Address, Vec<Sha256Hash>>,
    address_balances: HashMap<Address, Amount>,
    sent_counts: HashMap<Address, u64>,
    order: Vec<Sha256Hash>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(transactions: Vec<Transaction>) -> Self {
        let mut state = Self::new();
        for tx in transactions {
            state.apply_transaction(tx);
        }
        state
    }

    pub fn get_balance(&self, address: &Address) -> Amount {
        self.address_balances.get(address).copied().unwrap_or(Amount::ZERO)
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<&Transaction> {
        self.transactions.get(hash)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Confirmed hashes touching `address`, oldest first.
    pub fn hashes_for(&self, address: &Address) -> &[Sha256Hash] {
        self.by_address.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sent_count(&self, address: &Address) -> u64 {
        self.sent_counts.get(address).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn head(&self) -> Option<Sha256Hash> {
        self.order.last().copied()
    }

    /// Indexes a transaction that has already passed confirmation checks.
    /// Balance arithmetic saturates; the checks guarantee it never has to.
    pub fn apply_transaction(&mut self, tx: Transaction) {
        let hash = tx.hash();

        if tx.sender != NULL_ADDRESS {
            let cost = tx.total_cost().unwrap_or(tx.amount);
            let balance = self.address_balances.entry(tx.sender).or_default();
            *balance = balance.saturating_sub(cost);
            *self.sent_counts.entry(tx.sender).or_insert(0) += 1;
            self.by_address.entry(tx.sender).or_default().push(hash);
        }

        let balance = self.address_balances.entry(tx.recipient).or_default();
        *balance = balance
            .checked_add(tx.amount)
            .unwrap_or(Amount::from_units(u64::MAX));
        self.by_address.entry(tx.recipient).or_default().push(hash);

        self.order.push(hash);
        self.transactions.insert(hash, tx);
    }
}

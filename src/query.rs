//! Read-only lookups across the pool and the chain store.

use crate::amount::Amount;
use crate::blockchain::ChainStore;
use crate::crypto::{hash_to_hex, Address, Sha256Hash};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
}

/// One row of an address overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverviewEntry {
    pub hash: Sha256Hash,
    pub pending: bool,
}

pub struct QueryEngine<'a> {
    chain: &'a ChainStore,
    pool: &'a Mempool,
}

impl<'a> QueryEngine<'a> {
    pub fn new(chain: &'a ChainStore, pool: &'a Mempool) -> Self {
        Self { chain, pool }
    }

    /// Pool first, then the chain store.
    pub fn transaction(&self, hash: &Sha256Hash) -> Result<&'a Transaction, ChainError> {
        self.pool
            .get(hash)
            .or_else(|| self.chain.find(hash))
            .ok_or_else(|| ChainError::NotFound(format!("Transaction {} not found", hash_to_hex(hash))))
    }

    pub fn status(&self, hash: &Sha256Hash) -> Result<TransactionStatus, ChainError> {
        if self.pool.contains(hash) {
            Ok(TransactionStatus::Pending)
        } else if self.chain.contains(hash) {
            Ok(TransactionStatus::Confirmed)
        } else {
            Err(ChainError::NotFound(format!(
                "Transaction {} not found",
                hash_to_hex(hash)
            )))
        }
    }

    pub fn amount(&self, hash: &Sha256Hash) -> Result<Amount, ChainError> {
        Ok(self.transaction(hash)?.amount)
    }

    /// Unix seconds.
    pub fn time(&self, hash: &Sha256Hash) -> Result<u64, ChainError> {
        Ok(self.transaction(hash)?.timestamp)
    }

    pub fn sender(&self, hash: &Sha256Hash) -> Result<Address, ChainError> {
        Ok(self.transaction(hash)?.sender)
    }

    pub fn recipient(&self, hash: &Sha256Hash) -> Result<Address, ChainError> {
        Ok(self.transaction(hash)?.recipient)
    }

    pub fn confirmed(&self, address: &Address) -> Vec<Sha256Hash> {
        self.chain.confirmed_transactions(address).to_vec()
    }

    pub fn pending(&self, address: &Address) -> Vec<Sha256Hash> {
        self.pool.pending(address)
    }

    pub fn all_pending(&self) -> Vec<Sha256Hash> {
        self.pool.all_pending()
    }

    /// Pending entries (most recent first) followed by confirmed entries
    /// (most recent first).
    pub fn overview(&self, address: &Address) -> Vec<OverviewEntry> {
        let pending = self.pool.pending(address);
        let confirmed = self.chain.confirmed_transactions(address);

        pending
            .iter()
            .rev()
            .map(|hash| OverviewEntry {
                hash: *hash,
                pending: true,
            })
            .chain(confirmed.iter().rev().map(|hash| OverviewEntry {
                hash: *hash,
                pending: false,
            }))
            .collect()
    }
}

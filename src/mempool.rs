//! Transaction pool: unconfirmed transactions indexed by hash and address.
//!
//! Each admitted transaction gets a monotonically increasing sequence number.
//! Per-address lists and the global list are ordered by it, so iteration is
//! insertion order. Removal is exact: an entry leaves every index at once.
//!
//! Discarded hashes are remembered so they cannot be re-admitted. With an
//! expiry configured the memory is bounded: transactions whose own timestamp
//! is older than the expiry are refused outright, so a discarded hash is
//! forgotten once its timestamp passes that horizon. Without an expiry only
//! explicit discards are remembered, and they are kept for the pool's
//! lifetime.

use crate::amount::Amount;
use crate::blockchain::ChainStore;
use crate::config::MempoolConfig;
use crate::crypto::{hash_to_hex, Address, Sha256Hash, NULL_ADDRESS};
use crate::error::ChainError;
use crate::transaction::Transaction;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct PoolEntry {
    tx: Transaction,
    seq: u64,
    admitted_at: u64,
}

#[derive(Debug, Default)]
pub struct Mempool {
    config: MempoolConfig,
    by_hash: HashMap<Sha256Hash, PoolEntry>,
    by_seq: BTreeMap<u64, Sha256Hash>,
    by_address: HashMap<Address, BTreeMap<u64, Sha256Hash>>,
    /// Discarded or expired hashes with their transaction timestamps.
    discarded: HashMap<Sha256Hash, u64>,
    next_seq: u64,
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Mempool {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    /// Admits a signed user transaction against `chain`.
    ///
    /// # Errors
    /// - `ValidationError` for coinbase records, malformed fields, or a
    ///   timestamp older than the configured expiry
    /// - `DuplicateTransaction` if the hash is pending, confirmed or was discarded
    /// - `InvalidSignature` if unsigned or signed by the wrong key
    /// - `MempoolFull` at capacity
    /// - `InsufficientBalance` if the sender's available balance cannot cover it
    pub fn admit(&mut self, tx: Transaction, chain: &ChainStore) -> Result<Sha256Hash, ChainError> {
        self.admit_at(tx, chain, now_secs())
    }

    pub fn admit_at(
        &mut self,
        tx: Transaction,
        chain: &ChainStore,
        now: u64,
    ) -> Result<Sha256Hash, ChainError> {
        if tx.is_coinbase() {
            return Err(ChainError::ValidationError(
                "Coinbase records cannot enter the pool".to_string(),
            ));
        }

        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateTransaction(format!(
                "{} is already pending",
                hash_to_hex(&hash)
            )));
        }
        if chain.contains(&hash) {
            return Err(ChainError::DuplicateTransaction(format!(
                "{} is already confirmed",
                hash_to_hex(&hash)
            )));
        }
        if self.discarded.contains_key(&hash) {
            return Err(ChainError::DuplicateTransaction(format!(
                "{} was discarded",
                hash_to_hex(&hash)
            )));
        }

        if let Some(ttl) = self.config.expiry_secs {
            if tx.timestamp.saturating_add(ttl) < now {
                return Err(ChainError::ValidationError(format!(
                    "Transaction timestamp {} is older than the {}s pool expiry",
                    tx.timestamp, ttl
                )));
            }
        }

        tx.validate()?;

        if self.by_hash.len() >= self.config.max_transactions {
            return Err(ChainError::MempoolFull(self.config.max_transactions));
        }

        let required = tx
            .total_cost()
            .ok_or_else(|| ChainError::ValidationError("Amount plus fee overflows".to_string()))?;
        let available = self.available(&tx.sender, chain);
        if available < required {
            return Err(ChainError::InsufficientBalance {
                available: available.to_string(),
                required: required.to_string(),
            });
        }

        self.insert(tx, hash, now);
        Ok(hash)
    }

    fn insert(&mut self, tx: Transaction, hash: Sha256Hash, now: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_seq.insert(seq, hash);
        for address in [tx.sender, tx.recipient] {
            if address != NULL_ADDRESS {
                self.by_address.entry(address).or_default().insert(seq, hash);
            }
        }
        self.by_hash.insert(
            hash,
            PoolEntry {
                tx,
                seq,
                admitted_at: now,
            },
        );
    }

    /// Confirmed balance minus everything the sender already has pending.
    pub fn available(&self, address: &Address, chain: &ChainStore) -> Amount {
        chain.confirmed_balance(address).saturating_sub(self.outgoing(address))
    }

    /// Removes `hash` from every index. Absent hashes are a no-op.
    pub fn remove(&mut self, hash: &Sha256Hash) -> Option<Transaction> {
        let entry = self.by_hash.remove(hash)?;
        self.by_seq.remove(&entry.seq);
        for address in [entry.tx.sender, entry.tx.recipient] {
            if let Some(list) = self.by_address.get_mut(&address) {
                list.remove(&entry.seq);
                if list.is_empty() {
                    self.by_address.remove(&address);
                }
            }
        }
        Some(entry.tx)
    }

    /// Removes `hash` and blocks it from being admitted again.
    pub fn discard(&mut self, hash: &Sha256Hash) -> Option<Transaction> {
        let removed = self.remove(hash)?;
        self.discarded.insert(*hash, removed.timestamp);
        Some(removed)
    }

    /// Discards entries admitted more than `expiry_secs` before `now`, and
    /// forgets discarded hashes whose timestamp is past the same horizon.
    /// Without an expiry configured nothing is pruned.
    pub fn prune_expired(&mut self, now: u64) -> Vec<Sha256Hash> {
        let Some(ttl) = self.config.expiry_secs else {
            return Vec::new();
        };
        let expired: Vec<Sha256Hash> = self
            .by_seq
            .values()
            .filter(|hash| {
                self.by_hash
                    .get(*hash)
                    .is_some_and(|e| now.saturating_sub(e.admitted_at) > ttl)
            })
            .copied()
            .collect();
        for hash in &expired {
            self.discard(hash);
        }
        self.discarded
            .retain(|_, timestamp| timestamp.saturating_add(ttl) >= now);
        expired
    }

    /// Pending hashes touching `address`, oldest first.
    pub fn pending(&self, address: &Address) -> Vec<Sha256Hash> {
        self.by_address
            .get(address)
            .map(|list| list.values().copied().collect())
            .unwrap_or_default()
    }

    /// Every pending hash, oldest first.
    pub fn all_pending(&self) -> Vec<Sha256Hash> {
        self.by_seq.values().copied().collect()
    }

    pub fn get(&self, hash: &Sha256Hash) -> Option<&Transaction> {
        self.by_hash.get(hash).map(|e| &e.tx)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn is_discarded(&self, hash: &Sha256Hash) -> bool {
        self.discarded.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Pending transactions touching `address`, oldest first.
    pub fn transactions_for(&self, address: &Address) -> impl Iterator<Item = &Transaction> {
        self.by_address
            .get(address)
            .into_iter()
            .flat_map(|list| list.values())
            .filter_map(|hash| self.get(hash))
    }

    /// Σ (amount + fee) over pending sends from `address`.
    pub fn outgoing(&self, address: &Address) -> Amount {
        self.transactions_for(address)
            .filter(|tx| &tx.sender == address)
            .map(|tx| tx.total_cost().unwrap_or(tx.amount))
            .sum()
    }

    pub fn pending_outgoing_count(&self, address: &Address) -> u64 {
        self.transactions_for(address)
            .filter(|tx| &tx.sender == address)
            .count() as u64
    }
}

//! The ledger engine: key store, chain store and pool behind one handle.
//!
//! Locks are always taken chain first, then pool. Reads hold both read locks
//! so every answer comes from one consistent snapshot; admission holds the
//! chain read lock and the pool write lock; confirmation holds both write
//! locks so a hash moves from pool to chain in one step.

use crate::amount::{Amount, SignedAmount};
use crate::balance::BalanceAccountant;
use crate::blockchain::ChainStore;
use crate::config::{Config, LedgerConfig, MempoolConfig};
use crate::crypto::{address_to_hex, hash_to_hex, Address, Sha256Hash};
use crate::error::ChainError;
use crate::ingest::ingest;
use crate::keystore::KeyStore;
use crate::mempool::Mempool;
use crate::query::{OverviewEntry, QueryEngine, TransactionStatus};
use crate::transaction::{sign_transaction, Transaction, TransactionFactory, TransactionType};
use parking_lot::RwLock;
use std::path::Path;
use tracing::{info, warn};

/// Typed operation set served by the engine. The HTTP facade only sees this.
pub trait LedgerService: Send + Sync {
    fn node_address(&self) -> Address;
    fn get_balance(&self, address: &Address) -> Amount;
    fn get_pending_balance(&self, address: &Address) -> SignedAmount;
    /// Confirmed hashes, oldest first.
    fn get_transactions(&self, address: &Address) -> Vec<Sha256Hash>;
    /// Pending hashes for `address`, or every pending hash when `None`.
    fn get_pending_transactions(&self, address: Option<&Address>) -> Vec<Sha256Hash>;
    fn get_pending_transactions_for_address(&self, address: &Address) -> Vec<Sha256Hash>;
    fn get_transaction_amount(&self, hash: &Sha256Hash) -> Result<Amount, ChainError>;
    fn get_transaction_time(&self, hash: &Sha256Hash) -> Result<u64, ChainError>;
    fn get_transaction_sender(&self, hash: &Sha256Hash) -> Result<Address, ChainError>;
    fn get_transaction_recipient(&self, hash: &Sha256Hash) -> Result<Address, ChainError>;
    /// Builds a transaction; it comes back signed when the sender is the node.
    fn create_transaction(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: Amount,
        fee: Amount,
        tx_type: TransactionType,
    ) -> Result<Transaction, ChainError>;
    /// Ingests wire-encoded transaction data and returns its hash.
    fn send_transaction(&self, data: &str) -> Result<Sha256Hash, ChainError>;
    fn overview(&self, address: &Address) -> Vec<OverviewEntry>;
    fn transaction_status(&self, hash: &Sha256Hash) -> Result<TransactionStatus, ChainError>;
}

pub struct LedgerNode {
    keys: KeyStore,
    chain: RwLock<ChainStore>,
    pool: RwLock<Mempool>,
    factory: TransactionFactory,
}

impl std::fmt::Debug for LedgerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerNode")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl LedgerNode {
    /// Validates `config`, then opens the key store, the chain store and the
    /// pool in that order. Any failure aborts; there is no partially opened
    /// engine.
    pub fn open(config: &Config) -> Result<Self, ChainError> {
        config
            .validate()
            .map_err(|e| ChainError::StorageError(format!("Invalid configuration: {}", e)))?;
        let ledger = &config.ledger;
        let keys = if ledger.create_key_if_missing {
            KeyStore::load_or_create(&ledger.key_file)?
        } else {
            KeyStore::load(&ledger.key_file)?
        };

        let mut chain = ChainStore::open(&ledger.chain_dir, &ledger.entry_file)?;
        let seeded = chain.seed_genesis(&config.genesis_allocations()?)?;

        info!(
            address = %address_to_hex(&keys.address()),
            confirmed = chain.len(),
            genesis = seeded,
            chain_dir = %ledger.chain_dir.display(),
            "ledger opened"
        );

        Ok(Self::from_parts(keys, chain, config.mempool.clone()))
    }

    /// `init(chainDir, keyFile, entryFile)` with every other setting at its
    /// default. The key file must already exist.
    pub fn init(
        chain_dir: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
        entry_file: &str,
    ) -> Result<Self, ChainError> {
        let config = Config {
            ledger: LedgerConfig {
                chain_dir: chain_dir.as_ref().to_path_buf(),
                key_file: key_file.as_ref().to_path_buf(),
                entry_file: entry_file.to_string(),
                create_key_if_missing: false,
            },
            ..Config::default()
        };
        Self::open(&config)
    }

    pub fn from_parts(keys: KeyStore, chain: ChainStore, mempool: MempoolConfig) -> Self {
        LedgerNode {
            keys,
            chain: RwLock::new(chain),
            pool: RwLock::new(Mempool::new(mempool)),
            factory: TransactionFactory::new(),
        }
    }

    pub fn with_factory(mut self, factory: TransactionFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn available_balance(&self, address: &Address) -> Amount {
        let chain = self.chain.read();
        let pool = self.pool.read();
        BalanceAccountant::new(&chain, &pool).available_balance(address)
    }

    pub fn transaction(&self, hash: &Sha256Hash) -> Result<Transaction, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).transaction(hash).cloned()
    }

    /// Sender's confirmed plus pending outgoing count.
    fn next_nonce(chain: &ChainStore, pool: &Mempool, sender: &Address) -> u64 {
        chain.outgoing_count(sender) + pool.pending_outgoing_count(sender)
    }

    /// Creates, signs and admits a transaction from the node's own address.
    pub fn send_from_node(
        &self,
        recipient: &Address,
        amount: Amount,
        fee: Amount,
        tx_type: TransactionType,
    ) -> Result<Sha256Hash, ChainError> {
        let chain = self.chain.read();
        let mut pool = self.pool.write();

        let sender = self.keys.address();
        let nonce = Self::next_nonce(&chain, &pool, &sender);
        let mut tx = self.factory.create(sender, *recipient, amount, fee, tx_type, nonce)?;
        sign_transaction(&mut tx, &self.keys)?;

        let hash = pool.admit(tx, &chain)?;
        info!(hash = %hash_to_hex(&hash), amount = %amount, "created transaction");
        Ok(hash)
    }

    /// Moves a pending transaction into the chain store.
    pub fn confirm(&self, hash: &Sha256Hash) -> Result<(), ChainError> {
        let mut chain = self.chain.write();
        let mut pool = self.pool.write();

        let tx = match pool.get(hash) {
            Some(tx) => tx.clone(),
            None if chain.contains(hash) => {
                return Err(ChainError::DuplicateConfirmation(hash_to_hex(hash)))
            }
            None => {
                return Err(ChainError::NotFound(format!(
                    "Transaction {} is not pending",
                    hash_to_hex(hash)
                )))
            }
        };

        chain.confirm(tx)?;
        pool.remove(hash);
        info!(hash = %hash_to_hex(hash), confirmed = chain.len(), "confirmed transaction");
        Ok(())
    }

    /// Confirms a transaction directly, whether or not it is pending. This is
    /// the path for coinbase records produced outside the engine.
    pub fn confirm_transaction(&self, tx: Transaction) -> Result<Sha256Hash, ChainError> {
        let mut chain = self.chain.write();
        let mut pool = self.pool.write();

        let hash = chain.confirm(tx)?;
        pool.remove(&hash);
        info!(hash = %hash_to_hex(&hash), confirmed = chain.len(), "confirmed transaction");
        Ok(hash)
    }

    /// Drops a pending transaction for good.
    pub fn discard(&self, hash: &Sha256Hash) -> Result<(), ChainError> {
        let mut pool = self.pool.write();
        match pool.discard(hash) {
            Some(_) => {
                info!(hash = %hash_to_hex(hash), "discarded transaction");
                Ok(())
            }
            None => Err(ChainError::NotFound(format!(
                "Transaction {} is not pending",
                hash_to_hex(hash)
            ))),
        }
    }

    pub fn prune_expired(&self) -> Vec<Sha256Hash> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let expired = self.pool.write().prune_expired(now);
        if !expired.is_empty() {
            warn!(count = expired.len(), "expired pending transactions");
        }
        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pool.read().len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.chain.read().len()
    }
}

impl LedgerService for LedgerNode {
    fn node_address(&self) -> Address {
        self.keys.address()
    }

    fn get_balance(&self, address: &Address) -> Amount {
        self.chain.read().confirmed_balance(address)
    }

    fn get_pending_balance(&self, address: &Address) -> SignedAmount {
        let chain = self.chain.read();
        let pool = self.pool.read();
        BalanceAccountant::new(&chain, &pool).pending_balance(address)
    }

    fn get_transactions(&self, address: &Address) -> Vec<Sha256Hash> {
        self.chain.read().confirmed_transactions(address).to_vec()
    }

    fn get_pending_transactions(&self, address: Option<&Address>) -> Vec<Sha256Hash> {
        let pool = self.pool.read();
        match address {
            Some(address) => pool.pending(address),
            None => pool.all_pending(),
        }
    }

    fn get_pending_transactions_for_address(&self, address: &Address) -> Vec<Sha256Hash> {
        self.pool.read().pending(address)
    }

    fn get_transaction_amount(&self, hash: &Sha256Hash) -> Result<Amount, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).amount(hash)
    }

    fn get_transaction_time(&self, hash: &Sha256Hash) -> Result<u64, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).time(hash)
    }

    fn get_transaction_sender(&self, hash: &Sha256Hash) -> Result<Address, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).sender(hash)
    }

    fn get_transaction_recipient(&self, hash: &Sha256Hash) -> Result<Address, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).recipient(hash)
    }

    fn create_transaction(
        &self,
        sender: &Address,
        recipient: &Address,
        amount: Amount,
        fee: Amount,
        tx_type: TransactionType,
    ) -> Result<Transaction, ChainError> {
        let nonce = {
            let chain = self.chain.read();
            let pool = self.pool.read();
            Self::next_nonce(&chain, &pool, sender)
        };

        let mut tx = self.factory.create(*sender, *recipient, amount, fee, tx_type, nonce)?;
        if *sender == self.keys.address() {
            sign_transaction(&mut tx, &self.keys)?;
        }
        Ok(tx)
    }

    fn send_transaction(&self, data: &str) -> Result<Sha256Hash, ChainError> {
        let chain = self.chain.read();
        let mut pool = self.pool.write();
        ingest(data, &chain, &mut pool)
    }

    fn overview(&self, address: &Address) -> Vec<OverviewEntry> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).overview(address)
    }

    fn transaction_status(&self, hash: &Sha256Hash) -> Result<TransactionStatus, ChainError> {
        let chain = self.chain.read();
        let pool = self.pool.read();
        QueryEngine::new(&chain, &pool).status(hash)
    }
}

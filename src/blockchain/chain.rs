use crate::amount::Amount;
use crate::blockchain::state::LedgerState;
use crate::blockchain::validation::validate_confirmation;
use crate::crypto::{address_to_hex, hash_to_hex, Address, Sha256Hash};
use crate::error::ChainError;
use crate::persistence::{Database, InMemoryPersistence, Manifest, Persistence, DEFAULT_DATABASE_FILE};
use crate::transaction::Transaction;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Durable, append-only record of confirmed transactions.
pub struct ChainStore {
    state: LedgerState,
    persistence: Box<dyn Persistence>,
    manifest_path: Option<PathBuf>,
    database_name: String,
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore")
            .field("confirmed", &self.state.len())
            .field("manifest_path", &self.manifest_path)
            .finish_non_exhaustive()
    }
}

impl ChainStore {
    /// Store with an in-memory backend and no entry file.
    pub fn in_memory() -> Self {
        ChainStore {
            state: LedgerState::new(),
            persistence: Box::new(InMemoryPersistence::new()),
            manifest_path: None,
            database_name: DEFAULT_DATABASE_FILE.to_string(),
        }
    }

    /// Replays everything `persistence` holds.
    pub fn with_persistence(persistence: Box<dyn Persistence>) -> Result<Self, ChainError> {
        let state = LedgerState::rebuild(persistence.load_confirmed()?);
        Ok(ChainStore {
            state,
            persistence,
            manifest_path: None,
            database_name: DEFAULT_DATABASE_FILE.to_string(),
        })
    }

    /// Opens (or creates) the store under `chain_dir`, using `entry_file` as
    /// the manifest. The database named by the manifest is authoritative: a
    /// stale manifest is rewritten, a missing one is created. A manifest that
    /// records confirmed transactions in front of a missing or empty database
    /// is a `StorageError`.
    pub fn open(chain_dir: impl AsRef<Path>, entry_file: &str) -> Result<Self, ChainError> {
        let chain_dir = chain_dir.as_ref();
        std::fs::create_dir_all(chain_dir).map_err(|e| {
            ChainError::StorageError(format!(
                "Failed to create chain directory {}: {}",
                chain_dir.display(),
                e
            ))
        })?;

        let manifest_path = chain_dir.join(entry_file);
        let manifest = Manifest::read(&manifest_path)?;
        let database_name = manifest
            .as_ref()
            .map(|m| m.database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string());

        let database_path = chain_dir.join(&database_name);
        let recorded = manifest
            .as_ref()
            .is_some_and(|m| m.confirmed > 0 || m.head.is_some());
        if recorded && !database_path.exists() {
            return Err(ChainError::StorageError(format!(
                "Entry file {} names missing database {}",
                manifest_path.display(),
                database_path.display()
            )));
        }
        let database = Database::open(&database_path)?;
        let mut store = Self::with_persistence(Box::new(database))?;
        store.manifest_path = Some(manifest_path.clone());
        store.database_name = database_name;

        let confirmed = store.persistence.confirmed_count()?;
        let head = store.persistence.head()?;
        if confirmed != store.state.len() as u64 || head != store.state.head() {
            return Err(ChainError::StorageError(format!(
                "Database metadata disagrees with its records ({} rows, {} replayed)",
                confirmed,
                store.state.len()
            )));
        }

        if recorded && confirmed == 0 && head.is_none() {
            return Err(ChainError::StorageError(format!(
                "Entry file {} records confirmed transactions but database {} is empty",
                manifest_path.display(),
                store.database_name
            )));
        }

        match manifest {
            None => {
                info!(path = %manifest_path.display(), "creating entry file");
                store.write_manifest()?;
            }
            Some(m) if !m.matches(confirmed, head.as_ref()) => {
                warn!(
                    manifest_confirmed = m.confirmed,
                    database_confirmed = confirmed,
                    "entry file is stale, using database contents"
                );
                store.write_manifest()?;
            }
            Some(_) => {}
        }

        Ok(store)
    }

    fn write_manifest(&self) -> Result<(), ChainError> {
        match &self.manifest_path {
            Some(path) => Manifest::new(
                self.database_name.clone(),
                self.state.len() as u64,
                self.state.head(),
            )
            .write(path),
            None => Ok(()),
        }
    }

    /// Confirms each allocation as a coinbase record. Only applies to an
    /// empty store, so reopening never mints twice.
    pub fn seed_genesis(&mut self, allocations: &[(Address, Amount)]) -> Result<usize, ChainError> {
        if !self.state.is_empty() || allocations.is_empty() {
            return Ok(0);
        }
        for (index, (address, amount)) in allocations.iter().enumerate() {
            let coinbase = Transaction::coinbase(*address, *amount, index as u64, 0);
            self.confirm(coinbase)?;
            info!(address = %address_to_hex(address), amount = %amount, "genesis allocation");
        }
        Ok(allocations.len())
    }

    /// Validates and durably appends `tx`. Nothing changes on failure.
    pub fn confirm(&mut self, tx: Transaction) -> Result<Sha256Hash, ChainError> {
        validate_confirmation(&tx, &self.state)?;

        let hash = tx.hash();
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.persistence.append_confirmed(&tx, now)?;
        self.state.apply_transaction(tx);

        // The database is already authoritative; a failed manifest write is
        // repaired on the next open.
        if let Err(e) = self.write_manifest() {
            warn!(error = %e, "failed to update entry file");
        }

        Ok(hash)
    }

    /// Confirmed hashes for `address`, oldest first.
    pub fn confirmed_transactions(&self, address: &Address) -> &[Sha256Hash] {
        self.state.hashes_for(address)
    }

    pub fn get_transaction(&self, hash: &Sha256Hash) -> Result<&Transaction, ChainError> {
        self.state
            .get(hash)
            .ok_or_else(|| ChainError::NotFound(format!("Transaction {} not found", hash_to_hex(hash))))
    }

    pub fn find(&self, hash: &Sha256Hash) -> Option<&Transaction> {
        self.state.get(hash)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.state.contains(hash)
    }

    pub fn confirmed_balance(&self, address: &Address) -> Amount {
        self.state.get_balance(address)
    }

    /// Number of confirmed transactions sent by `address`.
    pub fn outgoing_count(&self, address: &Address) -> u64 {
        self.state.sent_count(address)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn head(&self) -> Option<Sha256Hash> {
        self.state.head()
    }

    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest_path.as_deref()
    }
}

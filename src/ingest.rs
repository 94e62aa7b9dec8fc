//! Ingestion of externally signed transactions.

use crate::blockchain::ChainStore;
use crate::crypto::{hash_to_hex, Sha256Hash};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::Transaction;
use tracing::{info, warn};

/// Decodes wire data (hex of the bincode encoding) and admits it into `pool`,
/// which checks structure and signature before the balance. Returns the
/// admitted hash.
pub fn ingest(data: &str, chain: &ChainStore, pool: &mut Mempool) -> Result<Sha256Hash, ChainError> {
    let tx = match Transaction::from_wire(data) {
        Ok(tx) => tx,
        Err(e) => {
            warn!(status = e.status(), error = %e, "invalid transaction");
            return Err(e);
        }
    };
    let hash = tx.hash();

    match pool.admit(tx, chain) {
        Ok(hash) => {
            info!(hash = %hash_to_hex(&hash), pending = pool.len(), "created transaction");
            Ok(hash)
        }
        Err(e) => {
            warn!(hash = %hash_to_hex(&hash), status = e.status(), error = %e, "invalid transaction");
            Err(e)
        }
    }
}

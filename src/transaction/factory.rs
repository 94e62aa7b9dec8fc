//! Construction of new, unsigned transactions and local signing.

use crate::amount::Amount;
use crate::crypto::{address_from_hex, Address};
use crate::error::ChainError;
use crate::keystore::KeyStore;
use crate::transaction::types::{Transaction, TransactionType};

/// Builds well-formed transactions. Timestamps come from the system clock
/// unless a fixed one is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFactory {
    fixed_timestamp: Option<u64>,
}

impl TransactionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose transactions all carry `timestamp`.
    pub fn with_timestamp(timestamp: u64) -> Self {
        TransactionFactory {
            fixed_timestamp: Some(timestamp),
        }
    }

    fn now(&self) -> u64 {
        self.fixed_timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
    }

    /// Creates an unsigned transaction. Coinbase records cannot be built here.
    pub fn create(
        &self,
        sender: Address,
        recipient: Address,
        amount: Amount,
        fee: Amount,
        tx_type: TransactionType,
        nonce: u64,
    ) -> Result<Transaction, ChainError> {
        if tx_type == TransactionType::Coinbase {
            return Err(ChainError::ValidationError(
                "Coinbase records cannot be created by users".to_string(),
            ));
        }

        let tx = Transaction::new(tx_type, sender, recipient, amount, fee, nonce, self.now());
        tx.validate_structure()?;
        Ok(tx)
    }

    /// Boundary entry point: every argument arrives as a string.
    pub fn create_from_strings(
        &self,
        sender: &str,
        recipient: &str,
        amount: &str,
        fee: &str,
        tx_type: &str,
        nonce: u64,
    ) -> Result<Transaction, ChainError> {
        let sender = address_from_hex(sender)?;
        let recipient = address_from_hex(recipient)?;
        let amount: Amount = amount.parse()?;
        let fee: Amount = fee.parse()?;
        let tx_type: TransactionType = tx_type.parse()?;
        self.create(sender, recipient, amount, fee, tx_type, nonce)
    }
}

/// Signs `tx` with the node key. The key must belong to the sender.
pub fn sign_transaction(tx: &mut Transaction, keys: &KeyStore) -> Result<(), ChainError> {
    if tx.sender != keys.address() {
        return Err(ChainError::ValidationError(format!(
            "Node key cannot sign for sender {}",
            hex::encode(tx.sender)
        )));
    }
    let hash = tx.hash();
    tx.sign(keys.sign(&hash), keys.public_key());
    Ok(())
}

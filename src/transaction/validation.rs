/// Stateless validation logic for transactions, separated from type definitions
use crate::crypto::{address_from_public_key, verify_hash_signature, NULL_ADDRESS};
use crate::error::ChainError;
use crate::transaction::types::{Transaction, TRANSACTION_VERSION};

impl Transaction {
    /// Full stateless validation: structure, then signature for user
    /// transactions. Balance checks need ledger state and live in the pool
    /// and chain store.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.validate_structure()?;
        if !self.is_coinbase() {
            self.validate_signature()?;
        }
        Ok(())
    }

    /// Field-level checks that need neither keys nor ledger state.
    pub fn validate_structure(&self) -> Result<(), ChainError> {
        if self.version != TRANSACTION_VERSION {
            return Err(ChainError::ValidationError(format!(
                "Unsupported transaction version {} (expected {})",
                self.version, TRANSACTION_VERSION
            )));
        }

        if self.recipient == NULL_ADDRESS {
            return Err(ChainError::ValidationError(
                "Recipient address cannot be empty".to_string(),
            ));
        }

        if self.total_cost().is_none() {
            return Err(ChainError::ValidationError(
                "Amount plus fee overflows".to_string(),
            ));
        }

        if self.is_coinbase() {
            if self.sender != NULL_ADDRESS {
                return Err(ChainError::ValidationError(
                    "Coinbase must not have a sender".to_string(),
                ));
            }
            if !self.fee.is_zero() {
                return Err(ChainError::ValidationError(
                    "Coinbase cannot carry a fee".to_string(),
                ));
            }
            if self.amount.is_zero() {
                return Err(ChainError::ValidationError(
                    "Coinbase amount must be greater than zero".to_string(),
                ));
            }
            return Ok(());
        }

        if self.sender == NULL_ADDRESS {
            return Err(ChainError::ValidationError(
                "Sender address cannot be empty".to_string(),
            ));
        }
        if self.sender == self.recipient {
            return Err(ChainError::ValidationError(
                "Sender and recipient cannot be the same".to_string(),
            ));
        }
        if self.amount.is_zero() && self.fee.is_zero() {
            return Err(ChainError::ValidationError(
                "Amount and fee cannot both be zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks that the attached public key belongs to the sender and that the
    /// signature covers this transaction's hash.
    pub fn validate_signature(&self) -> Result<(), ChainError> {
        let (signature, public_key) = match (&self.signature, &self.public_key) {
            (Some(sig), Some(pk)) => (sig, pk),
            _ => {
                return Err(ChainError::InvalidSignature(
                    "Transaction not signed".to_string(),
                ))
            }
        };

        if address_from_public_key(public_key) != self.sender {
            return Err(ChainError::InvalidSignature(format!(
                "Public key does not belong to sender {}",
                hex::encode(self.sender)
            )));
        }

        verify_hash_signature(public_key, &self.hash(), signature)
    }
}

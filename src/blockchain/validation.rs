use crate::blockchain::state::LedgerState;
use crate::crypto::hash_to_hex;
use crate::error::ChainError;
use crate::transaction::Transaction;

/// Checks a transaction against confirmed state before it is appended.
pub fn validate_confirmation(tx: &Transaction, state: &LedgerState) -> Result<(), ChainError> {
    let hash = tx.hash();
    if state.contains(&hash) {
        return Err(ChainError::DuplicateConfirmation(hash_to_hex(&hash)));
    }

    tx.validate()?;

    if !tx.is_coinbase() {
        let available = state.get_balance(&tx.sender);
        let required = tx
            .total_cost()
            .ok_or_else(|| ChainError::ValidationError("Amount plus fee overflows".to_string()))?;
        if available < required {
            return Err(ChainError::InsufficientBalance {
                available: available.to_string(),
                required: required.to_string(),
            });
        }
    }

    if state.get_balance(&tx.recipient).checked_add(tx.amount).is_none() {
        return Err(ChainError::ValidationError(format!(
            "Credit would overflow the balance of {}",
            hex::encode(tx.recipient)
        )));
    }

    Ok(())
}

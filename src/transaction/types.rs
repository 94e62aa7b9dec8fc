/// Transaction types for the ledger
use crate::amount::Amount;
use crate::crypto::{Address, Sha256Hash, NULL_ADDRESS};
use crate::error::ChainError;
use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Current transaction format version.
pub const TRANSACTION_VERSION: u32 = 1;

/// Maximum encoded transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Kinds of ledger record. `Coinbase` credits the recipient without a sender
/// and can only enter the ledger through confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    Stake,
    Unstake,
    Coinbase,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Stake => "stake",
            TransactionType::Unstake => "unstake",
            TransactionType::Coinbase => "coinbase",
        }
    }

    fn tag(&self) -> u32 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Stake => 1,
            TransactionType::Unstake => 2,
            TransactionType::Coinbase => 3,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the user-creatable kinds only.
impl FromStr for TransactionType {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "transfer" => Ok(TransactionType::Transfer),
            "stake" => Ok(TransactionType::Stake),
            "unstake" => Ok(TransactionType::Unstake),
            other => Err(ChainError::ValidationError(format!(
                "Unrecognized transaction type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub tx_type: TransactionType,
    /// Sender's outgoing transaction count when the transaction was built.
    pub nonce: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub fee: Amount,
    pub public_key: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

impl Transaction {
    pub fn new(
        tx_type: TransactionType,
        sender: Address,
        recipient: Address,
        amount: Amount,
        fee: Amount,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        Transaction {
            version: TRANSACTION_VERSION,
            tx_type,
            nonce,
            timestamp,
            sender,
            recipient,
            amount,
            fee,
            public_key: None,
            signature: None,
        }
    }

    /// Ledger credit with no sender and no fee.
    pub fn coinbase(recipient: Address, amount: Amount, nonce: u64, timestamp: u64) -> Self {
        Self::new(
            TransactionType::Coinbase,
            NULL_ADDRESS,
            recipient,
            amount,
            Amount::ZERO,
            nonce,
            timestamp,
        )
    }

    /// Hash over the immutable fields. Signature and public key are not
    /// covered, so the hash is the same before and after signing.
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.tx_type.tag().to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.sender);
        hasher.update(self.recipient);
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.fee.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some() && self.public_key.is_some()
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TransactionType::Coinbase
    }

    /// `amount + fee`, or `None` on overflow.
    pub fn total_cost(&self) -> Option<Amount> {
        self.amount.checked_add(self.fee)
    }

    pub fn involves(&self, address: &Address) -> bool {
        &self.sender == address || &self.recipient == address
    }

    /// Hex of the bincode encoding; the format accepted by `sendTransaction`.
    pub fn to_wire(&self) -> Result<String, ChainError> {
        let bytes = bincode::serialize(self)
            .map_err(|e| ChainError::ParseError(format!("Serialization failed: {}", e)))?;
        Ok(hex::encode(bytes))
    }

    pub fn from_wire(data: &str) -> Result<Self, ChainError> {
        let data = data.trim();
        if data.is_empty() {
            return Err(ChainError::ParseError("Empty transaction data".to_string()));
        }
        if data.len() > MAX_TRANSACTION_SIZE * 2 {
            return Err(ChainError::ParseError(format!(
                "Transaction too large: {} bytes (max: {})",
                data.len() / 2,
                MAX_TRANSACTION_SIZE
            )));
        }
        let bytes = hex::decode(data)
            .map_err(|e| ChainError::ParseError(format!("Transaction data is not hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        bincode::serialize(self)
            .map_err(|e| ChainError::StorageError(format!("Serialization failed: {}", e)))
    }

    /// Strict inverse of [`to_bytes`](Self::to_bytes): trailing bytes are
    /// rejected, so each transaction has exactly one encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(MAX_TRANSACTION_SIZE as u64)
            .reject_trailing_bytes()
            .deserialize(bytes)
            .map_err(|e| ChainError::ParseError(format!("Malformed transaction: {}", e)))
    }
}

//! Cryptographic primitives: addresses, hashes and secp256k1 signatures

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context shared by every
/// signer and verifier.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Derived address: SHA-256 of the compressed public key.
pub type Address = [u8; 32];

pub type Sha256Hash = [u8; 32];

/// Sender of coinbase records. Never valid for user transactions.
pub const NULL_ADDRESS: Address = [0u8; 32];

/// Convert an address to a hex string for display.
pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

/// Convert a 64-character hex string to an address.
pub fn address_from_hex(hex_str: &str) -> Result<Address, ChainError> {
    decode_32(hex_str.trim(), "address")
}

pub fn hash_to_hex(hash: &Sha256Hash) -> String {
    hex::encode(hash)
}

pub fn hash_from_hex(hex_str: &str) -> Result<Sha256Hash, ChainError> {
    decode_32(hex_str.trim(), "transaction hash")
}

fn decode_32(hex_str: &str, what: &str) -> Result<[u8; 32], ChainError> {
    if hex_str.len() != 64 {
        return Err(ChainError::ValidationError(format!(
            "{} must be a 64-character hex string, got {} characters",
            what,
            hex_str.len()
        )));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut out)
        .map_err(|e| ChainError::ValidationError(format!("Invalid hex {}: {}", what, e)))?;
    Ok(out)
}

/// Address for a compressed public key.
pub fn address_from_public_key(public_key_bytes: &[u8]) -> Address {
    Sha256::digest(public_key_bytes).into()
}

#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::KeyLoadError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::KeyLoadError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Returns the KeyPair's public key as a compressed byte array.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a 32-byte digest directly (no re-hashing) and returns the compact
    /// signature bytes.
    pub fn sign_hash(&self, hash: &Sha256Hash) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let message = Message::from_digest(*hash);
        SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact()
    }
}

/// Verifies a compact ECDSA signature over a 32-byte digest.
pub fn verify_hash_signature(
    public_key_bytes: &[u8],
    hash: &Sha256Hash,
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::InvalidSignature(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::InvalidSignature(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::InvalidSignature(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::InvalidSignature(format!("Malformed signature: {}", e)))?;
    let message = Message::from_digest(*hash);

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::InvalidSignature("Signature verification failed".to_string()))
}

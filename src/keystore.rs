//! Node key store.
//!
//! Holds the node's secp256k1 signing key, loaded from a JSON key file. The
//! secret key never leaves this module: callers get the derived address, the
//! public key, and signatures.

use crate::crypto::{address_to_hex, Address, KeyPair, Sha256Hash};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// On-disk key file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyFile {
    address: String,
    public_key: String,
    secret_key_hex: String,
    created: String,
}

pub struct KeyStore {
    keypair: KeyPair,
    path: PathBuf,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("address", &address_to_hex(&self.address()))
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KeyStore {
    /// Loads an existing key file.
    ///
    /// Fails with [`ChainError::KeyLoadError`] if the file is missing, is not
    /// a valid key document, or its address/public key do not match the
    /// secret key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ChainError::KeyLoadError(format!(
                "Key file {} not found",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ChainError::KeyLoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: KeyFile = serde_json::from_str(&contents).map_err(|e| {
            ChainError::KeyLoadError(format!("Malformed key file {}: {}", path.display(), e))
        })?;

        let secret = hex::decode(file.secret_key_hex.trim())
            .map_err(|e| ChainError::KeyLoadError(format!("Secret key is not hex: {}", e)))?;
        let keypair = KeyPair::from_secret_bytes(&secret)?;

        if !file.public_key.eq_ignore_ascii_case(&hex::encode(keypair.public_key_bytes())) {
            return Err(ChainError::KeyLoadError(
                "Public key does not match secret key".to_string(),
            ));
        }
        if !file.address.eq_ignore_ascii_case(&address_to_hex(&keypair.address())) {
            return Err(ChainError::KeyLoadError(
                "Address does not match secret key".to_string(),
            ));
        }

        Ok(KeyStore {
            keypair,
            path: path.to_path_buf(),
        })
    }

    /// Generates a fresh key and writes it to `path`. Refuses to overwrite an
    /// existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ChainError::KeyLoadError(format!(
                "Key file {} already exists",
                path.display()
            )));
        }

        let keypair = KeyPair::generate();
        let file = KeyFile {
            address: address_to_hex(&keypair.address()),
            public_key: hex::encode(keypair.public_key_bytes()),
            secret_key_hex: hex::encode(keypair.secret_key.secret_bytes()),
            created: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ChainError::KeyLoadError(format!("Failed to encode key file: {}", e)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err =
            |e: std::io::Error| ChainError::KeyLoadError(format!("Failed to write key file: {}", e));
        fs::create_dir_all(&dir).map_err(write_err)?;

        // NamedTempFile is created with owner-only permissions.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!(address = %file.address, path = %path.display(), "generated node key");

        Ok(KeyStore {
            keypair,
            path: path.to_path_buf(),
        })
    }

    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Self::create(path)
        }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Compressed public key, attached to transactions this node signs.
    pub fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key_bytes().to_vec()
    }

    /// Signs a transaction hash. Safe to call from many threads at once.
    pub fn sign(&self, hash: &Sha256Hash) -> Vec<u8> {
        self.keypair.sign_hash(hash).to_vec()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

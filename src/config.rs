//! Configuration management for the ledger node

use crate::amount::Amount;
use crate::crypto::{address_from_hex, Address};
use crate::error::ChainError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Initial confirmed balances, minted when the chain store is empty.
    #[serde(default)]
    pub genesis: Vec<GenesisAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_chain_dir")]
    pub chain_dir: PathBuf,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    /// Name of the manifest file inside `chain_dir`.
    #[serde(default = "default_entry_file")]
    pub entry_file: String,
    #[serde(default)]
    pub create_key_if_missing: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_dir: default_chain_dir(),
            key_file: default_key_file(),
            entry_file: default_entry_file(),
            create_key_if_missing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
    /// Pending transactions older than this are dropped by `prune_expired`.
    #[serde(default)]
    pub expiry_secs: Option<u64>,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: default_max_transactions(),
            expiry_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    /// Decimal amount, e.g. `"100"` or `"0.5"`.
    pub amount: String,
}

impl Config {
    /// Parsed genesis allocations, in file order.
    pub fn genesis_allocations(&self) -> Result<Vec<(Address, Amount)>, ChainError> {
        self.genesis
            .iter()
            .map(|g| -> Result<(Address, Amount), ChainError> {
                Ok((address_from_hex(&g.address)?, g.amount.parse::<Amount>()?))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.ledger.chain_dir.as_os_str().is_empty() {
            return Err("ledger.chain_dir must be set".into());
        }
        if self.ledger.key_file.as_os_str().is_empty() {
            return Err("ledger.key_file must be set".into());
        }
        let entry = Path::new(&self.ledger.entry_file);
        if self.ledger.entry_file.is_empty()
            || entry.file_name().and_then(|n| n.to_str()) != Some(self.ledger.entry_file.as_str())
        {
            return Err("ledger.entry_file must be a plain file name".into());
        }
        if self.mempool.max_transactions == 0 {
            return Err("mempool.max_transactions must be greater than zero".into());
        }
        self.genesis_allocations()
            .map_err(|e| format!("invalid genesis allocation: {}", e))?;
        Ok(())
    }
}

pub fn parse_config(contents: &str) -> Result<Config, Box<dyn std::error::Error>> {
    let config: Config = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    if config_str.trim().is_empty() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    parse_config(&config_str)
}

fn default_chain_dir() -> PathBuf {
    PathBuf::from("./data/chain")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("./data/node_key.json")
}

fn default_entry_file() -> String {
    "ledger.json".to_string()
}

fn default_max_transactions() -> usize {
    10_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.ledger.entry_file, "ledger.json");
        assert_eq!(config.mempool.max_transactions, 10_000);
        assert_eq!(config.mempool.expiry_secs, None);
        assert!(!config.ledger.create_key_if_missing);
        assert!(config.genesis.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let address = "ab".repeat(32);
        let toml = format!(
            r#"
            [ledger]
            chain_dir = "/var/lib/ledger"
            key_file = "/etc/ledger/key.json"
            entry_file = "root.json"
            create_key_if_missing = true

            [mempool]
            max_transactions = 50
            expiry_secs = 600

            [api]
            port = 8080

            [[genesis]]
            address = "{}"
            amount = "100.5"
            "#,
            address
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.ledger.chain_dir, PathBuf::from("/var/lib/ledger"));
        assert!(config.ledger.create_key_if_missing);
        assert_eq!(config.mempool.expiry_secs, Some(600));
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "127.0.0.1");

        let allocations = config.genesis_allocations().unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].1.to_string(), "100.5");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config("[mempool]\nmax_transactions = 0\n").is_err());
        assert!(parse_config("[ledger]\nentry_file = \"sub/entry.json\"\n").is_err());
        assert!(parse_config("[[genesis]]\naddress = \"xyz\"\namount = \"1\"\n").is_err());
        assert!(parse_config(&format!(
            "[[genesis]]\naddress = \"{}\"\namount = \"-1\"\n",
            "ab".repeat(32)
        ))
        .is_err());
    }
}

//! ledgernode - a single-node account ledger with a pending pool and an
//! append-only confirmed store
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger
//! - [`blockchain`] - Chain store: confirmed records, replay, manifest
//! - [`transaction`] - Transaction record, validation and construction
//! - [`mempool`] - Pending transaction pool
//!
//! ## Accounting & Queries
//! - [`amount`] - Fixed-point amounts
//! - [`balance`] - Confirmed, pending and available balances
//! - [`query`] - Lookups across pool and chain
//! - [`ingest`] - Admission of externally signed transactions
//!
//! ## Cryptography
//! - [`crypto`] - Addresses, hashes and signatures (secp256k1)
//! - [`keystore`] - The node's signing key
//!
//! ## Storage
//! - [`persistence`] - Database layer (SQLite) and manifest
//!
//! ## Engine & Integration
//! - [`node`] - The engine handle and its typed operations
//! - [`api`] - HTTP facade
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Accounting & Queries
// ============================================================================
pub mod amount;
pub mod balance;
pub mod ingest;
pub mod query;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod keystore;

// ============================================================================
// Storage
// ============================================================================
pub mod persistence;

// ============================================================================
// Engine & Integration
// ============================================================================
pub mod node;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

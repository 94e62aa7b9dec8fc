//! Integration tests for the ledger engine: balances, pool admission,
//! confirmation and durability across restarts

use ledgernode::amount::Amount;
use ledgernode::config::{Config, GenesisAllocation, LedgerConfig};
use ledgernode::crypto::{address_to_hex, Address, KeyPair};
use ledgernode::error::ChainError;
use ledgernode::keystore::KeyStore;
use ledgernode::node::{LedgerNode, LedgerService};
use ledgernode::persistence::Manifest;
use ledgernode::query::TransactionStatus;
use ledgernode::transaction::{Transaction, TransactionType};
use std::error::Error;
use tempfile::TempDir;

fn coins(n: u64) -> Amount {
    Amount::from_coins(n).unwrap()
}

/// Config for a node under `dir` whose own address holds `funds` at genesis,
/// plus any extra allocations.
fn config_with_genesis(
    dir: &TempDir,
    funds: u64,
    extra: &[(Address, u64)],
) -> Result<(Config, Address), Box<dyn Error>> {
    let key_file = dir.path().join("key").join("key.json");
    let keys = KeyStore::create(&key_file)?;

    let mut genesis = vec![GenesisAllocation {
        address: address_to_hex(&keys.address()),
        amount: funds.to_string(),
    }];
    genesis.extend(extra.iter().map(|(address, amount)| GenesisAllocation {
        address: address_to_hex(address),
        amount: amount.to_string(),
    }));

    let config = Config {
        ledger: LedgerConfig {
            chain_dir: dir.path().join("chain"),
            key_file,
            entry_file: "entry.json".to_string(),
            create_key_if_missing: false,
        },
        genesis,
        ..Config::default()
    };
    Ok((config, keys.address()))
}

#[test]
fn test_send_and_confirm_scenario() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let node = LedgerNode::open(&config)?;
    let bob = KeyPair::generate().address();

    let hash = node.send_from_node(&bob, coins(30), coins(1), TransactionType::Transfer)?;
    assert_eq!(node.get_pending_balance(&me).to_string(), "69");
    assert_eq!(node.get_balance(&me), coins(100));
    assert_eq!(node.get_pending_balance(&bob).to_string(), "30");
    assert_eq!(node.get_pending_transactions_for_address(&me), vec![hash]);

    node.confirm(&hash)?;
    assert_eq!(node.get_balance(&me), coins(69));
    assert_eq!(node.get_pending_balance(&me).to_string(), "69");
    assert_eq!(node.get_balance(&bob), coins(30));
    assert!(node.get_pending_transactions_for_address(&me).is_empty());
    assert_eq!(node.get_transactions(&bob), vec![hash]);
    Ok(())
}

#[test]
fn test_overspend_leaves_pool_unchanged() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let node = LedgerNode::open(&config)?;
    let bob = KeyPair::generate().address();

    let result = node.send_from_node(&bob, coins(150), Amount::ZERO, TransactionType::Transfer);
    assert!(matches!(result, Err(ChainError::InsufficientBalance { .. })));
    assert!(node.get_pending_transactions(None).is_empty());
    assert_eq!(node.get_pending_balance(&me).to_string(), "100");

    // Cumulative: 60 + 60 exceeds 100 even though each fits alone.
    node.send_from_node(&bob, coins(60), Amount::ZERO, TransactionType::Transfer)?;
    let second = node.send_from_node(&bob, coins(60), Amount::ZERO, TransactionType::Transfer);
    assert!(matches!(second, Err(ChainError::InsufficientBalance { .. })));
    assert_eq!(node.pending_count(), 1);
    Ok(())
}

#[test]
fn test_hash_is_stable_from_creation_to_confirmation() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 50, &[])?;
    let node = LedgerNode::open(&config)?;
    let bob = KeyPair::generate().address();

    let created = node.create_transaction(&me, &bob, coins(5), Amount::ZERO, TransactionType::Stake)?;
    let hash = node.send_transaction(&created.to_wire()?)?;
    assert_eq!(hash, created.hash());

    node.confirm(&hash)?;
    assert_eq!(node.transaction_status(&hash)?, TransactionStatus::Confirmed);
    assert_eq!(node.get_transaction_amount(&hash)?, coins(5));
    assert_eq!(node.get_transaction_sender(&hash)?, me);
    assert_eq!(node.get_transaction_recipient(&hash)?, bob);
    assert_eq!(node.get_transaction_time(&hash)?, created.timestamp);
    Ok(())
}

#[test]
fn test_externally_signed_transaction() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let alice = KeyPair::generate();
    let (config, me) = config_with_genesis(&dir, 1, &[(alice.address(), 40)])?;
    let node = LedgerNode::open(&config)?;

    let mut tx = node.create_transaction(
        &alice.address(),
        &me,
        coins(15),
        coins(1),
        TransactionType::Transfer,
    )?;
    assert!(!tx.is_signed());
    assert!(matches!(
        node.send_transaction(&tx.to_wire()?),
        Err(ChainError::InvalidSignature(_))
    ));

    let hash = tx.hash();
    tx.sign(alice.sign_hash(&hash).to_vec(), alice.public_key_bytes().to_vec());
    assert_eq!(node.send_transaction(&tx.to_wire()?)?, hash);
    assert!(matches!(
        node.send_transaction(&tx.to_wire()?),
        Err(ChainError::DuplicateTransaction(_))
    ));

    assert_eq!(node.get_pending_balance(&alice.address()).to_string(), "24");
    assert_eq!(node.get_pending_balance(&me).to_string(), "16");
    assert_eq!(node.get_pending_transactions(Some(&me)), vec![hash]);
    Ok(())
}

#[test]
fn test_coinbase_is_not_accepted_from_outside() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 1, &[])?;
    let node = LedgerNode::open(&config)?;

    let mint = Transaction::coinbase(me, coins(1_000), 99, 1_700_000_000);
    assert!(matches!(
        node.send_transaction(&mint.to_wire()?),
        Err(ChainError::ValidationError(_))
    ));
    assert_eq!(node.get_pending_balance(&me).to_string(), "1");

    node.confirm_transaction(mint)?;
    assert_eq!(node.get_balance(&me), coins(1_001));
    Ok(())
}

#[test]
fn test_overview_lists_pending_then_confirmed() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let node = LedgerNode::open(&config)?;
    let bob = KeyPair::generate().address();

    let genesis = node.get_transactions(&me)[0];
    let c2 = node.send_from_node(&bob, coins(1), Amount::ZERO, TransactionType::Transfer)?;
    node.confirm(&c2)?;
    let c3 = node.send_from_node(&bob, coins(1), Amount::ZERO, TransactionType::Transfer)?;
    node.confirm(&c3)?;
    let p1 = node.send_from_node(&bob, coins(1), Amount::ZERO, TransactionType::Transfer)?;
    let p2 = node.send_from_node(&bob, coins(1), Amount::ZERO, TransactionType::Transfer)?;

    let overview = node.overview(&me);
    let hashes: Vec<_> = overview.iter().map(|e| e.hash).collect();
    assert_eq!(hashes, vec![p2, p1, c3, c2, genesis]);
    assert!(overview[0].pending && overview[1].pending);
    assert!(overview[2..].iter().all(|e| !e.pending));
    Ok(())
}

#[test]
fn test_double_confirm_and_discard() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let node = LedgerNode::open(&config)?;
    let bob = KeyPair::generate().address();

    let kept = node.send_from_node(&bob, coins(10), Amount::ZERO, TransactionType::Transfer)?;
    let dropped = node.send_from_node(&bob, coins(10), Amount::ZERO, TransactionType::Transfer)?;

    node.confirm(&kept)?;
    assert!(matches!(node.confirm(&kept), Err(ChainError::DuplicateConfirmation(_))));
    assert_eq!(node.get_balance(&me), coins(90));

    node.discard(&dropped)?;
    assert!(matches!(node.discard(&dropped), Err(ChainError::NotFound(_))));
    assert!(matches!(node.confirm(&dropped), Err(ChainError::NotFound(_))));
    assert_eq!(node.get_pending_balance(&me).to_string(), "90");
    Ok(())
}

#[test]
fn test_confirmed_state_survives_restart() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let bob = KeyPair::generate().address();

    let (confirmed, pending) = {
        let node = LedgerNode::open(&config)?;
        let confirmed = node.send_from_node(&bob, coins(30), coins(1), TransactionType::Transfer)?;
        node.confirm(&confirmed)?;
        let pending = node.send_from_node(&bob, coins(5), Amount::ZERO, TransactionType::Transfer)?;
        (confirmed, pending)
    };

    let node = LedgerNode::open(&config)?;
    assert_eq!(node.confirmed_count(), 2);
    assert_eq!(node.get_balance(&me), coins(69));
    assert_eq!(node.get_balance(&bob), coins(30));
    assert_eq!(node.get_transactions(&bob), vec![confirmed]);
    assert_eq!(node.transaction_status(&confirmed)?, TransactionStatus::Confirmed);

    // The pool lives in memory only.
    assert!(matches!(node.transaction_status(&pending), Err(ChainError::NotFound(_))));
    assert_eq!(node.pending_count(), 0);
    Ok(())
}

#[test]
fn test_entry_file_recreated_and_corrected() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (config, me) = config_with_genesis(&dir, 100, &[])?;
    let entry = config.ledger.chain_dir.join(&config.ledger.entry_file);
    let bob = KeyPair::generate().address();

    {
        let node = LedgerNode::open(&config)?;
        let hash = node.send_from_node(&bob, coins(1), Amount::ZERO, TransactionType::Transfer)?;
        node.confirm(&hash)?;
    }
    let manifest = Manifest::read(&entry)?.ok_or("entry file missing")?;
    assert_eq!(manifest.confirmed, 2);

    std::fs::remove_file(&entry)?;
    {
        let node = LedgerNode::open(&config)?;
        assert_eq!(node.get_balance(&me), coins(99));
    }
    let recreated = Manifest::read(&entry)?.ok_or("entry file not recreated")?;
    assert_eq!(recreated.confirmed, 2);
    assert_eq!(recreated.head, manifest.head);

    let stale = Manifest::new(recreated.database.clone(), 0, None);
    stale.write(&entry)?;
    {
        let node = LedgerNode::open(&config)?;
        assert_eq!(node.confirmed_count(), 2);
    }
    let corrected = Manifest::read(&entry)?.ok_or("entry file missing")?;
    assert_eq!(corrected.confirmed, 2);
    assert_eq!(corrected.head, manifest.head);
    Ok(())
}

#[test]
fn test_open_fails_without_key_file() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let result = LedgerNode::init(dir.path().join("chain"), dir.path().join("key.txt"), "entry.txt");
    assert!(matches!(result, Err(ChainError::KeyLoadError(_))));

    let config = Config {
        ledger: LedgerConfig {
            chain_dir: dir.path().join("chain"),
            key_file: dir.path().join("key.txt"),
            entry_file: "entry.txt".to_string(),
            create_key_if_missing: true,
        },
        ..Config::default()
    };
    let node = LedgerNode::open(&config)?;
    assert_eq!(node.get_balance(&node.node_address()), Amount::ZERO);
    assert!(dir.path().join("key.txt").exists());
    Ok(())
}

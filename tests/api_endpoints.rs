//! Integration tests for the HTTP facade
//!
//! These drive every route through the router with a real engine behind it
//! and check the JSON envelopes and error codes.

use axum_test::TestServer;
use ledgernode::amount::Amount;
use ledgernode::api::{build_api_router, SharedLedger};
use ledgernode::blockchain::ChainStore;
use ledgernode::config::MempoolConfig;
use ledgernode::crypto::{address_to_hex, hash_to_hex, KeyPair};
use ledgernode::keystore::KeyStore;
use ledgernode::node::LedgerNode;
use ledgernode::transaction::Transaction;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    server: TestServer,
    node: Arc<LedgerNode>,
    me: String,
    _dir: TempDir,
}

fn fixture(funds: u64) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let keys = KeyStore::create(dir.path().join("key.json")).expect("key file");
    let mut chain = ChainStore::in_memory();
    chain
        .confirm(Transaction::coinbase(
            keys.address(),
            Amount::from_coins(funds).unwrap(),
            0,
            0,
        ))
        .expect("genesis");
    let me = address_to_hex(&keys.address());
    let node = Arc::new(LedgerNode::from_parts(keys, chain, MempoolConfig::default()));
    let shared: SharedLedger = node.clone();
    let server = TestServer::new(build_api_router(shared)).expect("Failed to create test server");
    Fixture {
        server,
        node,
        me,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let f = fixture(1);
    let response = f.server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["address"], f.me.as_str());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_create_send_and_query_flow() {
    let f = fixture(100);
    let bob = address_to_hex(&KeyPair::generate().address());

    let response = f
        .server
        .get("/createTransaction")
        .add_query_param("sender", &f.me)
        .add_query_param("recipient", &bob)
        .add_query_param("amount", "30")
        .add_query_param("fee", "1")
        .add_query_param("type", "transfer")
        .await;
    assert_eq!(response.status_code(), 200);
    let data = response.json::<Value>()["value"]
        .as_str()
        .expect("wire data")
        .to_string();

    let response = f.server.get("/sendTransaction").add_query_param("data", &data).await;
    assert_eq!(response.status_code(), 200);
    let hash = response.json::<Value>()["value"]
        .as_str()
        .expect("hash")
        .to_string();
    assert_eq!(hash.len(), 64);

    let json: Value = f.server.get("/getBalance").add_query_param("address", &f.me).await.json();
    assert_eq!(json["value"], "100");
    let json: Value = f
        .server
        .get("/getPendingBalance")
        .add_query_param("address", &f.me)
        .await
        .json();
    assert_eq!(json["value"], "69");

    let json: Value = f
        .server
        .get("/getPendingTransactionsForAddress")
        .add_query_param("address", &bob)
        .await
        .json();
    assert_eq!(json["transactions"], hash.as_str());

    let json: Value = f
        .server
        .get("/getTransactionAmount")
        .add_query_param("transactionHash", &hash)
        .await
        .json();
    assert_eq!(json["value"], "30");
    let json: Value = f
        .server
        .get("/getTransactionSender")
        .add_query_param("transactionHash", &hash)
        .await
        .json();
    assert_eq!(json["value"], f.me.as_str());
    let json: Value = f
        .server
        .get("/getTransactionRecipient")
        .add_query_param("transactionHash", &hash)
        .await
        .json();
    assert_eq!(json["value"], bob.as_str());

    let response = f
        .server
        .get("/getTransactionTime")
        .add_query_param("transactionHash", &hash)
        .await;
    assert_eq!(response.status_code(), 200);
    let time = response.json::<Value>()["value"].as_str().unwrap_or_default().to_string();
    assert_eq!(time.len(), "dd.mm.yyyy HH:MM:SS".len());

    let json: Value = f
        .server
        .get("/getOverview")
        .add_query_param("address", &f.me)
        .await
        .json();
    let items = json["transactions"].as_array().expect("overview items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["hash"], hash.as_str());
    assert_eq!(items[0]["pending"], true);
    assert_eq!(items[1]["pending"], false);
}

#[tokio::test]
async fn test_transaction_lists_are_newline_joined() {
    let f = fixture(100);
    let bob = KeyPair::generate().address();
    let first = f
        .node
        .send_from_node(&bob, Amount::from_coins(1).unwrap(), Amount::ZERO, "transfer".parse().unwrap())
        .unwrap();
    let second = f
        .node
        .send_from_node(&bob, Amount::from_coins(2).unwrap(), Amount::ZERO, "stake".parse().unwrap())
        .unwrap();

    let expected = format!("{}\n{}", hash_to_hex(&first), hash_to_hex(&second));

    let json: Value = f.server.get("/getPendingTransactions").await.json();
    assert_eq!(json["transactions"], expected.as_str());

    let json: Value = f
        .server
        .get("/getPendingTransactions")
        .add_query_param("address", address_to_hex(&bob))
        .await
        .json();
    assert_eq!(json["transactions"], expected.as_str());

    f.node.confirm(&first).unwrap();
    let json: Value = f
        .server
        .get("/getTransactions")
        .add_query_param("address", address_to_hex(&bob))
        .await
        .json();
    assert_eq!(json["transactions"], hash_to_hex(&first).as_str());

    let json: Value = f
        .server
        .get("/getTransactions")
        .add_query_param("address", address_to_hex(&KeyPair::generate().address()))
        .await
        .json();
    assert_eq!(json["transactions"], "");
}

#[tokio::test]
async fn test_error_responses() {
    let f = fixture(100);
    let bob = address_to_hex(&KeyPair::generate().address());

    let response = f.server.get("/getBalance").add_query_param("address", "not-hex").await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert_eq!(json["status"], "PARSE_ERROR");
    assert!(json["error"].is_string());

    let response = f
        .server
        .get("/getTransactionAmount")
        .add_query_param("transactionHash", "ab".repeat(32))
        .await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<Value>()["status"], "NOT_FOUND");

    let response = f
        .server
        .get("/createTransaction")
        .add_query_param("sender", &f.me)
        .add_query_param("recipient", &bob)
        .add_query_param("amount", "1")
        .add_query_param("type", "coinbase")
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["status"], "INVALID_TRANSACTION");

    let response = f.server.get("/sendTransaction").add_query_param("data", "zz").await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["status"], "PARSE_ERROR");

    let response = f
        .server
        .get("/createTransaction")
        .add_query_param("sender", &f.me)
        .add_query_param("recipient", &bob)
        .add_query_param("amount", "150")
        .add_query_param("type", "transfer")
        .await;
    assert_eq!(response.status_code(), 200);
    let data = response.json::<Value>()["value"]
        .as_str()
        .expect("wire data")
        .to_string();
    let response = f.server.get("/sendTransaction").add_query_param("data", &data).await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["status"], "INSUFFICIENT_BALANCE");
    assert_eq!(f.node.pending_count(), 0);
}

#[tokio::test]
async fn test_duplicate_send_conflicts() {
    let f = fixture(10);
    let bob = address_to_hex(&KeyPair::generate().address());

    let data = f
        .server
        .get("/createTransaction")
        .add_query_param("sender", &f.me)
        .add_query_param("recipient", &bob)
        .add_query_param("amount", "0.5")
        .add_query_param("type", "unstake")
        .await
        .json::<Value>()["value"]
        .as_str()
        .expect("wire data")
        .to_string();

    let response = f.server.get("/sendTransaction").add_query_param("data", &data).await;
    assert_eq!(response.status_code(), 200);
    let response = f.server.get("/sendTransaction").add_query_param("data", &data).await;
    assert_eq!(response.status_code(), 409);
    assert_eq!(response.json::<Value>()["status"], "DUPLICATE_TRANSACTION");
}

#[tokio::test]
async fn test_sends_succeed_while_confirmations_run() {
    let f = fixture(100);
    let bob = address_to_hex(&KeyPair::generate().address());

    let engine = f.node.clone();
    let confirmer = std::thread::spawn(move || {
        let carol = KeyPair::generate().address();
        for _ in 0..20 {
            let hash = engine
                .send_from_node(&carol, Amount::from_coins(1).unwrap(), Amount::ZERO, "transfer".parse().unwrap())
                .unwrap();
            engine.confirm(&hash).unwrap();
        }
    });

    let mut sent = Vec::new();
    for _ in 0..5 {
        let data = f
            .server
            .get("/createTransaction")
            .add_query_param("sender", &f.me)
            .add_query_param("recipient", &bob)
            .add_query_param("amount", "2")
            .add_query_param("type", "transfer")
            .await
            .json::<Value>()["value"]
            .as_str()
            .expect("wire data")
            .to_string();
        let response = f.server.get("/sendTransaction").add_query_param("data", &data).await;
        assert_eq!(response.status_code(), 200);
        sent.push(response.json::<Value>()["value"].as_str().expect("hash").to_string());
    }
    confirmer.join().expect("confirmer thread");

    assert_eq!(f.node.confirmed_count(), 21);
    assert_eq!(f.node.pending_count(), 5);
    let json: Value = f
        .server
        .get("/getPendingBalance")
        .add_query_param("address", &f.me)
        .await
        .json();
    assert_eq!(json["value"], "70");
    let unique: std::collections::HashSet<_> = sent.iter().collect();
    assert_eq!(unique.len(), 5);
}

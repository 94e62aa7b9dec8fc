//! Balance accounting over a snapshot of the chain store and the pool.
//!
//! Callers hold both read locks for the duration of a call, so the two views
//! are consistent with each other.

use crate::amount::{Amount, SignedAmount};
use crate::blockchain::ChainStore;
use crate::crypto::Address;
use crate::mempool::Mempool;

pub struct BalanceAccountant<'a> {
    chain: &'a ChainStore,
    pool: &'a Mempool,
}

impl<'a> BalanceAccountant<'a> {
    pub fn new(chain: &'a ChainStore, pool: &'a Mempool) -> Self {
        Self { chain, pool }
    }

    pub fn confirmed_balance(&self, address: &Address) -> Amount {
        self.chain.confirmed_balance(address)
    }

    /// Σ pending received − Σ pending (amount + fee) sent.
    pub fn net_pool_effect(&self, address: &Address) -> SignedAmount {
        self.pool
            .transactions_for(address)
            .fold(SignedAmount::ZERO, |net, tx| {
                let mut net = net;
                if &tx.recipient == address {
                    net = net.add_amount(tx.amount);
                }
                if &tx.sender == address {
                    net = net.sub_amount(tx.amount).sub_amount(tx.fee);
                }
                net
            })
    }

    /// Confirmed balance adjusted optimistically by the pool.
    pub fn pending_balance(&self, address: &Address) -> SignedAmount {
        SignedAmount::from(self.confirmed_balance(address)) + self.net_pool_effect(address)
    }

    /// What `address` can still commit to new transactions.
    pub fn available_balance(&self, address: &Address) -> Amount {
        self.pool.available(address, self.chain)
    }
}

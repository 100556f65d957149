//! Collaborator contracts.
//!
//! The engine never owns ledger state. Every query reads through these traits,
//! which a node implements over its address/UTXO indexes, mempool and block
//! store, and which `memory::MemoryLedger` implements over a snapshot.
//! Implementations must be safe to call repeatedly within one request; a later
//! call may observe newer state than an earlier one.

use std::sync::Arc;

use crate::address::NetworkParams;
use crate::clock::Clock;
use crate::error::SapiError;
use crate::types::{
    confirmations_at, AddressIndexDelta, AddressKey, Block, DepositRecord, DepositSpan,
    MempoolDelta, OutPoint, Txid, UnspentCursor, UnspentOutputRecord,
};

/// Persisted address and unspent-output indexes
pub trait AddressIndex {
    /// All value changes of an address, ascending in ledger order
    fn index_deltas(&self, key: &AddressKey) -> Result<Vec<AddressIndexDelta>, SapiError>;

    /// Number of unspent outputs and a marker for reverse scans
    fn unspent_count(&self, key: &AddressKey) -> Result<(usize, UnspentCursor), SapiError>;

    /// `limit` unspent outputs starting `offset` entries from the start
    /// (or from `cursor` backwards when `reverse` is set)
    fn unspent_slice(
        &self,
        key: &AddressKey,
        cursor: Option<&UnspentCursor>,
        offset: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<UnspentOutputRecord>, SapiError>;
}

/// Confirmed receipts per address, ordered by block time
pub trait DepositIndex {
    /// Deposits with `from <= timestamp < to`
    fn deposit_count(&self, key: &AddressKey, from: i64, to: i64) -> Result<DepositSpan, SapiError>;

    /// `limit` deposits starting `offset` entries from the first deposit at
    /// `anchor` (or from the last one at `anchor` backwards when `reverse` is set)
    fn deposit_slice(
        &self,
        key: &AddressKey,
        anchor: i64,
        offset: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<DepositRecord>, SapiError>;
}

/// Read-only view of the transaction pool
pub trait MempoolView {
    fn address_deltas(&self, key: &AddressKey) -> Vec<MempoolDelta>;

    /// True if a pending transaction already spends this output
    fn is_spent(&self, outpoint: &OutPoint) -> bool;

    /// True if the transaction is locked by instant send
    fn is_instant_finalized(&self, txid: &Txid) -> bool;
}

/// Active chain and block storage
pub trait ChainView {
    fn height(&self) -> i32;

    /// Median time past of the tip, `None` without a tip
    fn median_time_past(&self) -> Option<i64>;

    fn read_block(&self, height: i32) -> Result<Arc<Block>, SapiError>;

    fn confirmations(&self, block_height: i32) -> i32 {
        confirmations_at(self.height(), block_height)
    }
}

/// Collaborators handed to every component of one request
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub index: &'a dyn AddressIndex,
    pub deposits: &'a dyn DepositIndex,
    pub mempool: &'a dyn MempoolView,
    pub chain: &'a dyn ChainView,
    pub clock: &'a dyn Clock,
    pub network: &'a NetworkParams,
}

impl<'a> Collaborators<'a> {
    pub fn new(
        index: &'a dyn AddressIndex,
        deposits: &'a dyn DepositIndex,
        mempool: &'a dyn MempoolView,
        chain: &'a dyn ChainView,
        clock: &'a dyn Clock,
        network: &'a NetworkParams,
    ) -> Self {
        Self { index, deposits, mempool, chain, clock, network }
    }

    /// Every view served by one ledger
    pub fn from_ledger<L>(ledger: &'a L, clock: &'a dyn Clock, network: &'a NetworkParams) -> Self
    where
        L: AddressIndex + DepositIndex + MempoolView + ChainView,
    {
        Self::new(ledger, ledger, ledger, ledger, clock, network)
    }

    /// Same collaborators reading blocks through `chain`
    pub fn with_chain(self, chain: &'a dyn ChainView) -> Self {
        Self { chain, ..self }
    }
}

//! Address transaction history and mempool listing.
//!
//! History is a sequence of distinct transactions. Index deltas of the same
//! transaction (several outputs, or inputs and outputs) are summed into one
//! entry at the position of its first sighting. Pending transactions join the
//! sequence at the newest end with height -1.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::address::{address_from_index, resolve_address_key};
use crate::constants::{is_confirmed_height, HEIGHT_MEMPOOL, MAX_HISTORY_PAGE_SIZE};
use crate::error::SapiError;
use crate::ledger::Collaborators;
use crate::paging::{check_page_number, check_page_size, page_count, page_window};
use crate::types::{MempoolDelta, Txid};

/// Direction of a transaction relative to the queried address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxDirection {
    #[default]
    Any,
    Received,
    Sent,
}

impl TxDirection {
    /// Direction of a net amount: positive is received, anything else sent
    pub fn of(amount: i64) -> Self {
        if amount > 0 {
            TxDirection::Received
        } else {
            TxDirection::Sent
        }
    }

    pub fn matches(&self, other: TxDirection) -> bool {
        *self == TxDirection::Any || *self == other
    }
}

impl fmt::Display for TxDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxDirection::Any => "Any",
            TxDirection::Received => "Received",
            TxDirection::Sent => "Sent",
        };
        f.write_str(name)
    }
}

impl FromStr for TxDirection {
    type Err = SapiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(TxDirection::Any),
            "received" => Ok(TxDirection::Received),
            "sent" => Ok(TxDirection::Sent),
            _ => Err(SapiError::InvalidParameter(format!("unknown direction: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// 1-based
    pub page_number: u64,
    pub page_size: u64,
    pub ascending: bool,
    pub direction: TxDirection,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self { page_number: 1, page_size: 10, ascending: false, direction: TxDirection::Any }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub txid: Txid,
    /// -1 for mempool transactions
    pub block_height: i32,
    /// Net value change for the address
    pub amount: i64,
    pub direction: TxDirection,
    /// Block time, or mempool entry time for pending transactions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub total_count: u64,
    pub page_count: u64,
    pub page: u64,
    pub entries: Vec<TransactionEntry>,
}

/// Collect entries in first-sighting order, summing amounts per txid
struct Aggregator {
    entries: Vec<TransactionEntry>,
    positions: HashMap<Txid, usize>,
}

impl Aggregator {
    fn new() -> Self {
        Self { entries: Vec::new(), positions: HashMap::new() }
    }

    fn contains(&self, txid: &Txid) -> bool {
        self.positions.contains_key(txid)
    }

    fn add(&mut self, txid: Txid, block_height: i32, amount: i64, time: Option<i64>) {
        match self.positions.get(&txid) {
            Some(&pos) => self.entries[pos].amount += amount,
            None => {
                self.positions.insert(txid, self.entries.len());
                self.entries.push(TransactionEntry {
                    txid,
                    block_height,
                    amount,
                    direction: TxDirection::Any,
                    time,
                });
            }
        }
    }

    fn finish(mut self) -> Vec<TransactionEntry> {
        for entry in &mut self.entries {
            entry.direction = TxDirection::of(entry.amount);
        }
        self.entries
    }
}

fn sorted_by_timestamp(mut deltas: Vec<MempoolDelta>) -> Vec<MempoolDelta> {
    deltas.sort_by_key(|d| d.timestamp);
    deltas
}

/// One page of an address' transaction history
pub fn list_transactions(
    ctx: &Collaborators<'_>,
    address: &str,
    query: &TransactionQuery,
) -> Result<TransactionPage, SapiError> {
    check_page_size(query.page_size, MAX_HISTORY_PAGE_SIZE)?;
    if query.page_number == 0 {
        return Err(SapiError::InvalidParameter("pageNumber must be at least 1".to_string()));
    }

    let key = resolve_address_key(address, ctx.network)?;

    let mut deltas = ctx.index.index_deltas(&key)?;
    if !query.ascending {
        deltas.reverse();
    }

    let mut confirmed = Aggregator::new();
    for delta in &deltas {
        confirmed.add(delta.txid, delta.block_height, delta.amount_satoshis, None);
    }

    let mut pending = Aggregator::new();
    for delta in sorted_by_timestamp(ctx.mempool.address_deltas(&key)) {
        if confirmed.contains(&delta.txid) {
            continue;
        }
        pending.add(delta.txid, HEIGHT_MEMPOOL, delta.amount_satoshis, Some(delta.timestamp));
    }

    let mut confirmed = confirmed.finish();
    let mut pending = pending.finish();
    let mut sequence = if query.ascending {
        confirmed.append(&mut pending);
        confirmed
    } else {
        // Newest pending transaction first
        pending.reverse();
        pending.append(&mut confirmed);
        pending
    };
    sequence.retain(|entry| query.direction.matches(entry.direction));

    let total_count = sequence.len() as u64;
    // An empty history still has one (empty) page
    let pages = page_count(total_count, query.page_size).max(1);
    check_page_number(query.page_number, pages)?;

    let window = page_window(total_count, query.page_number, query.page_size);
    let mut entries: Vec<TransactionEntry> = sequence
        .drain(window.start as usize..window.end as usize)
        .collect();

    for entry in &mut entries {
        if is_confirmed_height(entry.block_height) {
            entry.time = Some(ctx.chain.read_block(entry.block_height)?.time);
        }
    }

    debug!(
        address = %address,
        total = total_count,
        pages,
        page = query.page_number,
        returned = entries.len(),
        "Transaction page"
    );

    Ok(TransactionPage { total_count, page_count: pages, page: query.page_number, entries })
}

/// Pending delta of an address as listed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolEntry {
    pub address: String,
    pub txid: Txid,
    pub index: u32,
    pub satoshis: i64,
    pub timestamp: i64,
    #[serde(rename = "prevtxid", skip_serializing_if = "Option::is_none")]
    pub prev_txid: Option<Txid>,
    #[serde(rename = "prevout", skip_serializing_if = "Option::is_none")]
    pub prev_out: Option<u32>,
}

/// Mempool deltas of an address, oldest first
pub fn list_mempool(ctx: &Collaborators<'_>, address: &str) -> Result<Vec<MempoolEntry>, SapiError> {
    let key = resolve_address_key(address, ctx.network)?;

    sorted_by_timestamp(ctx.mempool.address_deltas(&key))
        .into_iter()
        .map(|delta| {
            let address = address_from_index(delta.address_type, &key.hash, ctx.network)?;
            let prev = if delta.amount_satoshis < 0 { delta.prevout } else { None };
            Ok(MempoolEntry {
                address,
                txid: delta.txid,
                index: delta.index,
                satoshis: delta.amount_satoshis,
                timestamp: delta.timestamp,
                prev_txid: prev.map(|p| p.txid),
                prev_out: prev.map(|p| p.index),
            })
        })
        .collect()
}

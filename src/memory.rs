//! In-memory ledger backed by a JSON snapshot.
//!
//! `MemoryLedger` implements every collaborator trait over data loaded once at
//! start-up. The CLI and the diagnostics tool query snapshots exported from a
//! node; the test suites build ledgers with `fixtures::SnapshotBuilder`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::address::{resolve_address_key, NetworkParams};
use crate::error::SapiError;
use crate::ledger::{AddressIndex, ChainView, DepositIndex, MempoolView};
use crate::types::{
    AddressIndexDelta, AddressKey, Block, DepositRecord, DepositSpan, MempoolDelta, OutPoint, Txid,
    UnspentCursor, UnspentOutputRecord,
};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad address in snapshot: {0}")]
    Address(#[from] SapiError),
}

/// On-disk form of a ledger view
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub tip_height: i32,
    #[serde(default)]
    pub median_time_past: Option<i64>,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub addresses: Vec<AddressSnapshot>,
    #[serde(default)]
    pub mempool: MempoolSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub address: String,
    #[serde(default)]
    pub deltas: Vec<AddressIndexDelta>,
    #[serde(default)]
    pub unspent: Vec<UnspentOutputRecord>,
    #[serde(default)]
    pub deposits: Vec<DepositRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolSnapshot {
    #[serde(default)]
    pub deltas: Vec<MempoolAddressDelta>,
    /// Outputs consumed by pending transactions
    #[serde(default)]
    pub spent: Vec<OutPoint>,
    /// Transactions locked by instant send
    #[serde(default)]
    pub instant: Vec<Txid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolAddressDelta {
    pub address: String,
    #[serde(flatten)]
    pub delta: MempoolDelta,
}

#[derive(Debug, Default)]
struct AddressData {
    deltas: Vec<AddressIndexDelta>,
    /// Ascending by (height, txid, index)
    unspent: Vec<UnspentOutputRecord>,
    /// Ascending by (timestamp, txid)
    deposits: Vec<DepositRecord>,
}

/// Ledger view held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tip_height: i32,
    median_time_past: Option<i64>,
    blocks: HashMap<i32, Arc<Block>>,
    addresses: HashMap<AddressKey, AddressData>,
    mempool_deltas: HashMap<AddressKey, Vec<MempoolDelta>>,
    mempool_spent: HashSet<OutPoint>,
    instant: HashSet<Txid>,
    block_reads: AtomicUsize,
}

impl MemoryLedger {
    /// Load a JSON snapshot from disk
    pub fn load(path: &Path, params: &NetworkParams) -> Result<Self, SnapshotError> {
        let text = fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&text)?;
        let ledger = Self::from_snapshot(snapshot, params)?;
        info!(
            path = %path.display(),
            tip = ledger.tip_height,
            blocks = ledger.blocks.len(),
            addresses = ledger.addresses.len(),
            "Loaded ledger snapshot"
        );
        Ok(ledger)
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot, params: &NetworkParams) -> Result<Self, SapiError> {
        let mut ledger = MemoryLedger {
            tip_height: snapshot.tip_height,
            median_time_past: snapshot.median_time_past,
            ..Default::default()
        };

        for block in snapshot.blocks {
            ledger.blocks.insert(block.height, Arc::new(block));
        }

        for entry in snapshot.addresses {
            let key = resolve_address_key(&entry.address, params)?;
            let data = ledger.addresses.entry(key).or_default();
            data.deltas.extend(entry.deltas);
            data.unspent.extend(entry.unspent);
            data.deposits.extend(entry.deposits);
        }

        for entry in snapshot.mempool.deltas {
            let key = resolve_address_key(&entry.address, params)?;
            ledger.mempool_deltas.entry(key).or_default().push(entry.delta);
        }
        ledger.mempool_spent.extend(snapshot.mempool.spent);
        ledger.instant.extend(snapshot.mempool.instant);

        ledger.sort_indexes();
        Ok(ledger)
    }

    fn sort_indexes(&mut self) {
        for data in self.addresses.values_mut() {
            data.unspent
                .sort_by(|a, b| (a.block_height, a.txid, a.output_index).cmp(&(b.block_height, b.txid, b.output_index)));
            data.deposits.sort_by(|a, b| (a.timestamp, a.txid).cmp(&(b.timestamp, b.txid)));
        }
    }

    /// Number of `read_block` calls served so far
    pub fn block_reads(&self) -> usize {
        self.block_reads.load(Ordering::Relaxed)
    }

    fn address(&self, key: &AddressKey) -> Option<&AddressData> {
        self.addresses.get(key)
    }
}

impl AddressIndex for MemoryLedger {
    fn index_deltas(&self, key: &AddressKey) -> Result<Vec<AddressIndexDelta>, SapiError> {
        Ok(self.address(key).map(|d| d.deltas.clone()).unwrap_or_default())
    }

    fn unspent_count(&self, key: &AddressKey) -> Result<(usize, UnspentCursor), SapiError> {
        let Some(data) = self.address(key) else {
            return Ok((0, UnspentCursor::default()));
        };
        let cursor = UnspentCursor { last: data.unspent.last().map(|u| u.outpoint()) };
        Ok((data.unspent.len(), cursor))
    }

    fn unspent_slice(
        &self,
        key: &AddressKey,
        cursor: Option<&UnspentCursor>,
        offset: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<UnspentOutputRecord>, SapiError> {
        let Some(data) = self.address(key) else {
            return Ok(Vec::new());
        };

        if !reverse {
            return Ok(data.unspent.iter().skip(offset).take(limit).cloned().collect());
        }

        // Reverse scans walk back from the cursor entry (inclusive)
        let end = match cursor.and_then(|c| c.last) {
            Some(last) => data
                .unspent
                .iter()
                .position(|u| u.outpoint() == last)
                .map(|pos| pos + 1)
                .unwrap_or(data.unspent.len()),
            None => data.unspent.len(),
        };
        debug!(offset, limit, end, "Reverse unspent scan");
        Ok(data.unspent[..end].iter().rev().skip(offset).take(limit).cloned().collect())
    }
}

impl DepositIndex for MemoryLedger {
    fn deposit_count(&self, key: &AddressKey, from: i64, to: i64) -> Result<DepositSpan, SapiError> {
        let Some(data) = self.address(key) else {
            return Ok(DepositSpan::default());
        };
        let mut in_range = data.deposits.iter().filter(|d| d.timestamp >= from && d.timestamp < to);
        let Some(first) = in_range.next() else {
            return Ok(DepositSpan::default());
        };
        let (count, last) = in_range.fold((1, first), |(n, _), d| (n + 1, d));
        Ok(DepositSpan { count, first_timestamp: first.timestamp, last_timestamp: last.timestamp })
    }

    fn deposit_slice(
        &self,
        key: &AddressKey,
        anchor: i64,
        offset: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<DepositRecord>, SapiError> {
        let Some(data) = self.address(key) else {
            return Ok(Vec::new());
        };

        if reverse {
            let end = data.deposits.partition_point(|d| d.timestamp <= anchor);
            Ok(data.deposits[..end].iter().rev().skip(offset).take(limit).cloned().collect())
        } else {
            let start = data.deposits.partition_point(|d| d.timestamp < anchor);
            Ok(data.deposits[start..].iter().skip(offset).take(limit).cloned().collect())
        }
    }
}

impl MempoolView for MemoryLedger {
    fn address_deltas(&self, key: &AddressKey) -> Vec<MempoolDelta> {
        self.mempool_deltas.get(key).cloned().unwrap_or_default()
    }

    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.mempool_spent.contains(outpoint)
    }

    fn is_instant_finalized(&self, txid: &Txid) -> bool {
        self.instant.contains(txid)
    }
}

impl ChainView for MemoryLedger {
    fn height(&self) -> i32 {
        self.tip_height
    }

    fn median_time_past(&self) -> Option<i64> {
        self.median_time_past
    }

    fn read_block(&self, height: i32) -> Result<Arc<Block>, SapiError> {
        self.block_reads.fetch_add(1, Ordering::Relaxed);
        self.blocks.get(&height).cloned().ok_or(SapiError::BlockNotFound(height))
    }
}

/// Ledger builders for tests
#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::script::{lock_prefix, script_for_key};
    use crate::types::{AddressKind, Hash256, Transaction, TxOut};

    pub fn key(n: u8) -> AddressKey {
        AddressKey::new([n; 20], AddressKind::PubKeyHash)
    }

    pub fn txid(n: u8) -> Txid {
        Hash256([n; 32])
    }

    /// Distinct txid for larger fixtures
    pub fn txid_n(n: u32) -> Txid {
        let mut bytes = [0xeeu8; 32];
        bytes[..4].copy_from_slice(&n.to_le_bytes());
        Hash256(bytes)
    }

    pub fn p2pkh_script(key: &AddressKey) -> Vec<u8> {
        script_for_key(key)
    }

    pub fn locked_script(lock_time: u32, key: &AddressKey) -> Vec<u8> {
        let mut script = lock_prefix(lock_time);
        script.extend(script_for_key(key));
        script
    }

    pub struct SnapshotBuilder {
        ledger: MemoryLedger,
    }

    impl Default for SnapshotBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SnapshotBuilder {
        pub fn new() -> Self {
            Self { ledger: MemoryLedger::default() }
        }

        pub fn tip(mut self, height: i32, median_time_past: Option<i64>) -> Self {
            self.ledger.tip_height = height;
            self.ledger.median_time_past = median_time_past;
            self
        }

        fn block_mut(&mut self, height: i32) -> &mut Block {
            let block = self.ledger.blocks.entry(height).or_insert_with(|| {
                let mut hash = [0u8; 32];
                hash[..4].copy_from_slice(&height.to_le_bytes());
                Arc::new(Block { height, hash: Hash256(hash), time: 0, transactions: Vec::new() })
            });
            Arc::make_mut(block)
        }

        fn tx_mut(&mut self, height: i32, txid: Txid) -> &mut Transaction {
            let block = self.block_mut(height);
            let pos = match block.transactions.iter().position(|tx| tx.txid == txid) {
                Some(pos) => pos,
                None => {
                    block.transactions.push(Transaction { txid, outputs: Vec::new() });
                    block.transactions.len() - 1
                }
            };
            &mut block.transactions[pos]
        }

        fn put_output(&mut self, height: i32, txid: Txid, index: u32, value: i64, script: Vec<u8>) {
            let outputs = &mut self.tx_mut(height, txid).outputs;
            let index = index as usize;
            if outputs.len() <= index {
                outputs.resize(index + 1, TxOut { value: 0, script_pubkey: Vec::new() });
            }
            outputs[index] = TxOut { value, script_pubkey: script };
        }

        /// Add a whole transaction to the block at `height`
        pub fn block_tx(mut self, height: i32, txid: Txid, outputs: Vec<(i64, Vec<u8>)>) -> Self {
            self.tx_mut(height, txid);
            for (index, (value, script)) in outputs.into_iter().enumerate() {
                self.put_output(height, txid, index as u32, value, script);
            }
            self
        }

        fn next_output_index(&mut self, height: i32, txid: Txid) -> u32 {
            let block = self.block_mut(height);
            block
                .find_transaction(&txid)
                .map(|tx| tx.outputs.len() as u32)
                .unwrap_or(0)
        }

        fn push_delta(&mut self, key: AddressKey, txid: Txid, height: i32, amount: i64) {
            self.ledger.addresses.entry(key).or_default().deltas.push(AddressIndexDelta {
                txid,
                block_height: height,
                spending: amount < 0,
                amount_satoshis: amount,
            });
        }

        /// Confirmed receive, backed by an output in the block
        pub fn receive(self, key: AddressKey, txid: Txid, height: i32, amount: i64) -> Self {
            self.receive_locked(key, txid, height, amount, 0)
        }

        pub fn receive_locked(mut self, key: AddressKey, txid: Txid, height: i32, amount: i64, lock: u32) -> Self {
            let index = self.next_output_index(height, txid);
            let script = if lock == 0 { p2pkh_script(&key) } else { locked_script(lock, &key) };
            self.put_output(height, txid, index, amount, script);
            self.push_delta(key, txid, height, amount);
            self
        }

        /// Confirmed spend (`amount` is the positive value spent)
        pub fn spend(mut self, key: AddressKey, txid: Txid, height: i32, amount: i64) -> Self {
            self.tx_mut(height, txid);
            self.push_delta(key, txid, height, -amount);
            self
        }

        /// Raw index delta without a backing block
        pub fn raw_delta(mut self, key: AddressKey, txid: Txid, height: i32, amount: i64) -> Self {
            self.push_delta(key, txid, height, amount);
            self
        }

        /// Unspent output, backed by an output in the block
        pub fn utxo(self, key: AddressKey, txid: Txid, index: u32, amount: i64, height: i32) -> Self {
            self.locked_utxo(key, txid, index, amount, height, 0)
        }

        pub fn locked_utxo(
            mut self,
            key: AddressKey,
            txid: Txid,
            index: u32,
            amount: i64,
            height: i32,
            lock: u32,
        ) -> Self {
            let script = if lock == 0 { p2pkh_script(&key) } else { locked_script(lock, &key) };
            self.put_output(height, txid, index, amount, script);
            self.ledger.addresses.entry(key).or_default().unspent.push(UnspentOutputRecord {
                txid,
                output_index: index,
                amount_satoshis: amount,
                block_height: height,
            });
            self
        }

        pub fn deposit(mut self, key: AddressKey, txid: Txid, height: i32, timestamp: i64, amount: i64) -> Self {
            self.ledger.addresses.entry(key).or_default().deposits.push(DepositRecord {
                txid,
                block_height: height,
                timestamp,
                amount_satoshis: amount,
            });
            self
        }

        pub fn mempool(mut self, key: AddressKey, delta: MempoolDelta) -> Self {
            self.ledger.mempool_deltas.entry(key).or_default().push(delta);
            self
        }

        /// Pending delta; spends get a synthetic previous output
        pub fn mempool_delta(self, key: AddressKey, txid: Txid, amount: i64, timestamp: i64) -> Self {
            let prevout = (amount < 0).then(|| OutPoint::new(Hash256([0xaa; 32]), 0));
            let delta = MempoolDelta {
                txid,
                index: 0,
                address_type: key.kind.index_type(),
                amount_satoshis: amount,
                timestamp,
                prevout,
            };
            self.mempool(key, delta)
        }

        pub fn mempool_spent(mut self, outpoint: OutPoint) -> Self {
            self.ledger.mempool_spent.insert(outpoint);
            self
        }

        pub fn instant(mut self, txid: Txid) -> Self {
            self.ledger.instant.insert(txid);
            self
        }

        pub fn build(mut self) -> MemoryLedger {
            self.ledger.sort_indexes();
            self.ledger
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::address::encode_address;
    use std::io::Write;

    #[test]
    fn test_unspent_slices_forward_and_reverse() {
        let owner = key(1);
        let mut builder = SnapshotBuilder::new().tip(100, None);
        for i in 0..5u8 {
            builder = builder.utxo(owner, txid(10 + i), 0, 100 * (i as i64 + 1), 10 + i as i32);
        }
        let ledger = builder.build();

        let (count, cursor) = ledger.unspent_count(&owner).unwrap();
        assert_eq!(count, 5);
        assert_eq!(cursor.last, Some(OutPoint::new(txid(14), 0)));

        let forward = ledger.unspent_slice(&owner, None, 1, 2, false).unwrap();
        assert_eq!(forward.iter().map(|u| u.block_height).collect::<Vec<_>>(), vec![11, 12]);

        let backward = ledger.unspent_slice(&owner, Some(&cursor), 0, 2, true).unwrap();
        assert_eq!(backward.iter().map(|u| u.block_height).collect::<Vec<_>>(), vec![14, 13]);

        let tail = ledger.unspent_slice(&owner, Some(&cursor), 4, 10, true).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].block_height, 10);
    }

    #[test]
    fn test_unknown_address_is_empty() {
        let ledger = SnapshotBuilder::new().build();
        assert!(ledger.index_deltas(&key(9)).unwrap().is_empty());
        assert_eq!(ledger.unspent_count(&key(9)).unwrap().0, 0);
        assert!(ledger.address_deltas(&key(9)).is_empty());
    }

    #[test]
    fn test_block_reads_are_counted() {
        let ledger = SnapshotBuilder::new().block_tx(3, txid(1), vec![]).build();
        assert!(ledger.read_block(3).is_ok());
        assert_eq!(ledger.read_block(4).unwrap_err(), SapiError::BlockNotFound(4));
        assert_eq!(ledger.block_reads(), 2);
    }

    #[test]
    fn test_deposit_span_and_slices() {
        let owner = key(2);
        let ledger = SnapshotBuilder::new()
            .deposit(owner, txid(3), 12, 300, 30)
            .deposit(owner, txid(1), 10, 100, 10)
            .deposit(owner, txid(2), 11, 200, 20)
            .deposit(owner, txid(4), 12, 300, 40)
            .build();

        let all = ledger.deposit_count(&owner, 0, 1_000).unwrap();
        assert_eq!(all, DepositSpan { count: 4, first_timestamp: 100, last_timestamp: 300 });
        let middle = ledger.deposit_count(&owner, 150, 300).unwrap();
        assert_eq!(middle, DepositSpan { count: 1, first_timestamp: 200, last_timestamp: 200 });
        assert_eq!(ledger.deposit_count(&owner, 400, 500).unwrap().count, 0);
        assert_eq!(ledger.deposit_count(&key(9), 0, 1_000).unwrap().count, 0);

        let forward = ledger.deposit_slice(&owner, 200, 0, 10, false).unwrap();
        assert_eq!(forward.iter().map(|d| d.txid).collect::<Vec<_>>(), vec![txid(2), txid(3), txid(4)]);

        let backward = ledger.deposit_slice(&owner, 200, 1, 10, true).unwrap();
        assert_eq!(backward.iter().map(|d| d.txid).collect::<Vec<_>>(), vec![txid(1)]);
    }

    #[test]
    fn test_output_less_transaction_is_stored() {
        let ledger = SnapshotBuilder::new().block_tx(7, txid(4), vec![]).build();
        let block = ledger.read_block(7).unwrap();
        let tx = block.find_transaction(&txid(4)).unwrap();
        assert!(tx.outputs.is_empty());
        assert!(block.find_transaction(&txid(5)).is_none());
    }

    #[test]
    fn test_load_snapshot_file() {
        let params = NetworkParams::default();
        let owner = key(5);
        let address = encode_address(&owner, &params);
        let tx = txid(3);

        let snapshot = serde_json::json!({
            "tipHeight": 120,
            "medianTimePast": 1_650_000_000i64,
            "blocks": [{
                "height": 100,
                "hash": txid(0xbb).to_hex(),
                "transactions": [{
                    "txid": tx.to_hex(),
                    "outputs": [{ "value": 500, "scriptPubkey": hex::encode(p2pkh_script(&owner)) }]
                }]
            }],
            "addresses": [{
                "address": address,
                "deltas": [{ "txid": tx.to_hex(), "blockHeight": 100, "amountSatoshis": 500 }],
                "unspent": [{ "txid": tx.to_hex(), "outputIndex": 0, "amountSatoshis": 500, "blockHeight": 100 }]
            }],
            "mempool": {
                "deltas": [{
                    "address": address,
                    "txid": txid(4).to_hex(),
                    "index": 0,
                    "addressType": 1,
                    "amountSatoshis": -200,
                    "timestamp": 1_650_000_100i64,
                    "prevout": { "txid": tx.to_hex(), "index": 0 }
                }],
                "spent": [{ "txid": tx.to_hex(), "index": 0 }],
                "instant": []
            }
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(snapshot.to_string().as_bytes()).unwrap();

        let ledger = MemoryLedger::load(file.path(), &params).unwrap();
        assert_eq!(ledger.height(), 120);
        assert_eq!(ledger.median_time_past(), Some(1_650_000_000));
        assert_eq!(ledger.index_deltas(&owner).unwrap().len(), 1);
        assert_eq!(ledger.unspent_count(&owner).unwrap().0, 1);
        assert!(ledger.is_spent(&OutPoint::new(tx, 0)));
        let pending = ledger.address_deltas(&owner);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].prevout, Some(OutPoint::new(tx, 0)));
        assert_eq!(ledger.read_block(100).unwrap().transactions[0].outputs[0].destination(), Some(owner));
    }

    #[test]
    fn test_load_rejects_bad_input() {
        let params = NetworkParams::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(MemoryLedger::load(file.path(), &params), Err(SnapshotError::Json(_))));

        let snapshot = LedgerSnapshot {
            addresses: vec![AddressSnapshot { address: "bogus".into(), ..Default::default() }],
            ..Default::default()
        };
        assert!(MemoryLedger::from_snapshot(snapshot, &params).is_err());

        let missing = Path::new("/nonexistent/snapshot.json");
        assert!(matches!(MemoryLedger::load(missing, &params), Err(SnapshotError::Io(_))));
    }
}

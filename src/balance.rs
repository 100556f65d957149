/// Address Balance Aggregation
///
/// Folds the confirmed address index and the mempool into one snapshot per
/// address:
///
/// - `received`: sum of positive deltas
/// - `balance`: sum of all deltas (received minus sent)
/// - `locked`: part of `received` still held by an output lock
/// - `unconfirmedDelta`: pending mempool change
///
/// Mempool deltas of instant-send locked transactions are final and fold into
/// `received`/`balance`; all other mempool deltas stay unconfirmed.
///
/// Bad addresses are recorded per address and the batch continues; the call
/// fails only when no address could be evaluated. Lookup failures while
/// evaluating locks abort the whole request.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::address::resolve_address_key;
use crate::cache::CachedChain;
use crate::error::{AddressError, SapiError};
use crate::ledger::Collaborators;
use crate::metrics;
use crate::telemetry::truncate_list;
use crate::timelock::TimeLockEvaluator;
use crate::types::{AddressKey, Txid};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub address: String,
    pub balance: i64,
    pub locked: i64,
    pub received: i64,
    pub unconfirmed_delta: i64,
}

impl BalanceSnapshot {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), ..Default::default() }
    }

    /// Total value that left the address
    pub fn sent(&self) -> i64 {
        self.received - self.balance
    }

    /// Balance that can be spent right now
    pub fn unlocked(&self) -> i64 {
        self.balance - self.locked
    }
}

/// Result of one balance batch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub snapshots: Vec<BalanceSnapshot>,
    /// Pending mempool change per transaction, summed over all addresses
    pub unconfirmed_by_tx: BTreeMap<Txid, i64>,
    /// Addresses that could not be evaluated
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AddressError>,
}

/// Compute balances for a batch of addresses.
///
/// Duplicate addresses are evaluated once; snapshots keep the order of first
/// appearance.
pub fn compute_balances(
    ctx: &Collaborators<'_>,
    block_cache_size: usize,
    addresses: &[String],
) -> Result<BalanceReport, SapiError> {
    metrics::BALANCE_QUERIES.inc();

    let chain = CachedChain::with_capacity(ctx.chain, block_cache_size);
    let ctx = ctx.with_chain(&chain);
    let locks = TimeLockEvaluator::new(ctx.chain, ctx.clock);

    let mut report = BalanceReport::default();
    let mut seen = HashSet::new();

    for address in addresses {
        if !seen.insert(address.as_str()) {
            continue;
        }

        let key = match resolve_address_key(address, ctx.network) {
            Ok(key) => key,
            Err(e) if e.is_per_address() => {
                warn!(address = %address, error = %e, "Skipping address in balance batch");
                metrics::increment_address_errors(e.code());
                report.errors.push(AddressError::new(address.clone(), e));
                continue;
            }
            Err(e) => return Err(e),
        };

        let snapshot = address_balance(&ctx, &locks, address, &key, &mut report.unconfirmed_by_tx)?;
        debug!(
            address = %address,
            balance = snapshot.balance,
            locked = snapshot.locked,
            unconfirmed = snapshot.unconfirmed_delta,
            "Address balance"
        );
        report.snapshots.push(snapshot);
    }

    if report.snapshots.is_empty() {
        let failed: Vec<&str> = report.errors.iter().map(|e| e.address.as_str()).collect();
        warn!(failed = %truncate_list(&failed, 5), "No address in batch could be evaluated");
        return Err(SapiError::AddressNotFound(report.errors));
    }

    let (hits, misses) = chain.stats();
    info!(
        addresses = report.snapshots.len(),
        errors = report.errors.len(),
        block_cache_hits = hits,
        block_cache_misses = misses,
        "Balance batch complete"
    );
    Ok(report)
}

fn address_balance(
    ctx: &Collaborators<'_>,
    locks: &TimeLockEvaluator<'_>,
    address: &str,
    key: &AddressKey,
    unconfirmed_by_tx: &mut BTreeMap<Txid, i64>,
) -> Result<BalanceSnapshot, SapiError> {
    let mut snapshot = BalanceSnapshot::new(address);

    for delta in ctx.index.index_deltas(key)? {
        if delta.amount_satoshis > 0 {
            if locks.is_time_locked(delta.block_height, &delta.txid, key)? {
                snapshot.locked += delta.amount_satoshis;
            }
            snapshot.received += delta.amount_satoshis;
        }
        snapshot.balance += delta.amount_satoshis;
    }

    for delta in ctx.mempool.address_deltas(key) {
        if ctx.mempool.is_instant_finalized(&delta.txid) {
            if delta.amount_satoshis > 0 {
                snapshot.received += delta.amount_satoshis;
            }
            snapshot.balance += delta.amount_satoshis;
        } else {
            *unconfirmed_by_tx.entry(delta.txid).or_insert(0) += delta.amount_satoshis;
            snapshot.unconfirmed_delta += delta.amount_satoshis;
        }
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{encode_address, NetworkParams};
    use crate::cache::DEFAULT_BLOCK_CACHE_SIZE;
    use crate::clock::SteppingClock;
    use crate::memory::fixtures::{key, txid, SnapshotBuilder};
    use crate::memory::MemoryLedger;

    fn run(ledger: &MemoryLedger, addresses: &[String]) -> Result<BalanceReport, SapiError> {
        let clock = SteppingClock::frozen();
        let params = NetworkParams::default();
        let ctx = Collaborators::from_ledger(ledger, &clock, &params);
        compute_balances(&ctx, DEFAULT_BLOCK_CACHE_SIZE, addresses)
    }

    fn addr(n: u8) -> String {
        encode_address(&key(n), &NetworkParams::default())
    }

    #[test]
    fn test_confirmed_plus_pending_spend() {
        let ledger = SnapshotBuilder::new()
            .tip(100, Some(1_650_000_000))
            .receive(key(1), txid(1), 50, 1_000)
            .mempool_delta(key(1), txid(2), -400, 1_650_000_010)
            .build();

        let report = run(&ledger, &[addr(1)]).unwrap();
        let snap = &report.snapshots[0];
        assert_eq!(snap.balance, 1_000);
        assert_eq!(snap.received, 1_000);
        assert_eq!(snap.locked, 0);
        assert_eq!(snap.unconfirmed_delta, -400);
        assert_eq!(report.unconfirmed_by_tx.get(&txid(2)), Some(&-400));
    }

    #[test]
    fn test_instant_send_folds_into_confirmed() {
        let ledger = SnapshotBuilder::new()
            .tip(100, None)
            .receive(key(1), txid(1), 50, 1_000)
            .spend(key(1), txid(3), 60, 300)
            .mempool_delta(key(1), txid(2), 250, 1)
            .mempool_delta(key(1), txid(4), -100, 2)
            .instant(txid(2))
            .instant(txid(4))
            .build();

        let report = run(&ledger, &[addr(1)]).unwrap();
        let snap = &report.snapshots[0];
        assert_eq!(snap.received, 1_250);
        assert_eq!(snap.balance, 1_000 - 300 + 250 - 100);
        assert_eq!(snap.sent(), 400);
        assert_eq!(snap.unconfirmed_delta, 0);
        assert!(report.unconfirmed_by_tx.is_empty());
    }

    #[test]
    fn test_locked_outputs_count_toward_balance() {
        let ledger = SnapshotBuilder::new()
            .tip(100, None)
            .receive(key(1), txid(1), 50, 1_000)
            .receive_locked(key(1), txid(2), 60, 700, 150)
            .receive_locked(key(1), txid(3), 61, 900, 80) // lock already passed
            .build();

        let snap = run(&ledger, &[addr(1)]).unwrap().snapshots.remove(0);
        assert_eq!(snap.balance, 2_600);
        assert_eq!(snap.locked, 700);
        assert_eq!(snap.unlocked(), 1_900);
    }

    #[test]
    fn test_batch_collects_bad_addresses() {
        let ledger = SnapshotBuilder::new()
            .tip(10, None)
            .receive(key(1), txid(1), 5, 10)
            .build();

        let report = run(&ledger, &["garbage".to_string(), addr(1), addr(2), addr(1)]).unwrap();
        assert_eq!(report.snapshots.len(), 2);
        assert_eq!(report.snapshots[0].balance, 10);
        // Unknown but valid address yields an empty snapshot
        assert_eq!(report.snapshots[1], BalanceSnapshot::new(addr(2)));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].address, "garbage");
    }

    #[test]
    fn test_failed_addresses_are_serialized() {
        let ledger = SnapshotBuilder::new()
            .tip(10, None)
            .receive(key(1), txid(1), 5, 10)
            .build();

        let report = run(&ledger, &["garbage".to_string(), addr(1)]).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["snapshots"][0]["address"], addr(1));
        assert_eq!(json["errors"][0]["address"], "garbage");
        assert_eq!(json["errors"][0]["code"], "InvalidAddress");
        assert!(json["errors"][0]["message"].as_str().unwrap().contains("garbage"));

        let clean = run(&ledger, &[addr(1)]).unwrap();
        assert!(serde_json::to_value(&clean).unwrap().get("errors").is_none());
    }

    #[test]
    fn test_all_bad_addresses_fail() {
        let ledger = SnapshotBuilder::new().build();
        match run(&ledger, &["x".to_string(), "y".to_string()]) {
            Err(SapiError::AddressNotFound(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(run(&ledger, &[]), Err(SapiError::AddressNotFound(e)) if e.is_empty()));
    }

    #[test]
    fn test_missing_block_is_fatal() {
        let ledger = SnapshotBuilder::new()
            .tip(10, None)
            .raw_delta(key(1), txid(1), 7, 500)
            .build();
        assert_eq!(run(&ledger, &[addr(1)]).unwrap_err(), SapiError::BlockNotFound(7));
    }

    #[test]
    fn test_balance_is_order_independent() {
        let forward = SnapshotBuilder::new()
            .tip(100, None)
            .receive(key(1), txid(1), 10, 100)
            .receive(key(1), txid(2), 11, 200)
            .spend(key(1), txid(3), 12, 50)
            .build();
        let shuffled = SnapshotBuilder::new()
            .tip(100, None)
            .spend(key(1), txid(3), 12, 50)
            .receive(key(1), txid(2), 11, 200)
            .receive(key(1), txid(1), 10, 100)
            .build();

        let a = run(&forward, &[addr(1)]).unwrap().snapshots.remove(0);
        let b = run(&shuffled, &[addr(1)]).unwrap().snapshots.remove(0);
        assert_eq!(a, b);
        assert_eq!(a.balance, 250);
    }

    #[test]
    fn test_serialized_field_names() {
        let snap = BalanceSnapshot { address: "S1".into(), unconfirmed_delta: -4, ..Default::default() };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["unconfirmedDelta"], -4);
        assert!(json.get("unconfirmed_delta").is_none());
    }
}

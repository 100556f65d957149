//! Paged unspent-output listing.
//!
//! Each output is tagged with whether a pending transaction already spends
//! it and whether its lock has expired.

use serde::Serialize;
use tracing::debug;

use crate::address::resolve_address_key;
use crate::cache::CachedChain;
use crate::constants::MAX_UNSPENT_PAGE_SIZE;
use crate::error::SapiError;
use crate::ledger::Collaborators;
use crate::paging::{check_page_number, check_page_size, page_count, page_window};
use crate::script::script_for_key;
use crate::timelock::TimeLockEvaluator;
use crate::types::{hex_bytes, Txid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentQuery {
    /// 1-based
    pub page_number: u64,
    pub page_size: u64,
    /// Oldest first when set, newest first otherwise
    pub ascending: bool,
}

impl Default for UnspentQuery {
    fn default() -> Self {
        Self { page_number: 1, page_size: 100, ascending: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentEntry {
    pub txid: Txid,
    pub index: u32,
    pub value: i64,
    pub height: i32,
    pub in_mempool: bool,
    pub spendable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentPage {
    pub count: u64,
    pub pages: u64,
    pub page: u64,
    pub block_height: i32,
    pub address: String,
    #[serde(with = "hex_bytes")]
    pub script: Vec<u8>,
    pub utxos: Vec<UnspentEntry>,
}

pub fn list_unspent(
    ctx: &Collaborators<'_>,
    address: &str,
    query: &UnspentQuery,
) -> Result<UnspentPage, SapiError> {
    check_page_size(query.page_size, MAX_UNSPENT_PAGE_SIZE)?;
    let key = resolve_address_key(address, ctx.network)?;

    let (count, cursor) = ctx.index.unspent_count(&key)?;
    if count == 0 {
        return Err(SapiError::NoUtxosAvailable);
    }

    let count = count as u64;
    let pages = page_count(count, query.page_size);
    check_page_number(query.page_number, pages)?;
    let window = page_window(count, query.page_number, query.page_size);

    let records = if query.ascending {
        ctx.index.unspent_slice(&key, None, window.start as usize, (window.end - window.start) as usize, false)?
    } else {
        ctx.index.unspent_slice(&key, Some(&cursor), window.start as usize, (window.end - window.start) as usize, true)?
    };

    let chain = CachedChain::new(ctx.chain);
    let locks = TimeLockEvaluator::new(&chain, ctx.clock);

    let mut utxos = Vec::with_capacity(records.len());
    for record in records {
        let locked = locks.is_time_locked(record.block_height, &record.txid, &key)?;
        utxos.push(UnspentEntry {
            txid: record.txid,
            index: record.output_index,
            value: record.amount_satoshis,
            height: record.block_height,
            in_mempool: ctx.mempool.is_spent(&record.outpoint()),
            spendable: !locked,
        });
    }

    debug!(address = %address, count, pages, page = query.page_number, "Unspent page");

    Ok(UnspentPage {
        count,
        pages,
        page: query.page_number,
        block_height: ctx.chain.height(),
        address: address.to_string(),
        script: script_for_key(&key),
        utxos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{encode_address, NetworkParams};
    use crate::clock::SteppingClock;
    use crate::memory::fixtures::{key, txid, SnapshotBuilder};
    use crate::memory::MemoryLedger;
    use crate::types::OutPoint;

    fn addr(n: u8) -> String {
        encode_address(&key(n), &NetworkParams::default())
    }

    fn list(ledger: &MemoryLedger, n: u8, query: &UnspentQuery) -> Result<UnspentPage, SapiError> {
        let clock = SteppingClock::frozen();
        let params = NetworkParams::default();
        let ctx = Collaborators::from_ledger(ledger, &clock, &params);
        list_unspent(&ctx, &addr(n), query)
    }

    fn ledger() -> MemoryLedger {
        SnapshotBuilder::new()
            .tip(100, None)
            .utxo(key(1), txid(1), 0, 100, 10)
            .utxo(key(1), txid(2), 1, 200, 20)
            .locked_utxo(key(1), txid(3), 0, 300, 30, 500)
            .utxo(key(1), txid(4), 0, 400, 40)
            .utxo(key(1), txid(5), 2, 500, 50)
            .mempool_spent(OutPoint::new(txid(2), 1))
            .build()
    }

    #[test]
    fn test_descending_pages() {
        let query = UnspentQuery { page_number: 1, page_size: 2, ascending: false };
        let page = list(&ledger(), 1, &query).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.block_height, 100);
        assert_eq!(page.utxos.iter().map(|u| u.height).collect::<Vec<_>>(), vec![50, 40]);

        let last = list(&ledger(), 1, &UnspentQuery { page_number: 3, ..query.clone() }).unwrap();
        assert_eq!(last.utxos.len(), 1);
        assert_eq!(last.utxos[0].height, 10);
    }

    #[test]
    fn test_flags() {
        let query = UnspentQuery { page_number: 1, page_size: 10, ascending: true };
        let page = list(&ledger(), 1, &query).unwrap();
        let flags: Vec<(bool, bool)> = page.utxos.iter().map(|u| (u.in_mempool, u.spendable)).collect();
        assert_eq!(
            flags,
            vec![(false, true), (true, true), (false, false), (false, true), (false, true)]
        );
        assert_eq!(page.script, script_for_key(&key(1)));

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["utxos"][1]["inMempool"], true);
        assert_eq!(json["blockHeight"], 100);
        assert!(json["script"].as_str().unwrap().starts_with("76a914"));
    }

    #[test]
    fn test_errors() {
        let ledger = ledger();
        assert_eq!(list(&ledger, 2, &UnspentQuery::default()), Err(SapiError::NoUtxosAvailable));
        assert_eq!(
            list(&ledger, 1, &UnspentQuery { page_number: 2, page_size: 5, ascending: true }),
            Err(SapiError::PageOutOfRange { page: 2, pages: 1 })
        );
        assert!(matches!(
            list(&ledger, 1, &UnspentQuery { page_number: 1, page_size: 1001, ascending: true }),
            Err(SapiError::InvalidParameter(_))
        ));
    }
}

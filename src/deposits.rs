//! Paged deposit listing.
//!
//! Deposits are the confirmed receipts of an address ordered by block time.
//! A listing covers one time range `[timestampFrom, timestampTo)` and pages
//! through it oldest or newest first.

use serde::Serialize;
use tracing::debug;

use crate::address::resolve_address_key;
use crate::constants::{DEFAULT_DEPOSIT_TIMESTAMP_TO, MAX_DEPOSIT_PAGE_SIZE};
use crate::error::SapiError;
use crate::ledger::Collaborators;
use crate::paging::{check_page_number, check_page_size, page_count, page_window};
use crate::types::Txid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositQuery {
    /// 1-based
    pub page_number: u64,
    pub page_size: u64,
    pub ascending: bool,
    /// Inclusive
    pub timestamp_from: i64,
    /// Exclusive
    pub timestamp_to: i64,
}

impl Default for DepositQuery {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: 100,
            ascending: false,
            timestamp_from: 0,
            timestamp_to: DEFAULT_DEPOSIT_TIMESTAMP_TO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositEntry {
    #[serde(rename = "txhash")]
    pub txid: Txid,
    pub block_height: i32,
    pub timestamp: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositPage {
    pub count: u64,
    pub pages: u64,
    pub page: u64,
    pub deposits: Vec<DepositEntry>,
}

pub fn list_deposits(
    ctx: &Collaborators<'_>,
    address: &str,
    query: &DepositQuery,
) -> Result<DepositPage, SapiError> {
    if query.timestamp_to <= query.timestamp_from {
        return Err(SapiError::InvalidParameter(format!(
            "timestampTo ({}) must be greater than timestampFrom ({})",
            query.timestamp_to, query.timestamp_from
        )));
    }
    check_page_size(query.page_size, MAX_DEPOSIT_PAGE_SIZE)?;
    let key = resolve_address_key(address, ctx.network)?;

    let span = ctx.deposits.deposit_count(&key, query.timestamp_from, query.timestamp_to)?;
    if span.count == 0 {
        return Err(SapiError::NoDepositAvailable);
    }

    let count = span.count as u64;
    let pages = page_count(count, query.page_size);
    check_page_number(query.page_number, pages)?;
    let window = page_window(count, query.page_number, query.page_size);

    let anchor = if query.ascending { span.first_timestamp } else { span.last_timestamp };
    let records = ctx.deposits.deposit_slice(
        &key,
        anchor,
        window.start as usize,
        (window.end - window.start) as usize,
        !query.ascending,
    )?;

    debug!(address = %address, count, pages, page = query.page_number, "Deposit page");

    Ok(DepositPage {
        count,
        pages,
        page: query.page_number,
        deposits: records
            .into_iter()
            .map(|d| DepositEntry {
                txid: d.txid,
                block_height: d.block_height,
                timestamp: d.timestamp,
                amount: d.amount_satoshis,
            })
            .collect(),
    })
}

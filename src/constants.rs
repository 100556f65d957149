/// Ledger and Query Constants
///
/// These constants pin the values shared by the time-lock evaluator, the
/// selection solver and the request validators. Runtime-tunable values have a
/// matching key in `EngineSettings`; the constants here are their defaults.

/// Lock values below this are block heights, values at or above are UNIX times
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Height reported for transactions that only exist in the mempool
pub const HEIGHT_MEMPOOL: i32 = -1;

/// Outputs fetched from the unspent index per round-trip during selection
pub const DEFAULT_SLICE_SIZE: usize = 2000;

/// Wall-clock budget for one selection call
pub const DEFAULT_SELECTION_TIMEOUT_MS: u64 = 5_000;

/// Confirmations an output needs before it may fund an instant-send payment
pub const INSTANTSEND_CONFIRMATIONS_REQUIRED: i32 = 6;

/// Page size bounds accepted by the unspent listing
pub const MAX_UNSPENT_PAGE_SIZE: u64 = 1000;

/// Page size bounds accepted by the transaction history
pub const MAX_HISTORY_PAGE_SIZE: u64 = 100;

/// Page size bounds accepted by the deposit listing
pub const MAX_DEPOSIT_PAGE_SIZE: u64 = 1000;

/// Upper end of the deposit time range when none is given
pub const DEFAULT_DEPOSIT_TIMESTAMP_TO: i64 = i32::MAX as i64;

/// Check if a height refers to a mined block
#[inline]
pub fn is_confirmed_height(height: i32) -> bool {
    height >= 0
}

/// Check if a lock value is interpreted as a block height
#[inline]
pub fn is_height_lock(lock_time: u32) -> bool {
    lock_time < LOCKTIME_THRESHOLD
}

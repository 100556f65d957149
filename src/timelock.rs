/// Output Lock Evaluation
///
/// Decides whether an output credited to an address is still locked by the
/// `<locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP` prefix of its script.
///
/// Lock semantics:
/// - lock value 0: no lock
/// - lock value < LOCKTIME_THRESHOLD: block height, locked while tip < value
/// - otherwise: UNIX time, locked while median-time-past < value
///   (the current wall-clock time is used when there is no tip)
///
/// Lookup failures (block missing, transaction missing from its block) are
/// errors; an output that does not pay to the address is reported unlocked.

use crate::clock::Clock;
use crate::constants::is_height_lock;
use crate::error::SapiError;
use crate::ledger::ChainView;
use crate::types::{AddressKey, Txid};

/// Check a lock value against chain state
///
/// # Arguments
/// * `lock_time` - Lock value decoded from the output script
/// * `chain_height` - Current tip height
/// * `reference_time` - Median time past of the tip, or the current time without a tip
pub fn lock_active(lock_time: u32, chain_height: i32, reference_time: i64) -> bool {
    if lock_time == 0 {
        return false;
    }
    if is_height_lock(lock_time) {
        (chain_height as i64) < lock_time as i64
    } else {
        reference_time < lock_time as i64
    }
}

/// Time-lock checks bound to one chain view
pub struct TimeLockEvaluator<'a> {
    chain: &'a dyn ChainView,
    clock: &'a dyn Clock,
}

impl<'a> TimeLockEvaluator<'a> {
    pub fn new(chain: &'a dyn ChainView, clock: &'a dyn Clock) -> Self {
        Self { chain, clock }
    }

    fn reference_time(&self) -> i64 {
        self.chain
            .median_time_past()
            .unwrap_or_else(|| self.clock.unix_time())
    }

    /// Check if the output of `txid` (mined at `block_height`) paying to
    /// `address` is still locked
    pub fn is_time_locked(
        &self,
        block_height: i32,
        txid: &Txid,
        address: &AddressKey,
    ) -> Result<bool, SapiError> {
        let block = self.chain.read_block(block_height)?;
        let tx = block
            .find_transaction(txid)
            .ok_or(SapiError::TransactionNotFound { txid: *txid, height: block_height })?;

        let Some(output) = tx
            .outputs
            .iter()
            .find(|out| out.destination().as_ref() == Some(address))
        else {
            return Ok(false);
        };

        Ok(lock_active(
            output.lock_time(),
            self.chain.height(),
            self.reference_time(),
        ))
    }
}

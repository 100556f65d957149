/// UTXO Selection
///
/// Picks unspent outputs of one address whose value covers a payment plus
/// the fee for spending them, under a wall-clock budget.
///
/// The unspent set is scanned in fixed-size slices, starting at a random
/// slice and wrapping around until every slice was visited once. Per slice:
///
/// 1. fetch the slice from the unspent index
/// 2. drop outputs whose lock has not expired, outputs already spent in the
///    mempool and, for instant-send payments, outputs with too few
///    confirmations
/// 3. order the rest with the policy
/// 4. walk them until the set covers the request, then let the policy decide
///    whether the set replaces the best one and whether the scan goes on
///
/// `SelectionPolicy` supplies the ordering and accept rules of that loop:
/// - `Random`: shuffle, carry the uncovered set across slices, accept the
///   first covering set
/// - `MinimalInputs`: walk the largest outputs seen so far and accept a
///   covering set only if it needs fewer inputs than the best one; the result
///   has the fewest inputs of any covering set within the scanned slices
///
/// The deadline is checked before every slice and on every walk step. Hitting
/// it returns the best solution found so far, if any.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::address::resolve_address_key;
use crate::amount::check_amount_range;
use crate::cache::CachedChain;
use crate::clock::Deadline;
use crate::config::EngineSettings;
use crate::error::SapiError;
use crate::fee::FeeSchedule;
use crate::ledger::Collaborators;
use crate::metrics;
use crate::paging::slice_bounds;
use crate::script::script_for_key;
use crate::telemetry::{truncate_hex, HASH_LOG_LEN};
use crate::timelock::TimeLockEvaluator;
use crate::types::{confirmations_at, hex_bytes, AddressKey, OutPoint, Txid, UnspentOutputRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    Random,
    MinimalInputs,
}

impl SelectionPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            SelectionPolicy::Random => "random",
            SelectionPolicy::MinimalInputs => "minimal",
        }
    }

    /// Walk order for one slice.
    ///
    /// `pool` holds the outputs `MinimalInputs` carries between slices and is
    /// updated in place.
    fn arrange<R: Rng + ?Sized>(
        &self,
        pool: &mut Vec<UnspentOutputRecord>,
        mut fresh: Vec<UnspentOutputRecord>,
        rng: &mut R,
    ) -> Vec<UnspentOutputRecord> {
        match self {
            SelectionPolicy::Random => {
                fresh.shuffle(rng);
                fresh
            }
            SelectionPolicy::MinimalInputs => {
                pool.extend(fresh);
                pool.sort_by(|a, b| {
                    b.amount_satoshis
                        .cmp(&a.amount_satoshis)
                        .then_with(|| a.outpoint().cmp(&b.outpoint()))
                });
                pool.dedup_by_key(|utxo| utxo.outpoint());
                pool.clone()
            }
        }
    }

    /// Set a slice walk starts from, given the uncovered set of the last walk
    fn seed(&self, carried: SelectionSolution) -> SelectionSolution {
        match self {
            SelectionPolicy::Random => carried,
            SelectionPolicy::MinimalInputs => SelectionSolution::default(),
        }
    }

    /// Whether a covering set replaces the best one so far
    fn improves(&self, candidate: &SelectionSolution, best: Option<&SelectionSolution>) -> bool {
        match self {
            SelectionPolicy::Random => true,
            SelectionPolicy::MinimalInputs => best.map_or(true, |b| candidate.len() < b.len()),
        }
    }

    fn stops_at_first(&self) -> bool {
        matches!(self, SelectionPolicy::Random)
    }

    /// Drop pooled outputs that can no longer improve `best`; false ends the scan
    fn prune(&self, pool: &mut Vec<UnspentOutputRecord>, best: Option<&SelectionSolution>) -> bool {
        match (self, best) {
            (SelectionPolicy::MinimalInputs, Some(b)) => {
                if b.len() <= 1 {
                    return false;
                }
                pool.truncate(b.len() - 1);
                true
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    /// Payment amount in satoshis, excluding fee
    pub amount: i64,
    pub random: bool,
    /// Only use outputs deep enough to fund an instant-send payment
    pub instant_pay_only: bool,
}

impl SelectionRequest {
    pub fn policy(&self) -> SelectionPolicy {
        if self.random {
            SelectionPolicy::Random
        } else {
            SelectionPolicy::MinimalInputs
        }
    }
}

/// Set of selected outputs with its fee and change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSolution {
    pub selected_utxos: Vec<UnspentOutputRecord>,
    pub total_amount: i64,
    pub fee: i64,
    pub change: i64,
    #[serde(skip)]
    outpoints: HashSet<OutPoint>,
}

impl SelectionSolution {
    /// Add an output, ignoring outputs already in the set
    pub fn add(&mut self, utxo: UnspentOutputRecord, schedule: &FeeSchedule) -> bool {
        if !self.outpoints.insert(utxo.outpoint()) {
            return false;
        }
        self.total_amount = self.total_amount.saturating_add(utxo.amount_satoshis);
        self.selected_utxos.push(utxo);
        self.fee = schedule.fee_for_inputs(self.selected_utxos.len());
        true
    }

    pub fn len(&self) -> usize {
        self.selected_utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected_utxos.is_empty()
    }

    /// Check if the set pays `requested` plus its own fee
    pub fn covers(&self, requested: i64) -> bool {
        !self.is_empty() && self.total_amount >= requested.saturating_add(self.fee)
    }

    fn settle(mut self, requested: i64) -> Self {
        self.change = self.total_amount - requested - self.fee;
        self
    }
}

#[derive(Debug, Default)]
struct ScanStats {
    slices: usize,
    timed_out: bool,
}

/// Select outputs of `address` covering `request.amount` plus fee
pub fn select_utxos(
    ctx: &Collaborators<'_>,
    settings: &EngineSettings,
    address: &str,
    request: &SelectionRequest,
) -> Result<SelectionSolution, SapiError> {
    select_utxos_with_rng(ctx, settings, address, request, &mut rand::thread_rng())
}

/// `select_utxos` with an explicit random source for the start slice and shuffles
pub fn select_utxos_with_rng<R: Rng + ?Sized>(
    ctx: &Collaborators<'_>,
    settings: &EngineSettings,
    address: &str,
    request: &SelectionRequest,
    rng: &mut R,
) -> Result<SelectionSolution, SapiError> {
    let timer = metrics::Timer::new();
    let policy = request.policy();
    let mut stats = ScanStats::default();

    let result = check_amount_range(request.amount)
        .and_then(|_| resolve_address_key(address, ctx.network))
        .and_then(|key| solve(ctx, settings, &key, request, policy, rng, &mut stats));

    let outcome = match &result {
        Ok(_) => "solved",
        Err(SapiError::BalanceInsufficient { .. }) => "insufficient",
        Err(SapiError::SelectionTimedOut { .. }) => "timed_out",
        Err(SapiError::NoUtxosAvailable) => "no_utxos",
        Err(_) => "error",
    };
    metrics::record_selection(policy.label(), outcome, stats.slices, timer.elapsed_secs());

    match &result {
        Ok(solution) => info!(
            address = %address,
            mode = policy.label(),
            requested = request.amount,
            inputs = solution.len(),
            total = solution.total_amount,
            fee = solution.fee,
            change = solution.change,
            slices = stats.slices,
            timed_out = stats.timed_out,
            "Selection complete"
        ),
        Err(SapiError::SelectionTimedOut { elapsed_ms }) => warn!(
            address = %address,
            mode = policy.label(),
            requested = request.amount,
            elapsed_ms,
            budget_ms = settings.selection_timeout.as_millis() as u64,
            slices = stats.slices,
            "Selection timed out without a solution"
        ),
        Err(e) => debug!(address = %address, error = %e, "Selection failed"),
    }

    result
}

fn solve<R: Rng + ?Sized>(
    ctx: &Collaborators<'_>,
    settings: &EngineSettings,
    key: &AddressKey,
    request: &SelectionRequest,
    policy: SelectionPolicy,
    rng: &mut R,
    stats: &mut ScanStats,
) -> Result<SelectionSolution, SapiError> {
    let deadline = Deadline::start(ctx.clock, settings.selection_timeout);

    let (count, _) = ctx.index.unspent_count(key)?;
    if count == 0 {
        return Err(SapiError::NoUtxosAvailable);
    }

    let slice_size = settings.slice_size.max(1);
    let slices = count.div_ceil(slice_size);
    let start = rng.gen_range(0..slices);
    let tip = ctx.chain.height();

    let chain = CachedChain::with_capacity(ctx.chain, settings.block_cache_size);
    let locks = TimeLockEvaluator::new(&chain, ctx.clock);

    let usable = |utxo: &UnspentOutputRecord| -> bool {
        if ctx.mempool.is_spent(&utxo.outpoint()) {
            return false;
        }
        !request.instant_pay_only
            || confirmations_at(tip, utxo.block_height) >= settings.instant_confirmations
    };

    // Uncovered set of the last walk, and the outputs carried between slices
    let mut carried = SelectionSolution::default();
    let mut pool: Vec<UnspentOutputRecord> = Vec::new();
    let mut best: Option<SelectionSolution> = None;

    'slices: for step in 0..slices {
        if deadline.expired() {
            stats.timed_out = true;
            break;
        }

        let slice = (start + step) % slices;
        let (offset, limit) = slice_bounds(count, slice, slice_size);
        let records = ctx.index.unspent_slice(key, None, offset, limit, false)?;
        stats.slices += 1;

        let mut fresh = Vec::with_capacity(records.len());
        for utxo in records {
            if !locks.is_time_locked(utxo.block_height, &utxo.txid, key)? && usable(&utxo) {
                fresh.push(utxo);
            }
        }

        debug!(slice, offset, fetched = limit, usable = fresh.len(), "Scanning unspent slice");

        let walk = policy.arrange(&mut pool, fresh, rng);
        let mut candidate = policy.seed(std::mem::take(&mut carried));
        let mut covered = false;
        for utxo in walk {
            if deadline.expired() {
                stats.timed_out = true;
                break 'slices;
            }
            candidate.add(utxo, &settings.fee);
            if candidate.covers(request.amount) {
                covered = true;
                break;
            }
        }

        if covered {
            if policy.improves(&candidate, best.as_ref()) {
                debug!(
                    inputs = candidate.len(),
                    largest = %truncate_hex(&candidate.selected_utxos[0].txid.to_hex(), HASH_LOG_LEN),
                    "Improved selection"
                );
                best = Some(candidate.settle(request.amount));
            }
            if policy.stops_at_first() {
                break;
            }
        } else {
            carried = candidate;
        }

        if !policy.prune(&mut pool, best.as_ref()) {
            break;
        }
    }

    match best {
        Some(solution) => Ok(solution),
        None if stats.timed_out => Err(SapiError::SelectionTimedOut {
            elapsed_ms: deadline.elapsed().as_millis() as u64,
        }),
        None => Err(SapiError::BalanceInsufficient { requested: request.amount }),
    }
}

/// One selected output as listed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedUtxo {
    pub txid: Txid,
    pub index: u32,
    pub confirmations: i32,
    pub amount: i64,
}

/// Presentation form of a solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub block_height: i32,
    #[serde(with = "hex_bytes")]
    pub script_pub_key: Vec<u8>,
    pub address: String,
    pub requested_amount: i64,
    pub final_amount: i64,
    pub fee: i64,
    pub change: i64,
    pub utxos: Vec<SelectedUtxo>,
}

impl SelectionReport {
    pub fn new(
        ctx: &Collaborators<'_>,
        address: &str,
        requested: i64,
        solution: &SelectionSolution,
    ) -> Result<Self, SapiError> {
        let key = resolve_address_key(address, ctx.network)?;
        let tip = ctx.chain.height();
        Ok(Self {
            block_height: tip,
            script_pub_key: script_for_key(&key),
            address: address.to_string(),
            requested_amount: requested,
            final_amount: solution.total_amount,
            fee: solution.fee,
            change: solution.change,
            utxos: solution
                .selected_utxos
                .iter()
                .map(|u| SelectedUtxo {
                    txid: u.txid,
                    index: u.output_index,
                    confirmations: confirmations_at(tip, u.block_height),
                    amount: u.amount_satoshis,
                })
                .collect(),
        })
    }
}

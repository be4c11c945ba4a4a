//! The three ways a cohort obtains its base primes (the primes up to the
//! square root of the limit) and applies them to its grids.

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, trace};

use crate::comm::WorkerContext;
use crate::error::{Result, SieveError};
use crate::grid::OddStore;
use crate::offset::odd_steps_past;
use crate::partition::Segment;
use crate::sieve::{BaseSieve, sieve_segment, sieve_segment_blocked};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// The root discovers each base prime and broadcasts it; every worker
    /// sieves its slice of [1, n] as the primes arrive.
    Broadcast,
    /// Every worker sieves [1, sqrt(n)] itself, then its slice of
    /// (sqrt(n), n] with no communication.
    Replicated,
    /// Every worker sieves [1, sqrt(n)] itself, then all of (sqrt(n), n]
    /// with every P-th base prime. Grids are OR-merged on the root.
    RoundRobin,
}

/// How per-worker outcomes combine into the run-wide count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    CountSum,
    BitmapOr,
}

impl Strategy {
    pub fn merge_policy(self) -> MergePolicy {
        match self {
            Strategy::Broadcast | Strategy::Replicated => MergePolicy::CountSum,
            Strategy::RoundRobin => MergePolicy::BitmapOr,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SieveParams {
    pub limit: u64,
    pub strategy: Strategy,
    /// Sieve the local segment in blocks of this many entries
    /// (replicated strategy only).
    pub block_len: Option<usize>,
}

/// A worker's state after it has finished marking.
#[derive(Debug)]
pub struct LocalOutcome {
    pub segment: Segment,
    pub grid: OddStore,
    /// Primes in `[2, sqrt(limit)]`, set on the root only, for strategies
    /// whose grids start above the square root.
    pub base_count: u64,
    pub sieving_primes: usize,
}

/// Discovers the base primes with the selected strategy and marks this
/// worker's grid with them.
pub fn sieve_local(ctx: &WorkerContext, params: &SieveParams) -> Result<LocalOutcome> {
    match params.strategy {
        Strategy::Broadcast => broadcast(ctx, params.limit),
        Strategy::Replicated => replicated(ctx, params.limit, params.block_len),
        Strategy::RoundRobin => round_robin(ctx, params.limit),
    }
}

fn broadcast(ctx: &WorkerContext, limit: u64) -> Result<LocalOutcome> {
    let root_n = limit.isqrt();
    let segment = Segment::for_rank(1, limit, ctx.rank, ctx.size);
    debug!(rank = ctx.rank, low = segment.low_value, high = segment.high_value, "segment");

    // Only the root's reach is checked: it must hold every base prime.
    ctx.comm.start(|| {
        if segment.is_empty() || segment.high_value < root_n {
            return Err(SieveError::PartitionPrecondition(format!(
                "the root's segment ends at {} but base primes run to {root_n}",
                segment.high_value
            )));
        }
        Ok(())
    })?;

    let mut grid = OddStore::allocate(&segment)?;
    let mut prime = 3;
    let mut index = 1;
    let mut rounds = 0;

    loop {
        if prime * prime <= segment.high_value {
            grid.mark_every(odd_steps_past(prime, segment.low_value), prime as usize);
        }
        rounds += 1;

        if ctx.is_root() {
            // Past the end of the grid the value exceeds the root's high
            // bound, which the start check put at or above sqrt(limit).
            index = grid.next_unmarked_after(index).unwrap_or(grid.len());
            prime = grid.value(index);
        }
        prime = ctx.comm.broadcast(prime)?;
        trace!(rank = ctx.rank, prime, "broadcast round");

        if prime > root_n {
            break;
        }
    }

    Ok(LocalOutcome {
        segment,
        grid,
        base_count: 0,
        sieving_primes: rounds,
    })
}

fn replicated(ctx: &WorkerContext, limit: u64, block_len: Option<usize>) -> Result<LocalOutcome> {
    let root_n = limit.isqrt();
    let segment = Segment::for_rank(root_n + 1, limit, ctx.rank, ctx.size);
    debug!(rank = ctx.rank, low = segment.low_value, high = segment.high_value, "segment");

    ctx.comm.start(|| {
        // Two values per worker keep every odd value in exactly one share.
        if ctx.size > 1 && limit - root_n < 2 * ctx.size as u64 {
            return Err(SieveError::PartitionPrecondition(format!(
                "{} values above sqrt(n) cannot be split across {} workers",
                limit - root_n,
                ctx.size
            )));
        }
        Ok(())
    })?;

    let base = BaseSieve::new(root_n)?;
    let mut grid = OddStore::allocate(&segment)?;

    match block_len {
        Some(block_len) => {
            sieve_segment_blocked(&mut grid, &base.primes, segment.high_value, block_len)
        }
        None => sieve_segment(&mut grid, &base.primes, segment.high_value),
    }

    let sieving_primes = base
        .primes
        .iter()
        .take_while(|&&p| p * p <= segment.high_value)
        .count();

    Ok(LocalOutcome {
        segment,
        grid,
        base_count: if ctx.is_root() { base.prime_count() } else { 0 },
        sieving_primes,
    })
}

fn round_robin(ctx: &WorkerContext, limit: u64) -> Result<LocalOutcome> {
    let root_n = limit.isqrt();
    // Work is split by prime, not by value: everyone holds the full range.
    let segment = Segment::for_rank(root_n + 1, limit, 0, 1);

    ctx.comm.start(|| Ok(()))?;

    let base = BaseSieve::new(root_n)?;
    let mut grid = OddStore::allocate(&segment)?;

    let share: Vec<u64> = base
        .primes
        .iter()
        .enumerate()
        .filter(|(ordinal, _)| ordinal % ctx.size == ctx.rank)
        .map(|(_, &prime)| prime)
        .collect();
    debug!(rank = ctx.rank, primes = share.len(), "round-robin share");

    sieve_segment(&mut grid, &share, segment.high_value);

    Ok(LocalOutcome {
        segment,
        grid,
        base_count: if ctx.is_root() { base.prime_count() } else { 0 },
        sieving_primes: share.len(),
    })
}

use serde::Serialize;

use crate::partition::Segment;
use crate::provider::Strategy;

/// One worker's share of the run, as printed and written to `workers.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub low: u64,
    pub high: u64,
    pub entries: usize,
    /// Unmarked entries in this worker's grid before any merge.
    pub local_count: u64,
    /// How many base primes this worker sieved with.
    pub sieving_primes: usize,
}

impl WorkerReport {
    pub fn new(rank: usize, segment: &Segment, local_count: u64, sieving_primes: usize) -> Self {
        Self {
            rank,
            low: segment.low_value,
            high: segment.high_value,
            entries: segment.entries,
            local_count,
            sieving_primes,
        }
    }
}

/// Run-wide result, assembled on the root once every worker has reported.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub limit: u64,
    pub workers: usize,
    pub strategy: Strategy,
    /// Primes in `[2, sqrt(limit)]` counted separately on the root; zero when
    /// the worker segments already cover that range.
    pub base_count: u64,
    pub total_primes: u64,
    pub elapsed_secs: f64,
    #[serde(skip)]
    pub reports: Vec<WorkerReport>,
}

impl RunSummary {
    pub fn new(limit: u64, workers: usize, strategy: Strategy) -> Self {
        Self {
            limit,
            workers,
            strategy,
            base_count: 0,
            total_primes: 0,
            elapsed_secs: 0.0,
            reports: Vec::with_capacity(workers),
        }
    }

    /// Folds one worker's count into the total.
    pub fn add_count(&mut self, count: u64) {
        self.total_primes += count;
    }

    pub fn add_base_count(&mut self, count: u64) {
        self.base_count += count;
        self.total_primes += count;
    }

    /// Primes found in the worker segments, after merging.
    pub fn segment_count(&self) -> u64 {
        self.total_primes - self.base_count
    }
}

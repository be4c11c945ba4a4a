use std::str::FromStr;

use clap::Parser;

use crate::error::{Result, SieveError};
use crate::provider::{SieveParams, Strategy};

/// L1 data cache size assumed when the host does not report one.
const FALLBACK_L1_BYTES: usize = 32 * 1024;

/// Largest accepted n. Every odd value, one-past-the-end value and sieving
/// offset below it fits in a u64 with room to spare.
pub const MAX_LIMIT: u64 = 1 << 62;

/// Largest accepted cohort. Each worker is an OS thread.
pub const MAX_WORKERS: usize = 4096;

/// Counts the primes in [2, n] with a cohort of cooperating sieve workers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The upper bound n of the range [2, n] to search for primes.
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    pub limit: u64,

    /// Number of cooperating workers. Defaults to the number of available CPUs.
    #[arg(short = 'p', long)]
    pub workers: Option<usize>,

    /// How the base primes up to sqrt(n) are discovered and shared.
    #[arg(short, long, value_enum, default_value_t = Strategy::Broadcast)]
    pub strategy: Strategy,

    /// Sieve each local segment in blocks of this many odd entries, or "auto"
    /// to size blocks to the L1 data cache. Replicated strategy only.
    #[arg(long)]
    pub block_len: Option<BlockLen>,

    /// Directory for workers.csv and summary.json.
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Show a progress bar while the root merges contributions.
    #[arg(long)]
    pub progress: bool,

    /// Re-count with a sequential sieve and fail on any mismatch.
    #[arg(long)]
    pub verify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLen {
    Auto,
    Entries(usize),
}

impl FromStr for BlockLen {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(BlockLen::Auto);
        }
        s.parse::<usize>()
            .map(BlockLen::Entries)
            .map_err(|_| format!("expected a number of entries or \"auto\", got {s:?}"))
    }
}

impl BlockLen {
    /// Entries per block. Each entry is one bit of the grid.
    pub fn entries(self) -> usize {
        match self {
            BlockLen::Entries(entries) => entries,
            BlockLen::Auto => cache_size::l1_cache_size().unwrap_or(FALLBACK_L1_BYTES) * 8,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.limit < 2 {
            return Err(SieveError::Argument(format!(
                "n must be >= 2, got {}",
                self.limit
            )));
        }
        if self.limit > MAX_LIMIT {
            return Err(SieveError::Argument(format!(
                "n must be <= {MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        match self.workers {
            Some(0) => return Err(SieveError::Argument("workers must be >= 1".into())),
            Some(workers) if workers > MAX_WORKERS => {
                return Err(SieveError::Argument(format!(
                    "workers must be <= {MAX_WORKERS}, got {workers}"
                )));
            }
            _ => {}
        }
        match self.block_len {
            Some(_) if self.strategy != Strategy::Replicated => Err(SieveError::Argument(
                "--block-len only applies to the replicated strategy".into(),
            )),
            Some(BlockLen::Entries(0)) => {
                Err(SieveError::Argument("--block-len must be >= 1".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().min(MAX_WORKERS))
                .unwrap_or(1)
        })
    }

    pub fn sieve_params(&self) -> SieveParams {
        SieveParams {
            limit: self.limit,
            strategy: self.strategy,
            block_len: self.block_len.map(BlockLen::entries),
        }
    }
}

use bitvec::prelude::*;
use tracing::trace;

use crate::error::Result;
use crate::grid::OddStore;
use crate::offset::odd_steps_past;
use crate::partition::Segment;

/// The odd values of `[1, limit]` sieved sequentially, with the odd primes
/// they contain.
#[derive(Debug, Clone)]
pub struct BaseSieve {
    pub grid: OddStore,
    pub primes: Vec<u64>,
}

impl BaseSieve {
    pub fn new(limit: u64) -> Result<Self> {
        let mut grid = OddStore::allocate(&Segment::spanning(1, limit))?;

        // Index 0 holds 1; sieving starts from 3.
        let mut index = 1;
        while index < grid.len() {
            let value = grid.value(index);
            if value * value > limit {
                break;
            }
            let square = grid.mapping().index(value * value);
            grid.mark_every(square, value as usize);
            match grid.next_unmarked_after(index) {
                Some(next) => index = next,
                None => break,
            }
        }

        let primes: Vec<u64> = grid.unmarked_values().skip(1).collect();
        trace!(limit, base_primes = primes.len(), "base sieve complete");

        Ok(Self { grid, primes })
    }

    /// Primes in `[2, limit]`. Value 1 is never marked and stands in for 2.
    pub fn prime_count(&self) -> u64 {
        self.grid.count_unmarked()
    }
}

/// Marks the odd multiples of every prime in `primes` whose square does not
/// exceed `high_value`, starting from each prime's square.
pub fn sieve_segment(grid: &mut OddStore, primes: &[u64], high_value: u64) {
    if grid.is_empty() {
        return;
    }
    let low_value = grid.mapping().base();
    for &prime in primes.iter().take_while(|&&p| p * p <= high_value) {
        let start = odd_steps_past(prime, low_value);
        grid.mark_every(start, prime as usize);
    }
}

/// Same result as [`sieve_segment`], visiting the grid in blocks of
/// `block_len` entries so each block stays resident in cache while every
/// relevant prime sweeps over it.
pub fn sieve_segment_blocked(
    grid: &mut OddStore,
    primes: &[u64],
    high_value: u64,
    block_len: usize,
) {
    let block_len = block_len.max(1);
    let mut block_start = 0;

    while block_start < grid.len() {
        let block_end = (block_start + block_len).min(grid.len());
        let block_low = grid.value(block_start);
        let block_high = grid.value(block_end - 1).min(high_value);

        for &prime in primes.iter().take_while(|&&p| p * p <= block_high) {
            let start = block_start + odd_steps_past(prime, block_low);
            grid.mark_every_before(start, block_end, prime as usize);
        }

        block_start = block_end;
    }
}

/// Prime count of `[2, limit]` from a plain sieve over every integer.
pub fn reference_count(limit: u64) -> u64 {
    if limit < 2 {
        return 0;
    }

    let mut sieve = bitvec![u8, Lsb0; 1; (limit + 1) as usize];
    sieve.set(0, false);
    sieve.set(1, false);

    for i in 2..=limit.isqrt() {
        if sieve[i as usize] {
            for j in (i * i..=limit).step_by(i as usize) {
                sieve.set(j as usize, false);
            }
        }
    }

    sieve.count_ones() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_count() {
        assert_eq!(reference_count(1), 0);
        assert_eq!(reference_count(2), 1);
        assert_eq!(reference_count(3), 2);
        assert_eq!(reference_count(100), 25);
        assert_eq!(reference_count(1_000), 168);
        assert_eq!(reference_count(1_000_000), 78_498);
    }

    #[test]
    fn test_base_sieve_primes() {
        let base = BaseSieve::new(31).unwrap();
        assert_eq!(base.primes, vec![3, 5, 7, 11, 13, 17, 19, 23, 29, 31]);
        assert_eq!(base.prime_count(), 11);

        let tiny = BaseSieve::new(1).unwrap();
        assert!(tiny.primes.is_empty());
        assert_eq!(tiny.prime_count(), 1);
    }

    #[test]
    fn test_base_sieve_counts_match_reference() {
        for limit in 1..=500 {
            assert_eq!(BaseSieve::new(limit).unwrap().prime_count(), reference_count(limit));
        }
    }

    #[test]
    fn test_sieve_segment_leaves_only_primes() {
        let base = BaseSieve::new(100).unwrap();
        let segment = Segment::spanning(9_001, 10_000);
        let mut grid = OddStore::allocate(&segment).unwrap();
        sieve_segment(&mut grid, &base.primes, segment.high_value);

        assert_eq!(
            grid.count_unmarked(),
            reference_count(10_000) - reference_count(9_000)
        );
        assert!(grid.unmarked_values().all(|v| (3..=v.isqrt()).all(|d| v % d != 0)));
    }

    #[test]
    fn test_blocked_matches_unblocked() {
        let base = BaseSieve::new(300).unwrap();
        let segment = Segment::spanning(17, 90_000);
        let mut plain = OddStore::allocate(&segment).unwrap();
        sieve_segment(&mut plain, &base.primes, segment.high_value);

        for block_len in [1, 7, 64, 1_000, 100_000] {
            let mut blocked = OddStore::allocate(&segment).unwrap();
            sieve_segment_blocked(&mut blocked, &base.primes, segment.high_value, block_len);
            assert_eq!(blocked, plain, "block_len={block_len}");
        }
    }
}

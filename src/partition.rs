//! Block decomposition of an index range across a fixed set of workers.
//!
//! Worker `r` of `p` owns indices `[r*m/p, (r+1)*m/p)`. Shares are contiguous,
//! never overlap, cover all `m` elements and differ in size by at most one.

use std::ops::Range;

/// First index owned by `rank`. Widened so `rank * len` cannot overflow.
pub fn block_low(rank: u64, workers: u64, len: u64) -> u64 {
    (rank as u128 * len as u128 / workers as u128) as u64
}

/// Last index owned by `rank`, or `None` when the share is empty.
pub fn block_high(rank: u64, workers: u64, len: u64) -> Option<u64> {
    block_low(rank + 1, workers, len)
        .checked_sub(1)
        .filter(|&high| high >= block_low(rank, workers, len))
}

/// Half-open index range owned by `rank`.
pub fn block_bounds(rank: u64, workers: u64, len: u64) -> Range<u64> {
    block_low(rank, workers, len)..block_low(rank + 1, workers, len)
}

/// Inverse of [`block_bounds`]: the rank owning `index`.
pub fn block_owner(index: u64, workers: u64, len: u64) -> u64 {
    ((workers as u128 * (index as u128 + 1) - 1) / len as u128) as u64
}

/// Translation between a compacted odd-only index and the integer it stands
/// for. All index/value arithmetic goes through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OddMapping {
    base: u64,
}

impl OddMapping {
    /// `base` must be odd: it is the value stored at index 0.
    pub fn new(base: u64) -> Self {
        debug_assert!(base % 2 == 1, "odd mapping base {base} is even");
        Self { base }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn value(&self, index: usize) -> u64 {
        self.base + 2 * index as u64
    }

    /// Index of the odd value `value`, which must be `>= base`.
    pub fn index(&self, value: u64) -> usize {
        ((value - self.base) / 2) as usize
    }
}

/// A worker's exclusive share of the odd integers in `[startval, endval]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Smallest odd value in the share.
    pub low_value: u64,
    /// Largest value in the share; may be even.
    pub high_value: u64,
    /// Number of odd values in `[low_value, high_value]`.
    pub entries: usize,
}

impl Segment {
    /// The share of worker `rank` out of `workers` over `[startval, endval]`.
    /// `startval` must be at least 1.
    pub fn for_rank(startval: u64, endval: u64, rank: usize, workers: usize) -> Self {
        debug_assert!(startval >= 1 && endval < u64::MAX);
        let len = endval.checked_sub(startval).map_or(0, |span| span + 1);
        let (rank, workers) = (rank as u64, workers as u64);

        let start = block_low(rank, workers, len);
        let mut low_value = startval + start;
        if low_value % 2 == 0 {
            low_value += 1;
        }
        let high_value = match block_high(rank, workers, len) {
            Some(high) => {
                debug_assert_eq!(block_owner(start, workers, len), rank);
                startval + high
            }
            // Empty share: one below its would-be first value.
            None => startval + start - 1,
        };

        Self::spanning(low_value, high_value)
    }

    /// The odd values of `[low_value, high_value]`; `low_value` must be odd.
    pub fn spanning(low_value: u64, high_value: u64) -> Self {
        let entries = if high_value >= low_value {
            ((high_value - low_value) / 2 + 1) as usize
        } else {
            0
        };
        Self {
            low_value,
            high_value,
            entries,
        }
    }

    pub fn mapping(&self) -> OddMapping {
        OddMapping::new(self.low_value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_size(rank: u64, workers: u64, len: u64) -> u64 {
        block_low(rank + 1, workers, len) - block_low(rank, workers, len)
    }

    fn odd_count(low: u64, high: u64) -> u64 {
        if high < low {
            return 0;
        }
        (high + 1) / 2 - low / 2
    }

    #[test]
    fn test_blocks_cover_range_without_overlap() {
        for len in 1..=60u64 {
            for workers in 1..=12u64 {
                let mut next = 0;
                let mut sizes = Vec::new();
                for rank in 0..workers {
                    let bounds = block_bounds(rank, workers, len);
                    assert_eq!(bounds.start, next, "len={len} workers={workers}");
                    next = bounds.end;
                    sizes.push(block_size(rank, workers, len));
                    for index in bounds {
                        assert_eq!(block_owner(index, workers, len), rank);
                    }
                }
                assert_eq!(next, len);
                let max = sizes.iter().max().unwrap();
                let min = sizes.iter().min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_block_high_is_followed_by_next_low() {
        let (workers, len) = (7, 100);
        for rank in 0..workers - 1 {
            let high = block_high(rank, workers, len).unwrap();
            assert_eq!(high + 1, block_low(rank + 1, workers, len));
            assert_eq!(block_owner(block_low(rank, workers, len), workers, len), rank);
        }
        assert_eq!(block_high(0, 4, 2), None);
    }

    #[test]
    fn test_segment_sizes_sum_to_odd_count() {
        for n in 2..=300u64 {
            for workers in 1..=9usize {
                for startval in [1, 2, 3, 10] {
                    if startval > n {
                        continue;
                    }
                    let total: usize = (0..workers)
                        .map(|rank| Segment::for_rank(startval, n, rank, workers).entries)
                        .sum();
                    assert_eq!(
                        total as u64,
                        odd_count(startval, n),
                        "n={n} workers={workers} startval={startval}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_segments_are_disjoint_and_ordered() {
        let workers = 5;
        let segments: Vec<_> = (0..workers)
            .map(|rank| Segment::for_rank(32, 1000, rank, workers))
            .collect();
        assert_eq!(segments[0].low_value, 33);
        for pair in segments.windows(2) {
            let last = pair[0].mapping().value(pair[0].entries - 1);
            assert!(last <= pair[0].high_value);
            assert_eq!(last + 2, pair[1].low_value);
        }
        assert_eq!(segments[4].high_value, 1000);
    }

    #[test]
    fn test_single_even_share_is_empty() {
        // Three values over three workers: the middle share is just {2}.
        let segment = Segment::for_rank(1, 3, 1, 3);
        assert_eq!(segment.low_value, 3);
        assert_eq!(segment.high_value, 2);
        assert!(segment.is_empty());
    }

    #[test]
    fn test_huge_ranges_do_not_overflow() {
        let workers = 8;
        for endval in [1u64 << 62, u64::MAX / 2, u64::MAX - 1] {
            let segments: Vec<_> = (0..workers)
                .map(|rank| Segment::for_rank(1, endval, rank, workers))
                .collect();
            let total: u128 = segments.iter().map(|s| s.entries as u128).sum();
            assert_eq!(total, odd_count(1, endval) as u128, "endval={endval}");
            assert_eq!(segments[0].low_value, 1);
            assert_eq!(segments[7].high_value, endval);
            for pair in segments.windows(2) {
                assert!(pair[0].high_value < pair[1].low_value);
            }
        }

        let len = u64::MAX;
        assert_eq!(block_low(7, 8, len), len / 8 * 7 + 7 * (len % 8) / 8);
        assert_eq!(block_owner(len - 1, 8, len), 7);
        assert_eq!(block_owner(block_low(3, 8, len), 8, len), 3);
    }

    #[test]
    fn test_mapping_round_trip() {
        let mapping = OddMapping::new(101);
        assert_eq!(mapping.value(0), 101);
        assert_eq!(mapping.value(7), 115);
        assert_eq!(mapping.index(115), 7);
    }
}

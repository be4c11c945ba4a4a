use bitvec::prelude::*;
use rayon::prelude::*;

use crate::error::{Result, SieveError};
use crate::partition::{OddMapping, Segment};

/// Mark grid over the odd values of one segment. A clear bit means no factor
/// has been found yet; a set bit means composite. Bits are only ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OddStore {
    mapping: OddMapping,
    marks: BitVec<u64, Lsb0>,
}

impl OddStore {
    /// Allocates an all-clear grid with one entry per odd value of `segment`.
    pub fn allocate(segment: &Segment) -> Result<Self> {
        let entries = segment.entries;
        let words = entries.div_ceil(u64::BITS as usize);

        let mut raw: Vec<u64> = Vec::new();
        raw.try_reserve_exact(words)
            .map_err(|_| SieveError::Allocation { entries })?;
        raw.resize(words, 0);

        let mut marks = BitVec::from_vec(raw);
        marks.truncate(entries);

        Ok(Self {
            mapping: segment.mapping(),
            marks,
        })
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn mapping(&self) -> OddMapping {
        self.mapping
    }

    /// Value of the odd integer stored at `index`.
    pub fn value(&self, index: usize) -> u64 {
        self.mapping.value(index)
    }

    pub fn mark(&mut self, index: usize) {
        self.marks.set(index, true);
    }

    /// Marks every `step`-th entry starting at `start`. Stepping by an odd
    /// prime in compacted space skips its even multiples.
    pub fn mark_every(&mut self, start: usize, step: usize) {
        self.mark_every_before(start, self.marks.len(), step);
    }

    /// Like [`OddStore::mark_every`], stopping before index `end`.
    pub fn mark_every_before(&mut self, start: usize, end: usize, step: usize) {
        let end = end.min(self.marks.len());
        let mut index = start;
        while index < end {
            self.mark(index);
            index += step;
        }
    }

    /// First clear index strictly after `index`, if any.
    pub fn next_unmarked_after(&self, index: usize) -> Option<usize> {
        let from = index + 1;
        if from >= self.marks.len() {
            return None;
        }
        self.marks[from..].first_zero().map(|offset| from + offset)
    }

    pub fn count_unmarked(&self) -> u64 {
        self.marks.count_zeros() as u64
    }

    /// Values of every clear entry, in increasing order.
    pub fn unmarked_values(&self) -> impl Iterator<Item = u64> + '_ {
        self.marks.iter_zeros().map(|index| self.mapping.value(index))
    }

    /// Element-wise OR of `other` into `self`. Both grids must describe the
    /// same values.
    pub fn or_assign(&mut self, other: &OddStore) {
        assert_eq!(self.mapping, other.mapping, "merging grids with different bases");
        assert_eq!(self.len(), other.len(), "merging grids of different lengths");

        // Bits past `len` are zero in both vectors, so OR-ing whole words is exact.
        self.marks
            .as_raw_mut_slice()
            .par_iter_mut()
            .zip(other.marks.as_raw_slice().par_iter())
            .for_each(|(mine, theirs)| *mine |= *theirs);
    }
}

#[cfg(test)]
impl OddStore {
    pub fn is_marked(&self, index: usize) -> bool {
        self.marks[index]
    }
}

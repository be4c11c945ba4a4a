/// Number of odd steps from `bnd` to the first odd multiple of `m` that is at
/// least `m * m` and at least `bnd`. Returns 0 when `bnd` itself qualifies.
///
/// `m` must be odd and `m * m` must fit in a `u64`. `bnd` is expected to be
/// odd, as every segment starts on an odd value.
pub fn odd_steps_past(m: u64, bnd: u64) -> usize {
    let quot = bnd / m;

    let steps = if quot < m {
        (m * m - bnd) / 2
    } else if quot % 2 == 1 {
        match quot * m {
            candidate if candidate == bnd => 0,
            candidate => (candidate + 2 * m - bnd) / 2,
        }
    } else {
        ((quot + 1) * m - bnd) / 2
    };

    steps as usize
}

//!
//! Peak-pattern primitives in the log domain
//!
//! Duals of `pattern::linear` over a matrix of log-probabilities. Sums use
//! log-add and complements use log-subtract (`Prob`), so no partial result
//! is exponentiated before it is combined.
//!
use super::matrix::PositionMatrix;
use crate::prob::{lp, Prob};

#[inline]
fn peak(x: &PositionMatrix, i: usize, j: usize) -> Prob {
    lp(x.peak(i, j))
}

#[inline]
fn nopeak(x: &PositionMatrix, i: usize, j: usize) -> Prob {
    lp(x.nopeak(i, j))
}

pub fn peak_at(x: &PositionMatrix, i: usize, j: usize) -> Prob {
    peak(x, i, j)
}

pub fn nopeak_at(x: &PositionMatrix, i: usize, j: usize) -> Prob {
    nopeak(x, i, j)
}

pub fn peak_at_center(x: &PositionMatrix, i: usize) -> Prob {
    peak(x, i, x.center())
}

pub fn nopeak_at_center(x: &PositionMatrix, i: usize) -> Prob {
    nopeak(x, i, x.center())
}

///
/// log P(at least one peak in `from..to`), summing the log-probabilities
/// of the first peak being at each column.
///
pub fn peak_range(x: &PositionMatrix, i: usize, from: usize, to: usize) -> Prob {
    let mut none_before = Prob::one();
    let mut r = Prob::zero();
    for j in from..to {
        r += none_before * peak(x, i, j);
        none_before *= nopeak(x, i, j);
    }
    r
}

pub fn nopeak_range(x: &PositionMatrix, i: usize, from: usize, to: usize) -> Prob {
    (from..to).map(|j| nopeak(x, i, j)).product()
}

pub fn peak_any(x: &PositionMatrix, i: usize) -> Prob {
    peak_range(x, i, 0, x.n_cols())
}

pub fn peak_all(x: &PositionMatrix, i: usize) -> Prob {
    (0..x.n_cols()).map(|j| peak(x, i, j)).product()
}

pub fn nopeak_all(x: &PositionMatrix, i: usize) -> Prob {
    nopeak_range(x, i, 0, x.n_cols())
}

///
/// Symmetric island score starting at half-width `k_min`.
///
/// Walks the pairs `(k, n - 1 - k)` for `k_min <= k` while `k <= n - 1 - k`.
/// A pair contributes `P(peak at both ends)` times the probability that no
/// earlier pair did; "not both ends" is `q1 + p1 * q2`, read from the
/// no-peak rows. Pairs narrower than `min_width` are skipped.
///
pub fn peak_sym_from(x: &PositionMatrix, i: usize, k_min: usize, min_width: usize) -> Prob {
    let n = x.n_cols();
    let mut no_pair_before = Prob::one();
    let mut r = Prob::zero();
    let mut k = k_min;
    while 2 * k + 1 <= n {
        let (j1, j2) = (k, n - 1 - k);
        if j2 - j1 + 1 >= min_width {
            let (pair, not_pair) = if j1 == j2 {
                (peak(x, i, j1), nopeak(x, i, j1))
            } else {
                (
                    peak(x, i, j1) * peak(x, i, j2),
                    nopeak(x, i, j1) + peak(x, i, j1) * nopeak(x, i, j2),
                )
            };
            r += no_pair_before * pair;
            no_pair_before *= not_pair;
        }
        k += 1;
    }
    r
}

pub fn peak_sym(x: &PositionMatrix, i: usize, min_width: usize) -> Prob {
    peak_sym_from(x, i, 0, min_width)
}

/// `sum_j log(p_j + q_j)`
pub fn nil(x: &PositionMatrix, i: usize) -> Prob {
    (0..x.n_cols())
        .map(|j| peak(x, i, j) + nopeak(x, i, j))
        .product()
}

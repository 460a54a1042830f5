//!
//! Peak-pattern primitives in the probability domain
//!
//! Every function takes the matrix and the peak-row offset `i` of one mark
//! (`Feature::row`). Results are probabilities; composite scores are checked
//! with `check_prob`.
//!
use super::matrix::PositionMatrix;
use crate::error::{Error, Result};

/// rounding slack above 1.0 that is clamped instead of rejected
pub const PROB_TOLERANCE: f64 = 1e-8;

///
/// Clamp rounding overshoot into `[0, 1]`; anything beyond the tolerance
/// (or NaN) is an internal consistency fault.
///
pub fn check_prob(value: f64) -> Result<f64> {
    if value.is_nan() {
        Err(Error::NotANumber("probability-domain score".to_string()))
    } else if value > 1.0 + PROB_TOLERANCE {
        Err(Error::ProbabilityOvershoot { value })
    } else if value > 1.0 {
        Ok(1.0)
    } else {
        Ok(value.max(0.0))
    }
}

pub fn peak_at(x: &PositionMatrix, i: usize, j: usize) -> f64 {
    x.peak(i, j)
}

pub fn nopeak_at(x: &PositionMatrix, i: usize, j: usize) -> f64 {
    x.nopeak(i, j)
}

pub fn peak_at_center(x: &PositionMatrix, i: usize) -> f64 {
    x.peak(i, x.center())
}

pub fn nopeak_at_center(x: &PositionMatrix, i: usize) -> f64 {
    x.nopeak(i, x.center())
}

///
/// Probability of at least one peak in columns `from..to`
///
/// Accumulates `P(first peak at j) = P(no peak before j) * p_j`, keeping
/// the running no-peak product instead of recomputing it.
///
pub fn peak_range(x: &PositionMatrix, i: usize, from: usize, to: usize) -> f64 {
    let mut none_before = 1.0;
    let mut r = 0.0;
    for j in from..to {
        r += none_before * x.peak(i, j);
        none_before *= x.nopeak(i, j);
    }
    r
}

///
/// Probability of no peak in columns `from..to`
///
pub fn nopeak_range(x: &PositionMatrix, i: usize, from: usize, to: usize) -> f64 {
    (from..to).map(|j| x.nopeak(i, j)).product()
}

/// `1 - prod(1 - p_j)` over the whole window
pub fn peak_any(x: &PositionMatrix, i: usize) -> f64 {
    peak_range(x, i, 0, x.n_cols())
}

/// peak at every column
pub fn peak_all(x: &PositionMatrix, i: usize) -> f64 {
    (0..x.n_cols()).map(|j| x.peak(i, j)).product()
}

/// no peak at any column
pub fn nopeak_all(x: &PositionMatrix, i: usize) -> f64 {
    nopeak_range(x, i, 0, x.n_cols())
}

///
/// Symmetric enrichment island around the center.
///
/// Half-widths `k = 0, 1, ...` pair the columns `k` and `n - 1 - k` (one
/// column for the center of an odd window). Pairs whose span is shorter
/// than `min_width` are skipped. The score is the probability that at
/// least one considered pair carries a peak on both ends, accumulated as
/// `r <- r + (1 - r) * P(pair)`.
///
pub fn peak_sym(x: &PositionMatrix, i: usize, min_width: usize) -> Result<f64> {
    let n = x.n_cols();
    let mut r = 0.0;
    for k in 0..(n + 1) / 2 {
        let (j1, j2) = (k, n - 1 - k);
        if j2 - j1 + 1 < min_width {
            continue;
        }
        let pair = if j1 == j2 {
            x.peak(i, j1)
        } else {
            x.peak(i, j1) * x.peak(i, j2)
        };
        r += (1.0 - r) * pair;
    }
    check_prob(r)
}

///
/// Mark marginalized out: `prod(p_j + q_j)`, which is 1 for a
/// normalized matrix.
///
pub fn nil(x: &PositionMatrix, i: usize) -> f64 {
    (0..x.n_cols())
        .map(|j| x.peak(i, j) + x.nopeak(i, j))
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use test_case::test_case;

    fn matrix(peaks: &[f64]) -> PositionMatrix {
        let nopeaks: Vec<f64> = peaks.iter().map(|p| 1.0 - p).collect();
        PositionMatrix::from_rows(&[peaks.to_vec(), nopeaks]).unwrap()
    }

    fn random_matrix(rng: &mut Xoshiro256PlusPlus, n: usize) -> PositionMatrix {
        let peaks: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        matrix(&peaks)
    }

    #[test_case(&[0.7, 0.4, 0.8], 0.736, 1e-2 ; "three columns")]
    #[test_case(&[0.7, 0.4, 0.8, 0.3], 0.4628, 1e-3 ; "four columns")]
    #[test_case(&[0.7, 0.4, 0.8, 0.3, 0.1], 0.83632, 1e-4 ; "five columns")]
    fn peak_sym_vectors(peaks: &[f64], expected: f64, tolerance: f64) {
        let x = matrix(peaks);
        assert_abs_diff_eq!(peak_sym(&x, 0, 0).unwrap(), expected, epsilon = tolerance);
    }
    #[test]
    fn peak_sym_min_width() {
        let x = matrix(&[0.7, 0.4, 0.8, 0.3, 0.1]);
        // only the full-width pair (0, 4) spans 5 columns
        assert_abs_diff_eq!(peak_sym(&x, 0, 5).unwrap(), 0.07, epsilon = 1e-12);
        // pairs (0, 4) and (1, 3)
        assert_abs_diff_eq!(
            peak_sym(&x, 0, 2).unwrap(),
            1.0 - 0.93 * 0.88,
            epsilon = 1e-12
        );
        assert_eq!(peak_sym(&x, 0, 6).unwrap(), 0.0);
    }
    #[test]
    fn peak_sym_stays_in_unit_interval() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        for n in 1..12 {
            for _ in 0..50 {
                let x = random_matrix(&mut rng, n);
                let r = peak_sym(&x, 0, 0).unwrap();
                assert!((0.0..=1.0 + PROB_TOLERANCE).contains(&r));
            }
        }
        let ones = matrix(&[1.0; 7]);
        assert_abs_diff_eq!(peak_sym(&ones, 0, 0).unwrap(), 1.0);
    }
    #[test]
    fn peak_any_is_complement_of_nopeak_all() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for n in 1..12 {
            let x = random_matrix(&mut rng, n);
            assert_abs_diff_eq!(peak_any(&x, 0), 1.0 - nopeak_all(&x, 0), epsilon = 1e-12);
        }
    }
    #[test]
    fn single_columns_and_ranges() {
        let x = matrix(&[0.7, 0.4, 0.8]);
        assert_eq!(peak_at_center(&x, 0), 0.4);
        assert_abs_diff_eq!(nopeak_at_center(&x, 0), 0.6);
        assert_eq!(peak_at(&x, 0, 2), 0.8);
        assert_abs_diff_eq!(nopeak_at(&x, 0, 0), 0.3);
        assert_abs_diff_eq!(peak_range(&x, 0, 1, 3), 1.0 - 0.6 * 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(nopeak_range(&x, 0, 0, 2), 0.3 * 0.6, epsilon = 1e-12);
        assert_eq!(peak_range(&x, 0, 1, 1), 0.0);
        assert_eq!(nopeak_range(&x, 0, 1, 1), 1.0);
        assert_abs_diff_eq!(peak_all(&x, 0), 0.7 * 0.4 * 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(nil(&x, 0), 1.0, epsilon = 1e-12);
    }
    #[test]
    fn overshoot_policy() {
        assert_eq!(check_prob(1.0 + 1e-10).unwrap(), 1.0);
        assert_eq!(check_prob(0.25).unwrap(), 0.25);
        assert!(matches!(
            check_prob(1.0 + 1e-6),
            Err(Error::ProbabilityOvershoot { .. })
        ));
        assert!(matches!(check_prob(f64::NAN), Err(Error::NotANumber(_))));
    }
}

//!
//! probability calculation in log space
//! implements logaddexp and logsubexp
//!
use approx::AbsDiffEq;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::str::FromStr;

///
/// Wrapper of f64 that represents probability `0 <= p <= 1`
/// by its natural logarithm.
///
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, SerializeDisplay, DeserializeFromStr)]
pub struct Prob(f64);

///
/// short-hand of `Prob::from_prob`
///
pub fn p(p: f64) -> Prob {
    Prob::from_prob(p)
}

///
/// short-hand of `Prob::from_log_prob`
///
pub fn lp(lp: f64) -> Prob {
    Prob::from_log_prob(lp)
}

///
/// `log(1 - exp(x))` for `x <= 0`
///
/// Uses `expm1` near zero and `ln_1p` elsewhere, so that neither branch
/// loses precision (Mächler 2012).
///
pub fn ln_1m_exp(x: f64) -> f64 {
    if x > -std::f64::consts::LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

impl Prob {
    pub fn from_prob(value: f64) -> Prob {
        Prob(value.ln())
    }
    pub fn from_log_prob(log_value: f64) -> Prob {
        Prob(log_value)
    }
    ///
    /// Get the probability (in `[0, 1]`)
    pub fn to_value(self) -> f64 {
        self.0.exp()
    }
    ///
    /// Get the log probability
    pub fn to_log_value(self) -> f64 {
        self.0
    }
    ///
    /// Is `p == 0` or not? (log p = -inf)
    ///
    pub fn is_zero(self) -> bool {
        self.0.is_infinite() && self.0.is_sign_negative()
    }
    ///
    /// Is `p == 1`? (log p = 0)
    ///
    pub fn is_one(self) -> bool {
        self.0 == 0.0
    }
    pub fn is_nan(self) -> bool {
        self.0.is_nan()
    }
    ///
    /// prob=0.0
    ///
    pub fn zero() -> Prob {
        Prob(f64::NEG_INFINITY)
    }
    ///
    /// prob=1.0
    ///
    pub fn one() -> Prob {
        Prob(0.0)
    }
    ///
    /// Subtraction `px - py` in log space, for `px >= py`.
    ///
    /// ```text
    /// log(exp(x) - exp(y))
    ///  = x + log(1 - exp(y-x))
    /// ```
    ///
    /// Rounding may make `py` slightly larger than `px`; the difference is
    /// then treated as zero.
    ///
    pub fn sub(self, other: Prob) -> Prob {
        let x = self.0;
        let y = other.0;
        if y == f64::NEG_INFINITY {
            Prob(x)
        } else if y >= x {
            Prob::zero()
        } else {
            Prob(x + ln_1m_exp(y - x))
        }
    }
    ///
    /// `1 - p` in log space
    ///
    pub fn complement(self) -> Prob {
        Prob::one().sub(self)
    }
    ///
    /// abs diff of two log probs `= |log p_a - log p_b|`
    ///
    pub fn log_diff(&self, other: Prob) -> f64 {
        match (self.is_zero(), other.is_zero()) {
            (true, true) => 0.0,
            (true, false) | (false, true) => f64::INFINITY,
            (false, false) => (self.0 - other.0).abs(),
        }
    }
}

/// p=0 (Prob(-inf)) as a default value
impl Default for Prob {
    fn default() -> Self {
        Prob(f64::NEG_INFINITY)
    }
}

impl num_traits::One for Prob {
    fn one() -> Self {
        Prob::one()
    }
}

impl num_traits::Zero for Prob {
    fn zero() -> Self {
        Prob::zero()
    }
    fn is_zero(&self) -> bool {
        Prob::is_zero(*self)
    }
}

// display
impl std::fmt::Display for Prob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}({:.4})", self.0, self.to_value())
    }
}
impl FromStr for Prob {
    type Err = std::num::ParseFloatError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let front = s.split_once('(').map_or(s, |(front, _)| front);
        front.parse::<f64>().map(Prob)
    }
}

/// Addition of two probabilities `px + py` in log space
///
/// If `px > py`:
///
/// ```text
/// log(exp(x) + exp(y))
///  = x + log(1 + exp(y-x))
/// ```
impl std::ops::Add for Prob {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        let x = self.0;
        let y = other.0;
        let (x, y) = if x >= y { (x, y) } else { (y, x) };
        if y == f64::NEG_INFINITY {
            // x + 0 = x
            Prob(x)
        } else if x == y {
            // x + x = 2x
            Prob(x + std::f64::consts::LN_2)
        } else {
            Prob(x + (y - x).exp().ln_1p())
        }
    }
}

/// Multiplication of two probabilities `px * py` in log space
impl std::ops::Mul for Prob {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Prob(self.0 + other.0)
    }
}

/// Division of two probabilities `px / py` in log space
impl std::ops::Div for Prob {
    type Output = Self;
    fn div(self, other: Self) -> Self {
        Prob(self.0 - other.0)
    }
}

// assign
impl std::ops::AddAssign for Prob {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}
impl std::ops::MulAssign for Prob {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}
// sum/prod
impl std::iter::Sum for Prob {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Prob::zero(), |a, b| a + b)
    }
}
impl<'a> std::iter::Sum<&'a Self> for Prob {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Prob::zero(), |a, b| a + *b)
    }
}
impl std::iter::Product for Prob {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Prob::one(), |a, b| a * b)
    }
}
impl<'a> std::iter::Product<&'a Self> for Prob {
    fn product<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Prob::one(), |a, b| a * *b)
    }
}

/// Multiplication of Prob and a weight `p * w` for `w >= 0`
impl std::ops::Mul<f64> for Prob {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Prob(self.0 + rhs.ln())
    }
}

/// for approx `assert_abs_diff_eq`
impl AbsDiffEq for Prob {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        f64::abs_diff_eq(&self.0, &other.0, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn prob_add_mul() {
        assert_eq!(p(0.0) + p(1.0), p(1.0));
        assert_eq!(p(0.0) * p(1.0), p(0.0));
        assert_abs_diff_eq!((p(0.3) + p(0.3)).0, p(0.6).0, epsilon = 1e-12);
        assert_abs_diff_eq!((p(0.3) * p(0.3)).0, p(0.09).0, epsilon = 1e-12);
        assert_abs_diff_eq!((p(0.5) + p(0.00001)).0, p(0.50001).0, epsilon = 1e-12);
    }
    #[test]
    fn prob_sub() {
        assert_abs_diff_eq!(p(0.6).sub(p(0.2)).to_value(), 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(p(0.6).sub(p(0.0)).to_value(), 0.6, epsilon = 1e-12);
        assert!(p(0.6).sub(p(0.6)).is_zero());
        // rounding noise never produces NaN
        assert!(p(0.3).sub(p(0.3000000001)).is_zero());
        // tiny differences keep their precision in log space
        let x = lp(-1e-20).complement();
        assert_relative_eq!(x.to_log_value(), (1e-20f64).ln(), max_relative = 1e-9);
    }
    #[test]
    fn prob_complement() {
        assert_abs_diff_eq!(p(0.25).complement().to_value(), 0.75, epsilon = 1e-12);
        assert!(p(1.0).complement().is_zero());
        assert!(p(0.0).complement().is_one());
    }
    #[test]
    fn prob_sum_prod() {
        // sum/prod of zero element vec
        let xs: Vec<Prob> = vec![];
        let sum: Prob = xs.iter().sum();
        let product: Prob = xs.iter().product();
        assert_eq!(sum, p(0.0));
        assert_eq!(product, p(1.0));

        let xs = vec![p(0.1), p(0.1), p(0.1)];
        let sum: Prob = xs.iter().sum();
        let product: Prob = xs.iter().product();
        assert_relative_eq!(sum.to_value(), 0.3, max_relative = 1e-12);
        assert_relative_eq!(product.to_value(), 0.001, max_relative = 1e-12);
    }
    #[test]
    fn prob_mul_weight() {
        assert_abs_diff_eq!((p(0.4) * 0.5).to_value(), 0.2, epsilon = 1e-12);
        assert!((p(0.4) * 0.0).is_zero());
    }
    #[test]
    fn prob_serialize() {
        let p1 = Prob::one();
        let p05 = Prob::from_prob(0.5);
        let p0 = Prob::zero();
        assert_eq!(Prob::from_str(&p1.to_string()).unwrap(), p1);
        assert_eq!(Prob::from_str(&p05.to_string()).unwrap(), p05);
        assert_eq!(Prob::from_str(&p0.to_string()).unwrap(), p0);
        assert_eq!(Prob::from_str("-0.5").unwrap(), lp(-0.5));

        let f = |p: Prob| -> Prob {
            let json = serde_json::to_string(&p).unwrap();
            serde_json::from_str(&json).unwrap()
        };
        assert_eq!(p1, f(p1));
        assert_eq!(p05, f(p05));
        assert_eq!(p0, f(p0));
    }
    #[test]
    fn prob_diff() {
        assert_eq!(0.0, p(0.5).log_diff(p(0.5)));
        assert_eq!(0.0, Prob::zero().log_diff(Prob::zero()));
        assert_eq!(f64::INFINITY, Prob::zero().log_diff(Prob::one()));
        assert_eq!(f64::INFINITY, Prob::one().log_diff(Prob::zero()));
    }
}

//!
//! Per-state scoring models built from peak patterns
//!
//! Each chromatin state is described by a table of factors, every factor
//! being one pattern applied to one feature (or a fixed-weight mixture of
//! such terms). Two interpreters read the same table:
//!
//! * `Classifier`: product of the factors in the probability domain
//! * `GenerativeModel`: log-domain emission model where each term is weighed
//!   against its negation by a prior, and every unconstrained feature is
//!   marginalized with `nil`
//!
//! Both can be restricted to the features with data. Terms on the other
//! features are marginalized, and a state left without any peak term on an
//! observed feature cannot be recognized and scores zero.
//!
use super::linear::{self, check_prob};
use super::logspace;
use super::matrix::{Domain, PositionMatrix};
use crate::error::{Error, Result};
use crate::feature::{Feature, State};
use crate::prob::{p, Prob};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

///
/// Closed vocabulary of peak patterns. Offsets are relative to the center
/// column and clamped into the window; ranges are inclusive.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pattern {
    PeakAtCenter,
    NoPeakAtCenter,
    PeakAny,
    PeakAll,
    NoPeakAll,
    PeakRange { from: isize, to: isize },
    NoPeakRange { from: isize, to: isize },
    PeakAt(isize),
    NoPeakAt(isize),
    PeakSym { min_width: usize },
    /// don't care
    Nil,
}

impl Pattern {
    /// whether the pattern asks for a peak somewhere in the window
    pub fn is_peak(&self) -> bool {
        matches!(
            self,
            Pattern::PeakAtCenter
                | Pattern::PeakAny
                | Pattern::PeakAll
                | Pattern::PeakRange { .. }
                | Pattern::PeakAt(_)
                | Pattern::PeakSym { .. }
        )
    }
    pub fn eval(&self, x: &PositionMatrix, feature: Feature) -> Result<f64> {
        let i = feature.row();
        let value = match *self {
            Pattern::PeakAtCenter => linear::peak_at_center(x, i),
            Pattern::NoPeakAtCenter => linear::nopeak_at_center(x, i),
            Pattern::PeakAny => linear::peak_any(x, i),
            Pattern::PeakAll => linear::peak_all(x, i),
            Pattern::NoPeakAll => linear::nopeak_all(x, i),
            Pattern::PeakRange { from, to } => {
                linear::peak_range(x, i, x.column(from), x.column(to) + 1)
            }
            Pattern::NoPeakRange { from, to } => {
                linear::nopeak_range(x, i, x.column(from), x.column(to) + 1)
            }
            Pattern::PeakAt(offset) => linear::peak_at(x, i, x.column(offset)),
            Pattern::NoPeakAt(offset) => linear::nopeak_at(x, i, x.column(offset)),
            Pattern::PeakSym { min_width } => linear::peak_sym(x, i, min_width)?,
            Pattern::Nil => linear::nil(x, i),
        };
        check_prob(value)
    }
    pub fn eval_log(&self, x: &PositionMatrix, feature: Feature) -> Prob {
        let i = feature.row();
        match *self {
            Pattern::PeakAtCenter => logspace::peak_at_center(x, i),
            Pattern::NoPeakAtCenter => logspace::nopeak_at_center(x, i),
            Pattern::PeakAny => logspace::peak_any(x, i),
            Pattern::PeakAll => logspace::peak_all(x, i),
            Pattern::NoPeakAll => logspace::nopeak_all(x, i),
            Pattern::PeakRange { from, to } => {
                logspace::peak_range(x, i, x.column(from), x.column(to) + 1)
            }
            Pattern::NoPeakRange { from, to } => {
                logspace::nopeak_range(x, i, x.column(from), x.column(to) + 1)
            }
            Pattern::PeakAt(offset) => logspace::peak_at(x, i, x.column(offset)),
            Pattern::NoPeakAt(offset) => logspace::nopeak_at(x, i, x.column(offset)),
            Pattern::PeakSym { min_width } => logspace::peak_sym(x, i, min_width),
            Pattern::Nil => logspace::nil(x, i),
        }
    }
    ///
    /// log-score of "this pattern does not hold". Patterns with a dual in
    /// the vocabulary use it; the others are complemented by log-subtract.
    ///
    pub fn eval_log_negated(&self, x: &PositionMatrix, feature: Feature) -> Prob {
        let dual = match *self {
            Pattern::PeakAtCenter => Pattern::NoPeakAtCenter,
            Pattern::NoPeakAtCenter => Pattern::PeakAtCenter,
            Pattern::PeakAny => Pattern::NoPeakAll,
            Pattern::NoPeakAll => Pattern::PeakAny,
            Pattern::PeakRange { from, to } => Pattern::NoPeakRange { from, to },
            Pattern::NoPeakRange { from, to } => Pattern::PeakRange { from, to },
            Pattern::PeakAt(offset) => Pattern::NoPeakAt(offset),
            Pattern::NoPeakAt(offset) => Pattern::PeakAt(offset),
            Pattern::Nil => Pattern::Nil,
            Pattern::PeakAll | Pattern::PeakSym { .. } => {
                return self.eval_log(x, feature).complement()
            }
        };
        dual.eval_log(x, feature)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct Term {
    pub feature: Feature,
    pub pattern: Pattern,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Factor {
    Term(Term),
    /// weighted sum of terms on the same feature, weights sum to 1
    Mixture(Vec<(f64, Term)>),
}

impl Factor {
    pub fn features(&self) -> Vec<Feature> {
        match self {
            Factor::Term(term) => vec![term.feature],
            Factor::Mixture(terms) => terms.iter().map(|(_, t)| t.feature).collect(),
        }
    }
    fn is_peak(&self) -> bool {
        matches!(self, Factor::Term(t) if t.pattern.is_peak())
    }
}

fn term(feature: Feature, pattern: Pattern) -> Factor {
    Factor::Term(Term::new(feature, pattern))
}

/// state is ambiguous on `feature`: half peak, half no peak at the center
fn either(feature: Feature) -> Factor {
    Factor::Mixture(vec![
        (0.5, Term::new(feature, Pattern::PeakAtCenter)),
        (0.5, Term::new(feature, Pattern::NoPeakAtCenter)),
    ])
}

///
/// Factor table of every chromatin state
///
pub fn factors(state: State) -> Vec<Factor> {
    use Feature::*;
    use Pattern::*;
    match state {
        State::PA => vec![
            term(Atac, PeakAtCenter),
            term(H3k4me3, PeakSym { min_width: 1 }),
            term(H3k27ac, PeakAny),
            term(H3k27me3, NoPeakAll),
            term(Control, NoPeakAll),
        ],
        State::EA => vec![
            term(Atac, PeakAtCenter),
            term(H3k27ac, PeakSym { min_width: 1 }),
            term(H3k4me1, PeakAny),
            term(H3k4me3, NoPeakAll),
            term(H3k27me3, NoPeakAll),
            term(Control, NoPeakAll),
        ],
        State::BI => vec![
            term(Atac, PeakAtCenter),
            term(H3k4me3, PeakAny),
            term(H3k27me3, PeakAny),
            term(H3k27ac, NoPeakAll),
            term(Control, NoPeakAll),
        ],
        State::PR => vec![
            term(Atac, PeakAtCenter),
            term(H3k4me1, PeakAny),
            term(H3k27ac, NoPeakAll),
            term(H3k4me3, NoPeakAll),
            term(H3k27me3, NoPeakAll),
            term(Control, NoPeakAll),
        ],
        State::TR => vec![
            term(Rna, PeakAtCenter),
            term(Atac, NoPeakAtCenter),
            term(Control, NoPeakAtCenter),
        ],
        State::TL => vec![
            term(RnaLow, PeakRange { from: -1, to: 1 }),
            term(Rna, NoPeakRange { from: -1, to: 1 }),
            term(Atac, NoPeakAtCenter),
            term(Control, NoPeakAtCenter),
        ],
        State::R1 => vec![
            term(H3k27me3, PeakAtCenter),
            term(Atac, NoPeakAtCenter),
            term(H3k4me3, NoPeakAll),
            term(Rna, NoPeakAtCenter),
            term(Control, NoPeakAtCenter),
        ],
        State::R2 => vec![
            term(H3k9me3, PeakAtCenter),
            either(H3k27me3),
            term(Atac, NoPeakAtCenter),
            term(Rna, NoPeakAtCenter),
            term(Control, NoPeakAtCenter),
        ],
        State::CL => vec![term(Control, PeakAtCenter)],
        State::NS => Feature::ALL
            .iter()
            .map(|&feature| term(feature, NoPeakAtCenter))
            .collect(),
    }
}

///
/// Factors of `state` restricted to the features for which `available`
/// holds. `None` if the state has peak terms but none of them is on an
/// available feature.
///
pub fn available_factors<F>(state: State, available: F) -> Option<Vec<Factor>>
where
    F: Fn(Feature) -> bool,
{
    let all = factors(state);
    let observed = |factor: &Factor| factor.features().into_iter().all(|f| available(f));
    let has_peak = all.iter().any(Factor::is_peak);
    if has_peak && !all.iter().any(|f| f.is_peak() && observed(f)) {
        return None;
    }
    Some(all.into_iter().filter(|f| observed(f)).collect())
}

/// log-score of a state that cannot be recognized (finite, tracks are JSON)
pub const LOG_ZERO: f64 = f64::MIN;

///
/// Score every pluggable model exposes to the batch driver
///
pub trait Scorer: Send + Sync {
    fn state(&self) -> State;
    /// domain of the matrix expected by `eval`
    fn domain(&self) -> Domain;
    ///
    /// Unnormalized score of the locus; probability for
    /// `Domain::Linear`, log-likelihood for `Domain::Log`
    ///
    fn eval(&self, x: &PositionMatrix) -> Result<f64>;
    /// `(rows, cols)` of the matrices accepted by `eval`
    fn dims(&self) -> (usize, usize);
}

///
/// Deterministic product of the state's factors
///
#[derive(Clone, Debug)]
pub struct Classifier {
    state: State,
    /// `None` for a state that cannot be recognized
    factors: Option<Vec<Factor>>,
    n_cols: usize,
}

impl Classifier {
    pub fn new(state: State, n_cols: usize) -> Self {
        Classifier::with_features(state, n_cols, |_| true)
    }
    pub fn with_features<F: Fn(Feature) -> bool>(state: State, n_cols: usize, available: F) -> Self {
        Classifier {
            state,
            factors: available_factors(state, available),
            n_cols,
        }
    }
}

impl Scorer for Classifier {
    fn state(&self) -> State {
        self.state
    }
    fn domain(&self) -> Domain {
        Domain::Linear
    }
    fn eval(&self, x: &PositionMatrix) -> Result<f64> {
        let factors = match &self.factors {
            Some(factors) => factors,
            None => return Ok(0.0),
        };
        let mut r = 1.0;
        for factor in factors {
            r *= match factor {
                Factor::Term(t) => t.pattern.eval(x, t.feature)?,
                Factor::Mixture(terms) => {
                    let mut s = 0.0;
                    for (w, t) in terms {
                        s += w * t.pattern.eval(x, t.feature)?;
                    }
                    check_prob(s)?
                }
            };
        }
        check_prob(r)
    }
    fn dims(&self) -> (usize, usize) {
        (2 * Feature::ALL.len(), self.n_cols)
    }
}

/// prior of a term whose weight is not given explicitly
pub const DEFAULT_PRIOR: f64 = 0.9;

///
/// Probability that each (state, feature) term holds in its state.
///
/// Estimated upstream and injected as a JSON map
/// `{ "PA": { "atac": 0.95, ... }, ... }`; missing entries use
/// `DEFAULT_PRIOR`.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Priors(pub BTreeMap<State, BTreeMap<Feature, f64>>);

impl Priors {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Priors> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let priors: Priors = serde_json::from_str(&s).map_err(|e| Error::json(path, e))?;
        for (state, features) in &priors.0 {
            for (feature, &prior) in features {
                if !(prior > 0.0 && prior < 1.0) {
                    return Err(Error::Config(format!(
                        "prior of {}/{} must be in (0, 1), got {}",
                        state, feature, prior
                    )));
                }
            }
        }
        Ok(priors)
    }
    pub fn get(&self, state: State, feature: Feature) -> f64 {
        self.0
            .get(&state)
            .and_then(|m| m.get(&feature))
            .copied()
            .unwrap_or(DEFAULT_PRIOR)
    }
}

///
/// Log-domain emission model of one state
///
#[derive(Clone, Debug)]
pub struct GenerativeModel {
    state: State,
    /// factors with their (log prior, log 1-prior); `None` for a state
    /// that cannot be recognized
    factors: Option<Vec<(Factor, Prob, Prob)>>,
    /// features not constrained by any factor
    unconstrained: Vec<Feature>,
    n_cols: usize,
}

impl GenerativeModel {
    pub fn new(state: State, n_cols: usize, priors: &Priors) -> Self {
        GenerativeModel::with_features(state, n_cols, priors, |_| true)
    }
    pub fn with_features<F: Fn(Feature) -> bool>(
        state: State,
        n_cols: usize,
        priors: &Priors,
        available: F,
    ) -> Self {
        let factors: Option<Vec<(Factor, Prob, Prob)>> =
            available_factors(state, available).map(|factors| {
                factors
                    .into_iter()
                    .map(|factor| {
                        let prior = factor
                            .features()
                            .first()
                            .map_or(DEFAULT_PRIOR, |&f| priors.get(state, f));
                        (factor, p(prior), p(1.0 - prior))
                    })
                    .collect()
            });
        let constrained: Vec<Feature> = factors
            .iter()
            .flatten()
            .flat_map(|(factor, _, _)| factor.features())
            .collect();
        let unconstrained = Feature::ALL
            .iter()
            .copied()
            .filter(|f| !constrained.contains(f))
            .collect();
        GenerativeModel {
            state,
            factors,
            unconstrained,
            n_cols,
        }
    }
}

impl Scorer for GenerativeModel {
    fn state(&self) -> State {
        self.state
    }
    fn domain(&self) -> Domain {
        Domain::Log
    }
    fn eval(&self, x: &PositionMatrix) -> Result<f64> {
        let factors = match &self.factors {
            Some(factors) => factors,
            None => return Ok(LOG_ZERO),
        };
        let mut r = Prob::one();
        for (factor, fg, bg) in factors {
            r *= match factor {
                Factor::Term(t) => {
                    *fg * t.pattern.eval_log(x, t.feature)
                        + *bg * t.pattern.eval_log_negated(x, t.feature)
                }
                Factor::Mixture(terms) => terms
                    .iter()
                    .map(|(w, t)| t.pattern.eval_log(x, t.feature) * *w)
                    .sum::<Prob>(),
            };
        }
        for &feature in &self.unconstrained {
            r *= logspace::nil(x, feature.row());
        }
        if r.is_nan() {
            Err(Error::NotANumber(format!("generative model of {}", self.state)))
        } else {
            Ok(r.to_log_value())
        }
    }
    fn dims(&self) -> (usize, usize) {
        (2 * Feature::ALL.len(), self.n_cols)
    }
}

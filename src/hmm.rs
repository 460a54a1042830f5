//!
//! HMM over expanded states with tied transitions
//!
//! Emissions are given per canonical state; every expanded state emits with
//! the likelihood of its canonical state. All recursions run in log space
//! with `Prob`.
//!
use crate::error::{Error, Result};
use crate::prob::{lp, Prob};
use crate::tying::{rewrite_degenerate, EqualityConstraint, StateMap, TiedTransitions};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

///
/// Estimation and decoding contract consumed by the segmentation stages.
///
/// `emissions` are `T x n_canonical` matrices of log-likelihoods, one per
/// contig.
///
pub trait Decoder {
    /// fit the free parameters, returning the final log-likelihood
    fn estimate(
        &mut self,
        emissions: &[Array2<f64>],
        max_iterations: usize,
        epsilon: f64,
    ) -> Result<f64>;
    /// most likely canonical state of each locus
    fn viterbi(&self, emissions: &Array2<f64>) -> Vec<usize>;
    /// `T x n_canonical` posterior marginals
    fn posterior(&self, emissions: &Array2<f64>) -> Array2<f64>;
}

#[derive(Clone, Debug)]
pub struct Hmm {
    pub initial: Vec<f64>,
    pub transitions: Array2<f64>,
    pub constraints: Vec<EqualityConstraint>,
    pub state_map: StateMap,
    /// `preds[j]` = states with a nonzero transition into `j`
    preds: Vec<Vec<usize>>,
}

///
/// Serialized form of the estimated parameters
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HmmParams {
    pub initial: Vec<f64>,
    pub transitions: Vec<Vec<f64>>,
}

struct ForwardBackward {
    /// log alpha, `T x m`
    f: Array2<f64>,
    /// log beta, `T x m`
    b: Array2<f64>,
    log_likelihood: f64,
}

impl Hmm {
    pub fn new(tied: TiedTransitions) -> Hmm {
        let m = tied.state_map.n_expanded();
        let mut hmm = Hmm {
            initial: vec![1.0 / m as f64; m],
            transitions: tied.skeleton,
            constraints: tied.constraints,
            state_map: tied.state_map,
            preds: Vec::new(),
        };
        hmm.refresh_preds();
        hmm
    }
    fn refresh_preds(&mut self) {
        let m = self.n_states();
        self.preds = (0..m)
            .map(|j| (0..m).filter(|&i| self.transitions[[i, j]] > 0.0).collect())
            .collect();
    }
    pub fn n_states(&self) -> usize {
        self.initial.len()
    }
    pub fn params(&self) -> HmmParams {
        HmmParams {
            initial: self.initial.clone(),
            transitions: self.transitions.outer_iter().map(|r| r.to_vec()).collect(),
        }
    }
    ///
    /// Replace parameters by previously estimated ones; the shape must
    /// match and zero cells of the skeleton must stay zero.
    ///
    pub fn set_params(&mut self, params: &HmmParams) -> Result<()> {
        let m = self.n_states();
        if params.initial.len() != m
            || params.transitions.len() != m
            || params.transitions.iter().any(|r| r.len() != m)
        {
            return Err(Error::Config(format!(
                "HMM parameters do not have {} states",
                m
            )));
        }
        for i in 0..m {
            for j in 0..m {
                let v = params.transitions[i][j];
                if v > 0.0 && self.transitions[[i, j]] == 0.0 {
                    return Err(Error::Config(format!(
                        "transition {} -> {} is not permitted",
                        i, j
                    )));
                }
            }
        }
        self.initial = params.initial.clone();
        for i in 0..m {
            for j in 0..m {
                self.transitions[[i, j]] = params.transitions[i][j];
            }
        }
        self.refresh_preds();
        Ok(())
    }
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let s = serde_json::to_string_pretty(&self.params()).map_err(|e| Error::json(path, e))?;
        std::fs::write(path, s).map_err(|e| Error::io(path, e))
    }
    pub fn load_params<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let params: HmmParams = serde_json::from_str(&s).map_err(|e| Error::json(path, e))?;
        self.set_params(&params)
    }
    #[inline]
    fn log_a(&self, i: usize, j: usize) -> Prob {
        lp(self.transitions[[i, j]].ln())
    }
    #[inline]
    fn log_e(&self, e: &Array2<f64>, t: usize, j: usize) -> Prob {
        lp(e[[t, self.state_map.canonical(j)]])
    }
    fn forward_backward(&self, e: &Array2<f64>) -> ForwardBackward {
        let m = self.n_states();
        let n = e.nrows();
        let mut f = Array2::from_elem((n, m), f64::NEG_INFINITY);
        let mut b = Array2::from_elem((n, m), f64::NEG_INFINITY);
        if n == 0 {
            return ForwardBackward {
                f,
                b,
                log_likelihood: 0.0,
            };
        }
        for j in 0..m {
            f[[0, j]] = (lp(self.initial[j].ln()) * self.log_e(e, 0, j)).to_log_value();
        }
        for t in 1..n {
            for j in 0..m {
                let s: Prob = self.preds[j]
                    .iter()
                    .map(|&i| lp(f[[t - 1, i]]) * self.log_a(i, j))
                    .sum();
                f[[t, j]] = (s * self.log_e(e, t, j)).to_log_value();
            }
        }
        for i in 0..m {
            b[[n - 1, i]] = 0.0;
        }
        for t in (0..n - 1).rev() {
            for i in 0..m {
                let s: Prob = (0..m)
                    .filter(|&j| self.transitions[[i, j]] > 0.0)
                    .map(|j| self.log_a(i, j) * self.log_e(e, t + 1, j) * lp(b[[t + 1, j]]))
                    .sum();
                b[[t, i]] = s.to_log_value();
            }
        }
        let log_likelihood = (0..m)
            .map(|j| lp(f[[n - 1, j]]))
            .sum::<Prob>()
            .to_log_value();
        ForwardBackward {
            f,
            b,
            log_likelihood,
        }
    }
    ///
    /// Make tied cells equal to the mean of their estimates, then
    /// let the untied cells of each row absorb the remaining mass.
    ///
    fn apply_constraints(&self, a: &mut Array2<f64>) {
        let m = self.n_states();
        let mut tied = Array2::from_elem((m, m), false);
        for constraint in &self.constraints {
            let cells = constraint.cells();
            let mean = cells.iter().map(|&(i, j)| a[[i, j]]).sum::<f64>() / cells.len() as f64;
            for &(i, j) in cells {
                a[[i, j]] = mean;
                tied[[i, j]] = true;
            }
        }
        for i in 0..m {
            let total_tied: f64 = (0..m).filter(|&j| tied[[i, j]]).map(|j| a[[i, j]]).sum();
            let total_free: f64 = (0..m).filter(|&j| !tied[[i, j]]).map(|j| a[[i, j]]).sum();
            if total_free > 0.0 && total_tied < 1.0 {
                let scale = (1.0 - total_tied) / total_free;
                for j in (0..m).filter(|&j| !tied[[i, j]]) {
                    a[[i, j]] *= scale;
                }
            } else {
                let total = total_tied + total_free;
                if total > 0.0 {
                    a.row_mut(i).mapv_inplace(|x| x / total);
                }
            }
        }
    }
    ///
    /// One Baum-Welch iteration over all sequences. Returns the total
    /// log-likelihood under the parameters before the update.
    ///
    fn baum_welch_step(&mut self, emissions: &[Array2<f64>]) -> Result<f64> {
        let m = self.n_states();
        let mut counts = Array2::<f64>::zeros((m, m));
        let mut initial = vec![0.0; m];
        let mut total = 0.0;
        for e in emissions.iter().filter(|e| e.nrows() > 0) {
            let fb = self.forward_backward(e);
            let ll = fb.log_likelihood;
            if !ll.is_finite() {
                return Err(Error::NotANumber(format!(
                    "HMM log-likelihood ({})",
                    ll
                )));
            }
            total += ll;
            for i in 0..m {
                initial[i] += (fb.f[[0, i]] + fb.b[[0, i]] - ll).exp();
            }
            for t in 0..e.nrows() - 1 {
                for j in 0..m {
                    let tail = self.log_e(e, t + 1, j).to_log_value() + fb.b[[t + 1, j]] - ll;
                    for &i in &self.preds[j] {
                        counts[[i, j]] +=
                            (fb.f[[t, i]] + self.transitions[[i, j]].ln() + tail).exp();
                    }
                }
            }
        }
        let mut a = self.transitions.clone();
        for i in 0..m {
            let row: f64 = counts.row(i).sum();
            if row > 0.0 {
                for j in 0..m {
                    a[[i, j]] = counts[[i, j]] / row;
                }
            }
        }
        self.apply_constraints(&mut a);
        self.transitions = a;
        let z: f64 = initial.iter().sum();
        if z > 0.0 {
            self.initial = initial.iter().map(|x| x / z).collect();
        }
        self.refresh_preds();
        Ok(total)
    }
}

impl Decoder for Hmm {
    fn estimate(
        &mut self,
        emissions: &[Array2<f64>],
        max_iterations: usize,
        epsilon: f64,
    ) -> Result<f64> {
        let mut prev = f64::NEG_INFINITY;
        for iteration in 0..max_iterations {
            let ll = self.baum_welch_step(emissions)?;
            info!("baum-welch iteration={} log_likelihood={}", iteration, ll);
            if ll - prev < epsilon {
                debug!("converged after {} iterations", iteration + 1);
                return Ok(ll);
            }
            prev = ll;
        }
        Ok(prev)
    }
    fn viterbi(&self, e: &Array2<f64>) -> Vec<usize> {
        let m = self.n_states();
        let n = e.nrows();
        if n == 0 {
            return Vec::new();
        }
        let mut v: Vec<f64> = (0..m)
            .map(|j| self.initial[j].ln() + e[[0, self.state_map.canonical(j)]])
            .collect();
        let mut trace = Array2::<usize>::zeros((n, m));
        for t in 1..n {
            let mut next = vec![f64::NEG_INFINITY; m];
            for j in 0..m {
                let (arg, best) = self.preds[j]
                    .iter()
                    .map(|&i| (i, v[i] + self.transitions[[i, j]].ln()))
                    .fold((j, f64::NEG_INFINITY), |a, b| if b.1 > a.1 { b } else { a });
                next[j] = best + e[[t, self.state_map.canonical(j)]];
                trace[[t, j]] = arg;
            }
            v = next;
        }
        let mut state = (0..m)
            .fold(0, |a, j| if v[j] > v[a] { j } else { a });
        let mut path = vec![0; n];
        for t in (0..n).rev() {
            path[t] = self.state_map.canonical(state);
            state = trace[[t, state]];
        }
        path
    }
    fn posterior(&self, e: &Array2<f64>) -> Array2<f64> {
        let m = self.n_states();
        let n = e.nrows();
        let fb = self.forward_backward(e);
        let mut r = Array2::zeros((n, self.state_map.n_canonical()));
        for t in 0..n {
            let expanded: Vec<f64> = (0..m)
                .map(|i| (fb.f[[t, i]] + fb.b[[t, i]] - fb.log_likelihood).exp())
                .collect();
            for (c, x) in self.state_map.collapse(&expanded).into_iter().enumerate() {
                r[[t, c]] = x;
            }
        }
        r
    }
}

///
/// Turn per-state score tracks (one row per locus) into emission
/// log-likelihoods, rewriting degenerate loci to the fallback state.
///
/// `scores[t]` holds the score of each canonical state; `log_scores`
/// tells whether they are log-likelihoods.
///
pub fn prepare_emissions(
    scores: &Array2<f64>,
    log_scores: bool,
    fallback: usize,
) -> Result<(Array2<f64>, usize)> {
    let (n, k) = scores.dim();
    let mut e = Array2::zeros((n, k));
    let mut n_degenerate = 0;
    let mut row = vec![0.0; k];
    for t in 0..n {
        if log_scores {
            let max = scores.row(t).iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for c in 0..k {
                row[c] = if max == f64::NEG_INFINITY {
                    0.0
                } else {
                    (scores[[t, c]] - max).exp()
                };
            }
        } else {
            for c in 0..k {
                row[c] = scores[[t, c]];
            }
        }
        if rewrite_degenerate(&mut row, fallback)? {
            n_degenerate += 1;
        }
        for c in 0..k {
            e[[t, c]] = row[c].ln();
        }
    }
    Ok((e, n_degenerate))
}

//!
//! Background/foreground mixture of read counts
//!
//! Counts of one feature are modelled as a two-component Poisson mixture
//! fitted by EM. The component with the larger rate is the foreground
//! (enrichment); its posterior at each bin is the peak probability used by
//! the pattern scorers.
//!
use crate::error::{Error, Result};
use crate::prob::{lp, Prob};
use crate::track::Track;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// lower bound of a component rate
const MIN_RATE: f64 = 1e-6;

pub trait MixtureEstimator {
    /// fit to every bin of `counts`, returning the final log-likelihood
    fn fit(&mut self, counts: &Track, max_iterations: usize, epsilon: f64) -> Result<f64>;
    /// posterior probability that `count` was drawn from the foreground
    fn foreground_posterior(&self, count: f64) -> f64;
    fn posterior_track(&self, counts: &Track) -> Track {
        counts.map(|x| self.foreground_posterior(x))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub weight: f64,
    pub rate: f64,
}

impl Component {
    ///
    /// `weight * Poisson(x; rate)` up to the `x!` term shared by all
    /// components
    ///
    fn joint(&self, x: f64) -> Prob {
        lp(self.weight.ln() + x * self.rate.ln() - self.rate)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoissonMixture {
    pub background: Component,
    pub foreground: Component,
}

impl PoissonMixture {
    ///
    /// Initial guess from the data: background at half the mean and
    /// foreground at twice the mean.
    ///
    pub fn init(counts: &Track) -> PoissonMixture {
        let n = counts.n_bins().max(1) as f64;
        let mean = counts
            .contigs
            .iter()
            .flat_map(|c| c.values.iter())
            .sum::<f64>()
            / n;
        PoissonMixture {
            background: Component {
                weight: 0.9,
                rate: (0.5 * mean).max(MIN_RATE),
            },
            foreground: Component {
                weight: 0.1,
                rate: (2.0 * mean).max(10.0 * MIN_RATE),
            },
        }
    }
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PoissonMixture> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&s).map_err(|e| Error::json(path, e))
    }
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let s = serde_json::to_string_pretty(self).map_err(|e| Error::json(path, e))?;
        std::fs::write(path, s).map_err(|e| Error::io(path, e))
    }
    fn step(&mut self, counts: &Track) -> Result<f64> {
        let mut ll = Prob::one();
        let (mut n_bg, mut n_fg) = (0.0, 0.0);
        let (mut x_bg, mut x_fg) = (0.0, 0.0);
        for &x in counts.contigs.iter().flat_map(|c| c.values.iter()) {
            if x.is_nan() || x < 0.0 {
                return Err(Error::NotANumber(format!("read count {}", x)));
            }
            let bg = self.background.joint(x);
            let fg = self.foreground.joint(x);
            let total = bg + fg;
            ll *= total;
            let r = (fg / total).to_value();
            n_fg += r;
            n_bg += 1.0 - r;
            x_fg += r * x;
            x_bg += (1.0 - r) * x;
        }
        let n = n_bg + n_fg;
        if n > 0.0 {
            self.background = Component {
                weight: n_bg / n,
                rate: (x_bg / n_bg).max(MIN_RATE),
            };
            self.foreground = Component {
                weight: n_fg / n,
                rate: (x_fg / n_fg).max(MIN_RATE),
            };
        }
        if !(self.background.weight > 0.0 && self.foreground.weight > 0.0) {
            return Err(Error::NotANumber("collapsed mixture component".to_string()));
        }
        Ok(ll.to_log_value())
    }
}

impl MixtureEstimator for PoissonMixture {
    fn fit(&mut self, counts: &Track, max_iterations: usize, epsilon: f64) -> Result<f64> {
        let mut prev = f64::NEG_INFINITY;
        for iteration in 0..max_iterations {
            let ll = self.step(counts)?;
            debug!("em iteration={} log_likelihood={}", iteration, ll);
            if ll - prev < epsilon {
                break;
            }
            prev = ll;
        }
        if self.foreground.rate < self.background.rate {
            std::mem::swap(&mut self.foreground, &mut self.background);
        }
        info!(
            "mixture background={:?} foreground={:?}",
            self.background, self.foreground
        );
        Ok(prev)
    }
    fn foreground_posterior(&self, count: f64) -> f64 {
        let bg = self.background.joint(count);
        let fg = self.foreground.joint(count);
        (fg / (bg + fg)).to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Contig;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// Poisson draw by inversion
    fn poisson(rng: &mut Xoshiro256PlusPlus, rate: f64) -> f64 {
        let u: f64 = rng.gen();
        let mut k = 0;
        let mut p = (-rate).exp();
        let mut cdf = p;
        while u > cdf && k < 1000 {
            k += 1;
            p *= rate / k as f64;
            cdf += p;
        }
        k as f64
    }

    fn sample(n: usize, seed: u64) -> Track {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let values = (0..n)
            .map(|_| {
                if rng.gen_bool(0.2) {
                    poisson(&mut rng, 20.0)
                } else {
                    poisson(&mut rng, 1.0)
                }
            })
            .collect();
        Track::new(100, vec![Contig::new("chr1".to_string(), values)])
    }

    #[test]
    fn em_recovers_components() {
        let counts = sample(5000, 3);
        let mut m = PoissonMixture::init(&counts);
        let ll = m.fit(&counts, 100, 1e-8).unwrap();
        assert!(ll.is_finite());
        assert_abs_diff_eq!(m.background.rate, 1.0, epsilon = 0.2);
        assert_abs_diff_eq!(m.foreground.rate, 20.0, epsilon = 1.0);
        assert_abs_diff_eq!(m.foreground.weight, 0.2, epsilon = 0.03);
        assert!(m.foreground_posterior(0.0) < 0.01);
        assert!(m.foreground_posterior(25.0) > 0.99);

        let post = m.posterior_track(&counts);
        assert_eq!(post.genome(), counts.genome());
        assert!(post.contigs[0].values.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
    #[test]
    fn foreground_has_larger_rate() {
        let counts = sample(500, 7);
        let mut m = PoissonMixture {
            background: Component {
                weight: 0.1,
                rate: 30.0,
            },
            foreground: Component {
                weight: 0.9,
                rate: 0.5,
            },
        };
        m.fit(&counts, 50, 1e-6).unwrap();
        assert!(m.foreground.rate > m.background.rate);
    }
    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("atac.json");
        let m = PoissonMixture::init(&sample(100, 1));
        m.save(&path).unwrap();
        assert_eq!(PoissonMixture::from_file(&path).unwrap(), m);
    }
    #[test]
    fn invalid_counts() {
        let counts = Track::new(100, vec![Contig::new("chr1".to_string(), vec![1.0, f64::NAN])]);
        let mut m = PoissonMixture::init(&counts);
        assert!(m.fit(&counts, 10, 1e-6).is_err());
    }
}

//!
//! Peak-pattern scoring of genomic loci
//!
//! * `matrix`: `PositionMatrix`, the per-locus window of peak/no-peak
//!   probabilities
//! * `linear`: scoring primitives in the probability domain
//! * `logspace`: the same primitives on log-probabilities
//! * `model`: per-state factor tables, `Classifier` and `GenerativeModel`
//! * `driver`: evaluation of a `Scorer` along whole tracks
//!
pub mod driver;
pub mod linear;
pub mod logspace;
pub mod matrix;
pub mod model;

pub use driver::{eval_track, FeatureTracks};
pub use matrix::{Domain, PositionMatrix};
pub use model::{available_factors, Classifier, GenerativeModel, Pattern, Priors, Scorer};

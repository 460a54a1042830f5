//!
//! Pipeline jobs and the artifacts they read and write
//!
use crate::config::{Config, ModelKind, Stage};
use crate::feature::{Feature, State};
use std::path::PathBuf;

///
/// One unit of work. A job is rerun iff any of its targets is stale with
/// respect to its dependencies.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {
    /// read counts per bin
    Coverage(Feature),
    /// background/foreground mixture of the counts
    SingleFeatureEstimate(Feature),
    /// foreground posterior per bin
    SingleFeatureEval(Feature),
    /// regions of high foreground posterior of one feature
    SingleFeaturePeaks(Feature),
    /// per-state score from the peak patterns of every feature
    MultiFeatureEval(State),
    /// regions of high multi-feature score of one state
    MultiFeaturePeaks(State),
    /// HMM parameters
    SegmentationModel,
    /// Viterbi segmentation as BED
    Segmentation,
    /// posterior marginal track of every state
    Posterior,
    /// regions of high posterior of one state
    CallPeaks(State),
}

impl Job {
    ///
    /// Every job of a run, features before states and stages in pipeline
    /// order.
    ///
    pub fn all() -> Vec<Job> {
        let mut jobs = Vec::new();
        for &f in Feature::ALL.iter() {
            jobs.push(Job::Coverage(f));
            jobs.push(Job::SingleFeatureEstimate(f));
            jobs.push(Job::SingleFeatureEval(f));
            jobs.push(Job::SingleFeaturePeaks(f));
        }
        for &s in State::ALL.iter() {
            jobs.push(Job::MultiFeatureEval(s));
            jobs.push(Job::MultiFeaturePeaks(s));
        }
        jobs.push(Job::SegmentationModel);
        jobs.push(Job::Segmentation);
        jobs.push(Job::Posterior);
        for &s in State::ALL.iter() {
            jobs.push(Job::CallPeaks(s));
        }
        jobs
    }
    ///
    /// Files written by the job. The first target of `Coverage` is the
    /// track; fragment length diagnostics follow when reads are configured.
    ///
    pub fn targets(&self, config: &Config) -> Vec<PathBuf> {
        match *self {
            Job::Coverage(f) => {
                let mut targets = vec![config.path(Stage::Coverage, f.name())];
                if !config.inputs(f).is_empty() {
                    targets.push(config.path(Stage::FragmentLength, f.name()));
                }
                targets
            }
            Job::SingleFeatureEstimate(f) => vec![config.path(Stage::SingleFeatureModel, f.name())],
            Job::SingleFeatureEval(f) => vec![config.path(Stage::SingleFeature, f.name())],
            Job::SingleFeaturePeaks(f) => vec![config.path(Stage::SingleFeaturePeaks, f.name())],
            Job::MultiFeatureEval(s) => vec![config.path(Stage::MultiFeature, s.name())],
            Job::MultiFeaturePeaks(s) => vec![config.path(Stage::MultiFeaturePeaks, s.name())],
            Job::SegmentationModel => vec![config.singleton_path(Stage::SegmentationModel)],
            Job::Segmentation => vec![config.singleton_path(Stage::Segmentation)],
            Job::Posterior => State::ALL
                .iter()
                .map(|s| config.path(Stage::Posterior, s.name()))
                .collect(),
            Job::CallPeaks(s) => vec![config.path(Stage::Peaks, s.name())],
        }
    }
    ///
    /// Files whose modification makes the targets stale. `available`
    /// tells whether a feature has reads or a precomputed coverage; the
    /// evaluation of an unavailable feature has no upstream artifacts.
    ///
    pub fn deps<F>(&self, config: &Config, available: F) -> Vec<PathBuf>
    where
        F: Fn(Feature) -> bool,
    {
        let multi = || {
            State::ALL
                .iter()
                .map(|s| config.path(Stage::MultiFeature, s.name()))
                .collect::<Vec<_>>()
        };
        match *self {
            Job::Coverage(f) => {
                let mut deps: Vec<PathBuf> = config
                    .inputs(f)
                    .iter()
                    .map(|p| config.directory.join(p))
                    .collect();
                deps.extend(chrom_sizes(config));
                deps
            }
            Job::SingleFeatureEstimate(f) => vec![config.path(Stage::Coverage, f.name())],
            Job::SingleFeatureEval(f) => {
                if available(f) {
                    vec![
                        config.path(Stage::Coverage, f.name()),
                        config.path(Stage::SingleFeatureModel, f.name()),
                    ]
                } else {
                    chrom_sizes(config).into_iter().collect()
                }
            }
            Job::SingleFeaturePeaks(f) => vec![config.path(Stage::SingleFeature, f.name())],
            Job::MultiFeaturePeaks(s) => vec![config.path(Stage::MultiFeature, s.name())],
            Job::MultiFeatureEval(_) => {
                let mut deps: Vec<PathBuf> = Feature::ALL
                    .iter()
                    .map(|f| config.path(Stage::SingleFeature, f.name()))
                    .collect();
                if config.model == ModelKind::Generative {
                    deps.extend(config.priors.as_ref().map(|p| config.directory.join(p)));
                }
                deps
            }
            Job::SegmentationModel => multi(),
            Job::Segmentation | Job::Posterior => {
                let mut deps = multi();
                deps.push(config.singleton_path(Stage::SegmentationModel));
                deps
            }
            Job::CallPeaks(s) => vec![config.path(Stage::Posterior, s.name())],
        }
    }
}

fn chrom_sizes(config: &Config) -> Option<PathBuf> {
    config.chrom_sizes.as_ref().map(|p| config.directory.join(p))
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Job::Coverage(x) => write!(f, "coverage:{}", x),
            Job::SingleFeatureEstimate(x) => write!(f, "estimate-single-feature:{}", x),
            Job::SingleFeatureEval(x) => write!(f, "eval-single-feature:{}", x),
            Job::SingleFeaturePeaks(x) => write!(f, "call-single-feature-peaks:{}", x),
            Job::MultiFeatureEval(x) => write!(f, "eval-multi-feature:{}", x),
            Job::MultiFeaturePeaks(x) => write!(f, "call-multi-feature-peaks:{}", x),
            Job::SegmentationModel => write!(f, "segmentation-model"),
            Job::Segmentation => write!(f, "segmentation"),
            Job::Posterior => write!(f, "posterior-marginals"),
            Job::CallPeaks(x) => write!(f, "call-peaks:{}", x),
        }
    }
}

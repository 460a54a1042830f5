//!
//! Work done by each job
//!
//! Every function reads its upstream artifacts from the paths given by
//! `Config` and writes its targets; none of them checks staleness.
//!
use crate::config::{Config, ModelKind, Stage};
use crate::coverage::{count_fragments, CoverageOptions};
use crate::error::{Error, Result};
use crate::feature::{Feature, State};
use crate::hmm::{prepare_emissions, Decoder, Hmm};
use crate::mixture::{MixtureEstimator, PoissonMixture};
use crate::pattern::{
    available_factors, eval_track, Classifier, FeatureTracks, GenerativeModel, Priors, Scorer,
};
use crate::peaks::{call_peaks, segments, write_bed};
use crate::track::{check_same_genome, read_track, write_track, Contig, Genome, Track};
use crate::tying::{build, Template};
use log::{info, warn};
use ndarray::Array2;
use rayon::prelude::*;
use std::path::PathBuf;

/// foreground probability of a feature without data
pub const NO_INFORMATION: f64 = 0.5;

pub fn coverage(config: &Config, feature: Feature) -> Result<()> {
    let target = config.path(Stage::Coverage, feature.name());
    let inputs: Vec<PathBuf> = config
        .inputs(feature)
        .iter()
        .map(|p| config.directory.join(p))
        .collect();
    if inputs.is_empty() {
        return Err(Error::MissingInput(target));
    }
    if let Some(missing) = inputs.iter().find(|p| !p.exists()) {
        return Err(Error::MissingInput(missing.clone()));
    }
    let genome = config.genome()?;
    let coverage = count_fragments(&inputs, &genome, &CoverageOptions::from_config(config))?;
    write_track(&target, &coverage.track)?;
    coverage
        .fragment_length
        .save(config.path(Stage::FragmentLength, feature.name()))
}

pub fn estimate_single_feature(config: &Config, feature: Feature) -> Result<()> {
    let counts = read_track(config.path(Stage::Coverage, feature.name()))?;
    let mut model = PoissonMixture::init(&counts);
    model.fit(&counts, config.max_iterations, config.epsilon)?;
    model.save(config.path(Stage::SingleFeatureModel, feature.name()))
}

///
/// Foreground posterior of `feature`; an unavailable optional feature is
/// replaced by a flat track carrying no information.
///
pub fn eval_single_feature(config: &Config, feature: Feature, available: bool) -> Result<()> {
    let target = config.path(Stage::SingleFeature, feature.name());
    let track = if available {
        let counts = read_track(config.path(Stage::Coverage, feature.name()))?;
        let model = PoissonMixture::from_file(config.path(Stage::SingleFeatureModel, feature.name()))?;
        model.posterior_track(&counts)
    } else if feature.is_optional() {
        warn!(
            "no data for optional feature {}, using a flat track of {}",
            feature, NO_INFORMATION
        );
        Track::constant(&config.genome()?, NO_INFORMATION)
    } else {
        return Err(Error::MissingInput(config.path(Stage::Coverage, feature.name())));
    };
    write_track(&target, &track)
}

pub fn load_priors(config: &Config) -> Result<Priors> {
    match &config.priors {
        Some(path) => Priors::from_file(config.directory.join(path)),
        None => Ok(Priors::default()),
    }
}

pub fn single_feature_peaks(config: &Config, feature: Feature) -> Result<()> {
    let track = read_track(config.path(Stage::SingleFeature, feature.name()))?;
    let regions = call_peaks(&track, feature.name(), config.peak_threshold);
    info!("{} peaks of {}", regions.len(), feature);
    write_bed(config.path(Stage::SingleFeaturePeaks, feature.name()), &regions)
}

///
/// Score of `state` at every bin. Terms on features without data are
/// marginalized.
///
pub fn eval_multi_feature<F>(config: &Config, state: State, available: F) -> Result<()>
where
    F: Fn(Feature) -> bool,
{
    if available_factors(state, &available).is_none() {
        warn!("no data for any peak term of {}, the state is never called", state);
    }
    let peaks = Feature::ALL
        .iter()
        .map(|f| read_track(config.path(Stage::SingleFeature, f.name())))
        .collect::<Result<Vec<Track>>>()?;
    let tracks = FeatureTracks::new(peaks)?;
    let scorer: Box<dyn Scorer> = match config.model {
        ModelKind::Classifier => Box::new(Classifier::with_features(
            state,
            config.window_size,
            available,
        )),
        ModelKind::Generative => Box::new(GenerativeModel::with_features(
            state,
            config.window_size,
            &load_priors(config)?,
            available,
        )),
    };
    let track = eval_track(scorer.as_ref(), &tracks)?;
    write_track(config.path(Stage::MultiFeature, state.name()), &track)
}

///
/// Peaks of the multi-feature score, compared to the threshold as a
/// probability in both models.
///
pub fn multi_feature_peaks(config: &Config, state: State) -> Result<()> {
    let track = read_track(config.path(Stage::MultiFeature, state.name()))?;
    let track = match config.model {
        ModelKind::Classifier => track,
        ModelKind::Generative => track.map(f64::exp),
    };
    let regions = call_peaks(&track, state.name(), config.peak_threshold);
    info!("{} multi-feature peaks of {}", regions.len(), state);
    write_bed(config.path(Stage::MultiFeaturePeaks, state.name()), &regions)
}

///
/// Emission log-likelihoods of every contig from the multi-feature tracks
///
fn load_emissions(config: &Config) -> Result<(Genome, Vec<Array2<f64>>)> {
    let tracks = State::ALL
        .iter()
        .map(|s| read_track(config.path(Stage::MultiFeature, s.name())))
        .collect::<Result<Vec<Track>>>()?;
    let refs: Vec<&Track> = tracks.iter().collect();
    let genome = check_same_genome(&refs)?;
    let log_scores = config.model == ModelKind::Generative;
    let mut emissions = Vec::with_capacity(genome.contigs.len());
    let mut n_degenerate = 0;
    for (c, (_, len)) in genome.contigs.iter().enumerate() {
        let mut scores = Array2::zeros((*len, State::ALL.len()));
        for (s, track) in tracks.iter().enumerate() {
            for (t, &v) in track.contigs[c].values.iter().enumerate() {
                scores[[t, s]] = v;
            }
        }
        let (e, n) = prepare_emissions(&scores, log_scores, State::fallback().index())?;
        n_degenerate += n;
        emissions.push(e);
    }
    if n_degenerate > 0 {
        info!(
            "{} bins without any state support were assigned to {}",
            n_degenerate,
            State::fallback()
        );
    }
    Ok((genome, emissions))
}

fn chromatin_hmm(config: &Config) -> Result<Hmm> {
    let tied = build(&Template::chromatin(), config.tying_mode)?;
    Ok(Hmm::new(tied))
}

pub fn segmentation_model(config: &Config) -> Result<()> {
    let (_, emissions) = load_emissions(config)?;
    let mut hmm = chromatin_hmm(config)?;
    let ll = hmm.estimate(&emissions, config.max_iterations, config.epsilon)?;
    info!("segmentation model log_likelihood={}", ll);
    hmm.save(config.singleton_path(Stage::SegmentationModel))
}

fn trained_hmm(config: &Config) -> Result<Hmm> {
    let mut hmm = chromatin_hmm(config)?;
    hmm.load_params(config.singleton_path(Stage::SegmentationModel))?;
    Ok(hmm)
}

pub fn segmentation(config: &Config) -> Result<()> {
    let (genome, emissions) = load_emissions(config)?;
    let hmm = trained_hmm(config)?;
    let paths: Vec<Vec<usize>> = emissions.par_iter().map(|e| hmm.viterbi(e)).collect();
    let regions: Vec<_> = genome
        .contigs
        .iter()
        .zip(paths.iter())
        .flat_map(|((name, _), path)| segments(name, path, genome.bin_size))
        .collect();
    info!("{} segments", regions.len());
    write_bed(config.singleton_path(Stage::Segmentation), &regions)
}

pub fn posterior(config: &Config) -> Result<()> {
    let (genome, emissions) = load_emissions(config)?;
    let hmm = trained_hmm(config)?;
    let marginals: Vec<Array2<f64>> = emissions.par_iter().map(|e| hmm.posterior(e)).collect();
    for (s, state) in State::ALL.iter().enumerate() {
        let contigs = genome
            .contigs
            .iter()
            .zip(marginals.iter())
            .map(|((name, _), m)| Contig::new(name.clone(), m.column(s).to_vec()))
            .collect();
        let track = Track::new(genome.bin_size, contigs);
        write_track(config.path(Stage::Posterior, state.name()), &track)?;
    }
    Ok(())
}

pub fn peaks(config: &Config, state: State) -> Result<()> {
    let posterior = read_track(config.path(Stage::Posterior, state.name()))?;
    let regions = call_peaks(&posterior, state.name(), config.peak_threshold);
    info!("{} peaks of {}", regions.len(), state);
    write_bed(config.path(Stage::Peaks, state.name()), &regions)
}

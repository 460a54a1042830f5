//!
//! Run configuration loaded from a JSON file
//!
//! Every artifact path is produced by `Config::path`, which looks up an
//! explicit override first and falls back to completing the stage's
//! `PathTemplate` with the feature/state name.
//!
use crate::error::{Error, Result};
use crate::feature::{Feature, State};
use crate::track::Genome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

///
/// Kind of artifact produced by the pipeline.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Coverage,
    FragmentLength,
    SingleFeatureModel,
    SingleFeature,
    SingleFeaturePeaks,
    MultiFeature,
    MultiFeaturePeaks,
    SegmentationModel,
    Segmentation,
    Posterior,
    Peaks,
}

///
/// What the artifacts of a stage are named after
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Names {
    Feature,
    State,
    /// one artifact per run
    Singleton,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Coverage,
        Stage::FragmentLength,
        Stage::SingleFeatureModel,
        Stage::SingleFeature,
        Stage::SingleFeaturePeaks,
        Stage::MultiFeature,
        Stage::MultiFeaturePeaks,
        Stage::SegmentationModel,
        Stage::Segmentation,
        Stage::Posterior,
        Stage::Peaks,
    ];
    pub fn name(self) -> &'static str {
        match self {
            Stage::Coverage => "coverage",
            Stage::FragmentLength => "fragment-length",
            Stage::SingleFeatureModel => "single-feature-model",
            Stage::SingleFeature => "single-feature",
            Stage::SingleFeaturePeaks => "single-feature-peaks",
            Stage::MultiFeature => "multi-feature",
            Stage::MultiFeaturePeaks => "multi-feature-peaks",
            Stage::SegmentationModel => "segmentation-model",
            Stage::Segmentation => "segmentation",
            Stage::Posterior => "posterior",
            Stage::Peaks => "peaks",
        }
    }
    pub fn names(self) -> Names {
        match self {
            Stage::Coverage
            | Stage::FragmentLength
            | Stage::SingleFeatureModel
            | Stage::SingleFeature
            | Stage::SingleFeaturePeaks => Names::Feature,
            Stage::MultiFeature | Stage::MultiFeaturePeaks | Stage::Posterior | Stage::Peaks => {
                Names::State
            }
            Stage::SegmentationModel | Stage::Segmentation => Names::Singleton,
        }
    }
    fn default_template(self) -> PathTemplate {
        let (directory, suffix) = match self {
            Stage::Coverage => ("coverage", ".bedgraph.gz"),
            Stage::FragmentLength => ("coverage", ".json"),
            Stage::SingleFeatureModel => ("single-feature", ".json"),
            Stage::SingleFeature => ("single-feature", ".json.gz"),
            Stage::SingleFeaturePeaks => ("peaks", ".bed"),
            Stage::MultiFeature => ("multi-feature", ".json.gz"),
            Stage::MultiFeaturePeaks => ("peaks", ".bed"),
            Stage::SegmentationModel => ("segmentation", ".json"),
            Stage::Segmentation => ("segmentation", ".bed"),
            Stage::Posterior => ("posterior", ".json.gz"),
            Stage::Peaks => ("peaks", ".bed"),
        };
        PathTemplate {
            directory: PathBuf::from(directory),
            prefix: format!("{}-", self.name()),
            suffix: suffix.to_string(),
        }
    }
}

///
/// `directory/prefix{name}suffix`
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathTemplate {
    pub directory: PathBuf,
    pub prefix: String,
    pub suffix: String,
}

///
/// Complete a template with a name. Relative directories are resolved
/// against `root`.
///
pub fn complete_path(root: &Path, template: &PathTemplate, name: &str) -> PathBuf {
    root.join(&template.directory)
        .join(format!("{}{}{}", template.prefix, name, template.suffix))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TyingMode {
    Likelihood,
    Posterior,
}

///
/// Emission scores fed to the segmentation
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// probability-domain classifiers with fixed weights
    Classifier,
    /// log-domain generative models weighted by priors
    Generative,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// root of every relative path
    pub directory: PathBuf,
    pub bin_size: usize,
    /// `name<TAB>length` file defining the contigs of every track
    pub chrom_sizes: Option<PathBuf>,
    /// number of bins in a PositionMatrix window (odd)
    pub window_size: usize,
    pub threads: usize,
    pub verbose: usize,
    pub tying_mode: TyingMode,
    pub model: ModelKind,
    /// JSON file with generative-model priors
    pub priors: Option<PathBuf>,
    /// fragment length of single-end reads when it is not estimated
    pub fragment_length: usize,
    pub estimate_fragment_length: bool,
    /// inclusive range of candidate fragment lengths
    pub fragment_length_range: (usize, usize),
    /// resolution of the fragment length estimate
    pub fragment_length_step: usize,
    pub paired_as_single_end: bool,
    pub min_mapq: u32,
    pub filter_duplicates: bool,
    pub exclude_contigs: Vec<String>,
    pub peak_threshold: f64,
    pub max_iterations: usize,
    pub epsilon: f64,
    /// read files of each feature
    pub inputs: BTreeMap<Feature, Vec<PathBuf>>,
    pub templates: BTreeMap<Stage, PathTemplate>,
    /// `"stage:name"` (or `"stage"` for singletons) to explicit path
    pub overrides: BTreeMap<String, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            directory: PathBuf::from("."),
            bin_size: 200,
            chrom_sizes: None,
            window_size: 5,
            threads: 1,
            verbose: 0,
            tying_mode: TyingMode::Posterior,
            model: ModelKind::Classifier,
            priors: None,
            fragment_length: 200,
            estimate_fragment_length: true,
            fragment_length_range: (100, 500),
            fragment_length_step: 10,
            paired_as_single_end: false,
            min_mapq: 0,
            filter_duplicates: true,
            exclude_contigs: Vec::new(),
            peak_threshold: 0.9,
            max_iterations: 20,
            epsilon: 1e-4,
            inputs: BTreeMap::new(),
            templates: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        let config: Config = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::json(path, e))?;
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<()> {
        if self.bin_size == 0 {
            return Err(Error::Config("bin_size must be positive".to_string()));
        }
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(Error::Config(format!(
                "window_size must be odd, got {}",
                self.window_size
            )));
        }
        if self.threads == 0 {
            return Err(Error::Config("threads must be positive".to_string()));
        }
        if !(self.peak_threshold > 0.0 && self.peak_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "peak_threshold must be in (0, 1], got {}",
                self.peak_threshold
            )));
        }
        if self.fragment_length == 0 {
            return Err(Error::Config("fragment_length must be positive".to_string()));
        }
        let (min, max) = self.fragment_length_range;
        if min == 0 || min > max || self.fragment_length_step == 0 {
            return Err(Error::Config(format!(
                "invalid fragment length range {}..={} with step {}",
                min, max, self.fragment_length_step
            )));
        }
        for key in self.overrides.keys() {
            validate_override(key)?;
        }
        Ok(())
    }
    pub fn template(&self, stage: Stage) -> PathTemplate {
        self.templates
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| stage.default_template())
    }
    ///
    /// Path of the artifact of `stage` for `name`
    ///
    pub fn path(&self, stage: Stage, name: &str) -> PathBuf {
        let key = format!("{}:{}", stage.name(), name);
        match self.overrides.get(&key) {
            Some(path) => self.directory.join(path),
            None => complete_path(&self.directory, &self.template(stage), name),
        }
    }
    ///
    /// Path of a per-run artifact (one per stage, no name)
    ///
    pub fn singleton_path(&self, stage: Stage) -> PathBuf {
        match self.overrides.get(stage.name()) {
            Some(path) => self.directory.join(path),
            None => {
                let template = self.template(stage);
                self.directory.join(&template.directory).join(format!(
                    "{}{}",
                    template.prefix.trim_end_matches('-'),
                    template.suffix
                ))
            }
        }
    }
    ///
    /// Contigs and bin size shared by every track of the run
    ///
    pub fn genome(&self) -> Result<Genome> {
        let path = self
            .chrom_sizes
            .as_ref()
            .ok_or_else(|| Error::Config("chrom_sizes is not set".to_string()))?;
        Genome::from_chrom_sizes(self.directory.join(path), self.bin_size)
    }
    pub fn inputs(&self, feature: Feature) -> &[PathBuf] {
        self.inputs.get(&feature).map_or(&[], |v| v.as_slice())
    }
    ///
    /// `log::LevelFilter` corresponding to `verbose`
    ///
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    }
}

///
/// An override key is `stage:name` with the canonical name of a feature or
/// state, or the bare stage for singletons.
///
fn validate_override(key: &str) -> Result<()> {
    let (stage_name, name) = match key.split_once(':') {
        Some((stage, name)) => (stage, Some(name)),
        None => (key, None),
    };
    let stage = Stage::ALL
        .iter()
        .find(|s| s.name() == stage_name)
        .ok_or_else(|| Error::Config(format!("override for unknown stage `{}`", key)))?;
    let canonical = match (stage.names(), name) {
        (Names::Feature, Some(name)) => name.parse::<Feature>()?.name(),
        (Names::State, Some(name)) => name.parse::<State>()?.name(),
        (Names::Singleton, None) => return Ok(()),
        (Names::Singleton, Some(_)) => {
            return Err(Error::Config(format!(
                "override `{}`: {} takes no name",
                key, stage_name
            )))
        }
        (_, None) => {
            return Err(Error::Config(format!(
                "override `{}`: {} needs a name",
                key, stage_name
            )))
        }
    };
    match name {
        Some(name) if name != canonical => Err(Error::Config(format!(
            "override `{}`: write the name as `{}`",
            key, canonical
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }
    #[test]
    fn template_completion() {
        let config = Config {
            directory: PathBuf::from("/data"),
            ..Config::default()
        };
        assert_eq!(
            config.path(Stage::Coverage, "atac"),
            PathBuf::from("/data/coverage/coverage-atac.bedgraph.gz")
        );
        assert_eq!(
            config.path(Stage::MultiFeature, "PA"),
            PathBuf::from("/data/multi-feature/multi-feature-PA.json.gz")
        );
        assert_eq!(
            config.singleton_path(Stage::Segmentation),
            PathBuf::from("/data/segmentation/segmentation.bed")
        );
    }
    #[test]
    fn overrides_take_precedence() {
        let json = r#"{
            "directory": "/data",
            "overrides": { "coverage:atac": "/elsewhere/atac.bedgraph", "segmentation": "seg.bed" },
            "templates": { "posterior": { "directory": "post", "prefix": "p-", "suffix": ".bedgraph" } },
            "inputs": { "atac": ["atac.bed.gz"], "rna-low": [] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.path(Stage::Coverage, "atac"),
            PathBuf::from("/elsewhere/atac.bedgraph")
        );
        assert_eq!(
            config.path(Stage::Coverage, "rna"),
            PathBuf::from("/data/coverage/coverage-rna.bedgraph.gz")
        );
        assert_eq!(
            config.singleton_path(Stage::Segmentation),
            PathBuf::from("/data/seg.bed")
        );
        assert_eq!(
            config.path(Stage::Posterior, "EA"),
            PathBuf::from("/data/post/p-EA.bedgraph")
        );
        assert_eq!(config.inputs(Feature::Atac), &[PathBuf::from("atac.bed.gz")]);
        assert!(config.inputs(Feature::Rna).is_empty());
    }
    #[test]
    fn malformed_configs_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{ "bin_sz": 10 }"#).is_err());
        assert!(serde_json::from_str::<Config>(r#"{ "inputs": { "h3k36me3": [] } }"#).is_err());
        let even = Config {
            window_size: 4,
            ..Config::default()
        };
        assert!(matches!(even.validate(), Err(Error::Config(_))));
        let bad_override = Config {
            overrides: vec![("nonsense:PA".to_string(), PathBuf::from("x"))]
                .into_iter()
                .collect(),
            ..Config::default()
        };
        assert!(bad_override.validate().is_err());
    }
    #[test]
    fn override_names_are_checked() {
        let with = |key: &str| Config {
            overrides: vec![(key.to_string(), PathBuf::from("x"))]
                .into_iter()
                .collect(),
            ..Config::default()
        };
        for key in [
            "coverage:atac",
            "fragment-length:rna-low",
            "single-feature-peaks:control",
            "multi-feature-peaks:EA",
            "posterior:NS",
            "segmentation",
            "segmentation-model",
        ]
        .iter()
        {
            assert!(with(key).validate().is_ok(), "{}", key);
        }
        assert!(matches!(
            with("coverage:h3k36me3").validate(),
            Err(Error::UnknownName { kind: "feature", .. })
        ));
        assert!(matches!(
            with("posterior:XX").validate(),
            Err(Error::UnknownName { kind: "state", .. })
        ));
        // features and states are not interchangeable
        assert!(with("coverage:PA").validate().is_err());
        assert!(with("peaks:atac").validate().is_err());
        // names must be written as in artifact paths
        assert!(matches!(with("peaks:ea").validate(), Err(Error::Config(_))));
        assert!(matches!(with("segmentation:PA").validate(), Err(Error::Config(_))));
        assert!(matches!(with("posterior").validate(), Err(Error::Config(_))));
    }
    #[test]
    fn fragment_length_range_is_checked() {
        let config = Config {
            fragment_length_range: (300, 200),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        let config: Config =
            serde_json::from_str(r#"{ "fragment_length_range": [80, 300], "fragment_length_step": 5 }"#)
                .unwrap();
        config.validate().unwrap();
        assert_eq!(config.fragment_length_range, (80, 300));
    }
}

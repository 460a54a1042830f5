//!
//! end-to-end runs of the pipeline on a tiny genome
//!
use chromseg::config::{Config, ModelKind, Stage, TyingMode};
use chromseg::feature::{Feature, State};
use chromseg::pipeline::{Job, Orchestrator};
use chromseg::track::read_track;
use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const N_BINS: usize = 30;
const BIN_SIZE: usize = 200;

/// bins with many reads of each required feature
fn enriched(feature: Feature) -> Vec<usize> {
    match feature {
        Feature::Atac => vec![5, 6, 20],
        Feature::H3k27ac => vec![4, 5, 6, 7],
        Feature::H3k4me3 => vec![5, 6],
        Feature::H3k4me1 => vec![19, 20, 21],
        Feature::H3k27me3 => vec![12, 13, 14],
        Feature::Rna => vec![24, 25, 26, 27],
        _ => vec![],
    }
}

fn write_reads(path: &Path, feature: Feature) {
    let mut s = String::new();
    for bin in 0..N_BINS {
        let n = if enriched(feature).contains(&bin) { 25 } else { 1 };
        for i in 0..n {
            let start = bin * BIN_SIZE + i;
            s.push_str(&format!("chr1\t{}\t{}\tr{}\t60\t+\n", start, start + 50, i));
        }
    }
    std::fs::write(path, s).unwrap();
}

fn setup(dir: &Path) -> Config {
    std::fs::write(
        dir.join("genome.sizes"),
        format!("chr1\t{}\n", N_BINS * BIN_SIZE),
    )
    .unwrap();
    let mut config = Config {
        directory: dir.to_path_buf(),
        chrom_sizes: Some(PathBuf::from("genome.sizes")),
        window_size: 3,
        max_iterations: 5,
        threads: 2,
        ..Config::default()
    };
    for &f in Feature::ALL.iter().filter(|f| !f.is_optional()) {
        let name = format!("{}.bed", f);
        write_reads(&dir.join(&name), f);
        config.inputs.insert(f, vec![PathBuf::from(name)]);
    }
    config
}

fn all_outputs() -> Vec<Job> {
    let mut jobs = vec![Job::Segmentation];
    jobs.extend(State::ALL.iter().map(|&s| Job::CallPeaks(s)));
    jobs.extend(State::ALL.iter().map(|&s| Job::MultiFeaturePeaks(s)));
    jobs.extend(Feature::ALL.iter().map(|&f| Job::SingleFeaturePeaks(f)));
    jobs
}

/// state of every bin from a BED of segments
fn states_per_bin(bed: &str) -> Vec<State> {
    let mut states = Vec::new();
    for line in bed.lines() {
        let f: Vec<&str> = line.split('\t').collect();
        let state: State = f[3].parse().unwrap();
        let start = f[1].parse::<usize>().unwrap() / BIN_SIZE;
        let end = f[2].parse::<usize>().unwrap() / BIN_SIZE;
        assert_eq!(states.len(), start);
        states.extend(std::iter::repeat(state).take(end - start));
    }
    states
}

/// (start, end) of every region of a BED file
fn regions(path: &Path) -> Vec<(usize, usize)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| {
            let f: Vec<&str> = l.split('\t').collect();
            (f[1].parse().unwrap(), f[2].parse().unwrap())
        })
        .collect()
}

#[test]
fn full_run_then_noop() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let o = Orchestrator::new(config.clone()).unwrap();
    let executed = o.run(&all_outputs()).unwrap();
    assert!(executed.contains(&Job::Coverage(Feature::Atac)));
    assert!(executed.contains(&Job::SingleFeatureEval(Feature::Control)));
    assert!(!executed.contains(&Job::Coverage(Feature::Control)));

    // optional features without data are flat
    let control = read_track(config.path(Stage::SingleFeature, "control")).unwrap();
    assert!(control.contigs[0].values.iter().all(|&v| v == 0.5));
    assert_eq!(control.contigs[0].values.len(), N_BINS);

    let atac = read_track(config.path(Stage::SingleFeature, "atac")).unwrap();
    assert!(atac.contigs[0].values[5] > 0.9);
    assert!(atac.contigs[0].values[10] < 0.1);

    let segmentation = config.singleton_path(Stage::Segmentation);
    let states = states_per_bin(&std::fs::read_to_string(&segmentation).unwrap());
    assert_eq!(states.len(), N_BINS);
    // promoter, then polycomb-repressed bins
    assert_eq!(&states[5..7], &[State::PA, State::PA]);
    assert!(states[12..15].iter().all(|&s| s == State::R1 || s == State::BI));
    assert!(!states.contains(&State::CL));

    for &s in State::ALL.iter() {
        assert!(config.path(Stage::Peaks, s.name()).exists());
        assert!(config.path(Stage::MultiFeaturePeaks, s.name()).exists());
    }
    let posterior: Vec<_> = State::ALL
        .iter()
        .map(|s| read_track(config.path(Stage::Posterior, s.name())).unwrap())
        .collect();
    let argmax: Vec<State> = (0..N_BINS)
        .map(|bin| {
            let total: f64 = posterior.iter().map(|t| t.contigs[0].values[bin]).sum();
            assert!((total - 1.0).abs() < 1e-6);
            let best = (0..State::ALL.len())
                .max_by(|&a, &b| {
                    let x = posterior[a].contigs[0].values[bin];
                    let y = posterior[b].contigs[0].values[bin];
                    x.partial_cmp(&y).unwrap()
                })
                .unwrap();
            State::ALL[best]
        })
        .collect();
    assert_eq!(&argmax[5..7], &[State::PA, State::PA]);
    assert!(argmax[12..15].iter().all(|&s| s == State::R1 || s == State::BI));
    assert!(!argmax.contains(&State::CL));

    // control has no data: CL has no evidence anywhere
    let cl = read_track(config.path(Stage::MultiFeature, "CL")).unwrap();
    assert!(cl.contigs[0].values.iter().all(|&v| v == 0.0));

    let b = BIN_SIZE;
    assert_eq!(
        regions(&config.path(Stage::SingleFeaturePeaks, "atac")),
        vec![(5 * b, 7 * b), (20 * b, 21 * b)]
    );
    assert!(config.path(Stage::FragmentLength, "atac").exists());
    assert!(!config.path(Stage::FragmentLength, "control").exists());

    // second run: nothing to do, outputs untouched
    let before = std::fs::read(&segmentation).unwrap();
    let o = Orchestrator::new(config.clone()).unwrap();
    assert!(o.run(&all_outputs()).unwrap().is_empty());
    assert_eq!(std::fs::read(&segmentation).unwrap(), before);
}

#[test]
fn touched_input_reruns_downstream_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let request = [Job::SingleFeatureEval(Feature::Atac), Job::SingleFeatureEval(Feature::Rna)];
    let o = Orchestrator::new(config.clone()).unwrap();
    assert_eq!(o.run(&request).unwrap().len(), 6);

    let reads = File::options()
        .write(true)
        .open(dir.path().join("atac.bed"))
        .unwrap();
    reads
        .set_times(FileTimes::new().set_modified(SystemTime::now() + Duration::from_secs(60)))
        .unwrap();
    let executed = o.run(&request).unwrap();
    assert_eq!(
        executed,
        vec![
            Job::Coverage(Feature::Atac),
            Job::SingleFeatureEstimate(Feature::Atac),
            Job::SingleFeatureEval(Feature::Atac),
        ]
    );
}

#[test]
fn generative_model_with_likelihood_tying() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        model: ModelKind::Generative,
        tying_mode: TyingMode::Likelihood,
        ..setup(dir.path())
    };
    let o = Orchestrator::new(config.clone()).unwrap();
    o.run(&[Job::Posterior]).unwrap();
    let multi = read_track(config.path(Stage::MultiFeature, "PA")).unwrap();
    assert!(multi.contigs[0].values.iter().all(|&v| v <= 1e-9));
    let pa = read_track(config.path(Stage::Posterior, "PA")).unwrap();
    assert!(pa.contigs[0]
        .values
        .iter()
        .all(|&v| (-1e-9..=1.0 + 1e-9).contains(&v)));
    assert!(!config.singleton_path(Stage::Segmentation).exists());
}

#[test]
fn missing_required_reads() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.inputs.remove(&Feature::H3k27ac);
    let o = Orchestrator::new(config).unwrap();
    let r = o.run(&[Job::MultiFeatureEval(State::EA)]);
    assert!(matches!(r, Err(chromseg::error::Error::MissingInput(_))));
}

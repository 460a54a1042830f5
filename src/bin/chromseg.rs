use anyhow::Context;
use chromseg::config::Config;
use chromseg::feature::{parse_features, parse_states};
use chromseg::pipeline::{Job, Orchestrator};
use clap::{Parser, Subcommand};
use log::error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, about, version)]
struct Opts {
    /// JSON configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    /// Number of worker threads (overrides the configuration)
    #[clap(short = 't', long, global = true)]
    threads: Option<usize>,
    /// Increase verbosity (-v info, -vv debug)
    #[clap(short, long, global = true, parse(from_occurrences))]
    verbose: usize,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count reads per bin
    Coverage {
        /// Features (default: all)
        features: Vec<String>,
    },
    /// Fit the background/foreground mixture of each feature
    EstimateSingleFeature { features: Vec<String> },
    /// Foreground posterior of each feature
    EvalSingleFeature { features: Vec<String> },
    /// Regions of high foreground posterior of each feature
    CallSingleFeaturePeaks { features: Vec<String> },
    /// Peak-pattern score of each state
    EvalMultiFeature {
        /// States (default: all)
        states: Vec<String>,
    },
    /// Regions of high peak-pattern score of each state
    CallMultiFeaturePeaks { states: Vec<String> },
    /// Estimate the HMM and write the Viterbi segmentation
    Segmentation,
    /// Posterior marginal of every state
    PosteriorMarginals,
    /// Regions of high posterior of each state
    CallPeaks { states: Vec<String> },
}

fn requested_jobs(command: &Commands) -> chromseg::error::Result<Vec<Job>> {
    let jobs = match command {
        Commands::Coverage { features } => parse_features(features)?
            .into_iter()
            .map(Job::Coverage)
            .collect(),
        Commands::EstimateSingleFeature { features } => parse_features(features)?
            .into_iter()
            .map(Job::SingleFeatureEstimate)
            .collect(),
        Commands::EvalSingleFeature { features } => parse_features(features)?
            .into_iter()
            .map(Job::SingleFeatureEval)
            .collect(),
        Commands::CallSingleFeaturePeaks { features } => parse_features(features)?
            .into_iter()
            .map(Job::SingleFeaturePeaks)
            .collect(),
        Commands::EvalMultiFeature { states } => parse_states(states)?
            .into_iter()
            .map(Job::MultiFeatureEval)
            .collect(),
        Commands::CallMultiFeaturePeaks { states } => parse_states(states)?
            .into_iter()
            .map(Job::MultiFeaturePeaks)
            .collect(),
        Commands::Segmentation => vec![Job::Segmentation],
        Commands::PosteriorMarginals => vec![Job::Posterior],
        Commands::CallPeaks { states } => parse_states(states)?
            .into_iter()
            .map(Job::CallPeaks)
            .collect(),
    };
    Ok(jobs)
}

fn run(opts: &Opts) -> anyhow::Result<()> {
    let mut config = match &opts.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(threads) = opts.threads {
        config.threads = threads;
    }
    config.verbose = config.verbose.max(opts.verbose);
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    let jobs = requested_jobs(&opts.command)?;
    let orchestrator = Orchestrator::new(config)?;
    let executed = orchestrator.run(&jobs)?;
    println!("# n_executed={}", executed.len());
    Ok(())
}

fn main() {
    let opts: Opts = Opts::parse();
    println!("# started_at={}", chrono::Local::now());
    println!("# opts={:?}", opts);
    if let Err(e) = run(&opts) {
        // logger may not be initialized yet
        if log::log_enabled!(log::Level::Error) {
            error!("{:#}", e);
        } else {
            eprintln!("error: {:#}", e);
        }
        std::process::exit(1);
    }
    println!("# finished_at={}", chrono::Local::now());
}

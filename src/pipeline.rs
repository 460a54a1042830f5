//!
//! Dependency-driven execution of the pipeline
//!
//! Jobs form a DAG whose edges connect the producer of an artifact to
//! its consumers. A run visits only the ancestors of the requested jobs,
//! groups them by depth and executes the stale jobs of each depth in
//! parallel. Every depth is a barrier and the first error aborts the run.
//!
pub mod job;
pub mod stages;

pub use job::Job;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::stale::any_stale;
use fnv::FnvHashMap;
use log::{debug, info};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct Orchestrator {
    config: Config,
    graph: DiGraph<Job, ()>,
    nodes: FnvHashMap<Job, NodeIndex>,
    /// features with reads or a precomputed coverage
    available: Vec<bool>,
    /// jobs in topological order
    order: Vec<NodeIndex>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Orchestrator> {
        config.validate()?;
        let available: Vec<bool> = Feature::ALL
            .iter()
            .map(|&f| {
                !config.inputs(f).is_empty() || Job::Coverage(f).targets(&config)[0].exists()
            })
            .collect();

        let mut graph = DiGraph::new();
        let mut nodes = FnvHashMap::default();
        let mut producer: FnvHashMap<PathBuf, NodeIndex> = FnvHashMap::default();
        for job in Job::all() {
            let v = graph.add_node(job);
            nodes.insert(job, v);
            for target in job.targets(&config) {
                producer.insert(target, v);
            }
        }
        for v in graph.node_indices().collect::<Vec<_>>() {
            let job = graph[v];
            for dep in job.deps(&config, |f| available[f.index()]) {
                if let Some(&u) = producer.get(&dep) {
                    graph.update_edge(u, v, ());
                }
            }
        }
        let order = toposort(&graph, None).map_err(|cycle| {
            Error::Config(format!(
                "artifact paths form a cycle through {}",
                graph[cycle.node_id()]
            ))
        })?;
        Ok(Orchestrator {
            config,
            graph,
            nodes,
            available,
            order,
        })
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    fn is_available(&self, feature: Feature) -> bool {
        self.available[feature.index()]
    }
    ///
    /// Ancestors of `requested` (themselves included) grouped by depth;
    /// jobs of one group never depend on each other.
    ///
    pub fn plan(&self, requested: &[Job]) -> Vec<Vec<Job>> {
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::empty(reversed);
        let mut visited = vec![false; self.graph.node_count()];
        for job in requested {
            dfs.move_to(self.nodes[job]);
            while let Some(v) = dfs.next(reversed) {
                visited[v.index()] = true;
            }
        }
        let mut depth = vec![0; self.graph.node_count()];
        let mut levels: BTreeMap<usize, Vec<Job>> = BTreeMap::new();
        for &v in self.order.iter().filter(|v| visited[v.index()]) {
            let d = self
                .graph
                .neighbors_directed(v, Direction::Incoming)
                .filter(|u| visited[u.index()])
                .map(|u| depth[u.index()] + 1)
                .max()
                .unwrap_or(0);
            depth[v.index()] = d;
            levels.entry(d).or_default().push(self.graph[v]);
        }
        levels
            .into_iter()
            .map(|(_, mut jobs)| {
                jobs.sort();
                jobs
            })
            .collect()
    }
    fn is_stale(&self, job: Job) -> bool {
        let targets = job.targets(&self.config);
        let deps = job.deps(&self.config, |f| self.is_available(f));
        let stale = any_stale(&targets, &deps);
        debug!("{} stale={}", job, stale);
        stale
    }
    fn run_job(&self, job: Job) -> Result<()> {
        info!("running {}", job);
        let config = &self.config;
        match job {
            Job::Coverage(f) => stages::coverage(config, f),
            Job::SingleFeatureEstimate(f) => stages::estimate_single_feature(config, f),
            Job::SingleFeatureEval(f) => {
                stages::eval_single_feature(config, f, self.is_available(f))
            }
            Job::SingleFeaturePeaks(f) => stages::single_feature_peaks(config, f),
            Job::MultiFeatureEval(s) => {
                stages::eval_multi_feature(config, s, |f| self.is_available(f))
            }
            Job::MultiFeaturePeaks(s) => stages::multi_feature_peaks(config, s),
            Job::SegmentationModel => stages::segmentation_model(config),
            Job::Segmentation => stages::segmentation(config),
            Job::Posterior => stages::posterior(config),
            Job::CallPeaks(s) => stages::peaks(config, s),
        }?;
        info!("finished {}", job);
        Ok(())
    }
    ///
    /// Bring the targets of `requested` up to date. Returns the jobs that
    /// were executed, in execution order.
    ///
    pub fn run(&self, requested: &[Job]) -> Result<Vec<Job>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()?;
        let mut executed = Vec::new();
        for (depth, jobs) in self.plan(requested).into_iter().enumerate() {
            let stale: Vec<Job> = jobs.into_iter().filter(|&j| self.is_stale(j)).collect();
            if stale.is_empty() {
                continue;
            }
            info!("depth {}: {} jobs", depth, stale.len());
            pool.install(|| {
                stale
                    .par_iter()
                    .map(|&job| self.run_job(job))
                    .collect::<Result<Vec<()>>>()
            })?;
            executed.extend(stale);
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::State;

    fn orchestrator() -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            directory: dir.path().to_path_buf(),
            ..Config::default()
        };
        for &f in Feature::ALL.iter().filter(|f| !f.is_optional()) {
            config
                .inputs
                .insert(f, vec![PathBuf::from(format!("{}.bed", f))]);
        }
        (dir, Orchestrator::new(config).unwrap())
    }

    #[test]
    fn plan_visits_only_ancestors() {
        let (_dir, o) = orchestrator();
        let plan = o.plan(&[Job::SingleFeatureEval(Feature::Atac)]);
        assert_eq!(
            plan,
            vec![
                vec![Job::Coverage(Feature::Atac)],
                vec![Job::SingleFeatureEstimate(Feature::Atac)],
                vec![Job::SingleFeatureEval(Feature::Atac)],
            ]
        );
        // no data for control: evaluated without upstream jobs
        let plan = o.plan(&[Job::SingleFeatureEval(Feature::Control)]);
        assert_eq!(plan, vec![vec![Job::SingleFeatureEval(Feature::Control)]]);
    }
    #[test]
    fn plan_levels_are_barriers() {
        let (_dir, o) = orchestrator();
        let plan = o.plan(&[Job::CallPeaks(State::PA)]);
        let position: FnvHashMap<Job, usize> = plan
            .iter()
            .enumerate()
            .flat_map(|(d, jobs)| jobs.iter().map(move |&j| (j, d)))
            .collect();
        for (&job, &d) in position.iter() {
            let v = o.nodes[&job];
            for u in o.graph.neighbors_directed(v, Direction::Incoming) {
                assert!(position[&o.graph[u]] < d, "{} before {}", o.graph[u], job);
            }
        }
        assert!(position.contains_key(&Job::Posterior));
        assert!(position.contains_key(&Job::SegmentationModel));
        assert!(!position.contains_key(&Job::Segmentation));
        assert!(!position.contains_key(&Job::CallPeaks(State::EA)));
        assert!(!position.contains_key(&Job::Coverage(Feature::H3k9me3)));
        assert_eq!(plan.last().unwrap(), &vec![Job::CallPeaks(State::PA)]);
    }
    #[test]
    fn cyclic_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            directory: dir.path().to_path_buf(),
            ..Config::default()
        };
        // coverage of atac reads its own mixture model
        config
            .inputs
            .insert(Feature::Atac, vec![PathBuf::from("model.json")]);
        config
            .overrides
            .insert("single-feature-model:atac".to_string(), PathBuf::from("model.json"));
        assert!(matches!(
            Orchestrator::new(config),
            Err(Error::Config(_))
        ));
    }
    #[test]
    fn missing_required_input() {
        let (_dir, o) = orchestrator();
        let r = o.run(&[Job::Coverage(Feature::Rna)]);
        assert!(matches!(r, Err(Error::MissingInput(_))));
    }
}

//!
//! Expanded HMM states, their canonical states and the adjacency template
//!
use crate::error::{Error, Result};
use crate::feature::State;
use petgraph::graph::{DiGraph, NodeIndex};

///
/// Internal HMM state. Several expanded states may report the same
/// canonical state.
///
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedState {
    pub name: String,
    pub canonical: State,
}

///
/// Total map from expanded-state index (`0..m`) to canonical-state index
/// (`0..n`).
///
#[derive(Clone, Debug, PartialEq)]
pub struct StateMap {
    map: Vec<usize>,
    n_canonical: usize,
}

impl StateMap {
    pub fn new(map: Vec<usize>, n_canonical: usize) -> Result<StateMap> {
        if let Some((i, &c)) = map.iter().enumerate().find(|&(_, &c)| c >= n_canonical) {
            return Err(Error::InconsistentPartition(format!(
                "expanded state {} maps to canonical {} of {}",
                i, c, n_canonical
            )));
        }
        for c in 0..n_canonical {
            if !map.contains(&c) {
                return Err(Error::InconsistentPartition(format!(
                    "canonical state {} has no expanded state",
                    c
                )));
            }
        }
        Ok(StateMap { map, n_canonical })
    }
    pub fn canonical(&self, expanded: usize) -> usize {
        self.map[expanded]
    }
    pub fn n_expanded(&self) -> usize {
        self.map.len()
    }
    pub fn n_canonical(&self) -> usize {
        self.n_canonical
    }
    ///
    /// Sum values of expanded states into their canonical states
    ///
    pub fn collapse(&self, expanded: &[f64]) -> Vec<f64> {
        let mut r = vec![0.0; self.n_canonical];
        for (i, &v) in expanded.iter().enumerate() {
            r[self.map[i]] += v;
        }
        r
    }
    ///
    /// Copy per-canonical values to every expanded state
    ///
    pub fn expand(&self, canonical: &[f64]) -> Vec<f64> {
        self.map.iter().map(|&c| canonical[c]).collect()
    }
}

///
/// Adjacency template: nodes are expanded states, an edge `i -> j` permits a
/// nonzero transition probability. Self-transitions are always permitted and
/// not stored as edges.
///
#[derive(Clone, Debug)]
pub struct Template {
    pub canonical: Vec<State>,
    pub graph: DiGraph<ExpandedState, ()>,
}

impl Template {
    ///
    /// Build from expanded state names, their canonical states and the
    /// permitted edges given by name.
    ///
    pub fn from_names(
        canonical: Vec<State>,
        expanded: &[(&str, State)],
        edges: &[(&str, &[&str])],
    ) -> Result<Template> {
        let mut graph = DiGraph::new();
        for &(name, state) in expanded {
            graph.add_node(ExpandedState {
                name: name.to_string(),
                canonical: state,
            });
        }
        let mut template = Template { canonical, graph };
        for &(source, targets) in edges {
            let i = template.index_of(source)?;
            for target in targets.iter() {
                let j = template.index_of(target)?;
                if i != j {
                    template.graph.update_edge(NodeIndex::new(i), NodeIndex::new(j), ());
                }
            }
        }
        Ok(template)
    }
    ///
    /// Chromatin-state template: transcription and no-signal states are
    /// split in two copies, and enhancers/promoters inside transcribed
    /// regions have their own expanded states.
    ///
    pub fn chromatin() -> Template {
        let expanded = [
            ("PA", State::PA),
            ("EA", State::EA),
            ("BI", State::BI),
            ("PR", State::PR),
            ("TR:1", State::TR),
            ("TR:2", State::TR),
            ("TL", State::TL),
            ("R1", State::R1),
            ("R2", State::R2),
            ("CL", State::CL),
            ("NS:1", State::NS),
            ("NS:2", State::NS),
            ("EA:tr", State::EA),
            ("PA:tr", State::PA),
        ];
        let edges: [(&str, &[&str]); 14] = [
            (
                "NS:1",
                &["PA", "EA", "BI", "PR", "R1", "R2", "CL", "TL", "TR:1", "NS:2"],
            ),
            ("NS:2", &["NS:1"]),
            ("PA", &["NS:1", "TR:1", "EA", "BI"]),
            ("EA", &["NS:1", "PA", "PR"]),
            ("BI", &["NS:1", "PA", "R1"]),
            ("PR", &["NS:1", "EA"]),
            ("R1", &["NS:1", "BI", "R2"]),
            ("R2", &["NS:1", "R1"]),
            ("CL", &["NS:1"]),
            ("TL", &["NS:1", "TR:1"]),
            ("TR:1", &["TR:2", "EA:tr", "PA:tr", "NS:1", "TL"]),
            ("TR:2", &["TR:1", "EA:tr", "PA:tr"]),
            ("EA:tr", &["TR:1", "TR:2"]),
            ("PA:tr", &["TR:1", "TR:2"]),
        ];
        Template::from_names(State::ALL.to_vec(), &expanded, &edges)
            .expect("chromatin template refers to undefined states")
    }
    pub fn n_expanded(&self) -> usize {
        self.graph.node_count()
    }
    pub fn expanded(&self, i: usize) -> &ExpandedState {
        &self.graph[NodeIndex::new(i)]
    }
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.graph
            .node_indices()
            .find(|&v| self.graph[v].name == name)
            .map(|v| v.index())
            .ok_or_else(|| Error::UnknownName {
                kind: "expanded state",
                name: name.to_string(),
            })
    }
    pub fn is_permitted(&self, i: usize, j: usize) -> bool {
        i == j
            || self
                .graph
                .contains_edge(NodeIndex::new(i), NodeIndex::new(j))
    }
    ///
    /// permitted non-self destinations of `i`, in increasing index order
    ///
    pub fn successors(&self, i: usize) -> Vec<usize> {
        let mut js: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(i))
            .map(|v| v.index())
            .collect();
        js.sort_unstable();
        js
    }
    pub fn state_map(&self) -> Result<StateMap> {
        let map = self
            .graph
            .node_indices()
            .map(|v| {
                let state = self.graph[v].canonical;
                self.canonical
                    .iter()
                    .position(|&s| s == state)
                    .ok_or_else(|| {
                        Error::InconsistentPartition(format!(
                            "{} maps to {} which is not a canonical state",
                            self.graph[v].name, state
                        ))
                    })
            })
            .collect::<Result<Vec<usize>>>()?;
        StateMap::new(map, self.canonical.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromatin_state_map_is_total() {
        let t = Template::chromatin();
        let m = t.state_map().unwrap();
        assert_eq!(m.n_expanded(), 14);
        assert_eq!(m.n_canonical(), State::ALL.len());
        for i in 0..m.n_expanded() {
            let c = m.canonical(i);
            assert!(c < m.n_canonical());
            assert_eq!(State::ALL[c], t.expanded(i).canonical);
        }
        assert_eq!(m.canonical(t.index_of("TR:2").unwrap()), State::TR.index());
        assert_eq!(m.canonical(t.index_of("PA:tr").unwrap()), State::PA.index());
    }
    #[test]
    fn collapse_and_expand() {
        let m = StateMap::new(vec![0, 1, 1, 2], 3).unwrap();
        assert_eq!(m.collapse(&[0.1, 0.2, 0.3, 0.4]), vec![0.1, 0.5, 0.4]);
        assert_eq!(m.expand(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 2.0, 3.0]);
    }
    #[test]
    fn invalid_state_maps() {
        assert!(StateMap::new(vec![0, 3], 3).is_err());
        // canonical 1 unreachable
        assert!(StateMap::new(vec![0, 2], 3).is_err());
    }
    #[test]
    fn permitted_edges() {
        let t = Template::chromatin();
        let ns = t.index_of("NS:1").unwrap();
        let pa = t.index_of("PA").unwrap();
        let cl = t.index_of("CL").unwrap();
        assert!(t.is_permitted(ns, pa));
        assert!(t.is_permitted(pa, pa));
        assert!(!t.is_permitted(cl, pa));
        assert_eq!(t.successors(cl), vec![ns]);
        assert!(t.index_of("XX").is_err());
    }
    #[test]
    fn undefined_names_in_edges() {
        let r = Template::from_names(
            vec![State::NS],
            &[("NS", State::NS)],
            &[("NS", &["PA"])],
        );
        assert!(matches!(r, Err(Error::UnknownName { .. })));
    }
}

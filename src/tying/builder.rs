//!
//! Transition skeleton and parameter-tying constraints
//!
use super::template::{StateMap, Template};
use crate::config::TyingMode;
use crate::error::{Error, Result};
use fnv::FnvHashSet;
use itertools::Itertools;
use ndarray::Array2;

///
/// Transition-matrix cells `(row, col)` whose parameters must be equal
/// after estimation.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EqualityConstraint(pub Vec<(usize, usize)>);

impl EqualityConstraint {
    pub fn cells(&self) -> &[(usize, usize)] {
        &self.0
    }
}

///
/// Output of the builder, handed to the HMM estimator.
///
#[derive(Clone, Debug)]
pub struct TiedTransitions {
    /// `m x m`, uniform mass over permitted cells of each row
    pub skeleton: Array2<f64>,
    pub constraints: Vec<EqualityConstraint>,
    pub state_map: StateMap,
}

///
/// Parameter sharing of the likelihood mode, written against the
/// chromatin template by expanded-state name:
///
/// * split copies of one canonical state share their self-transition
/// * both transcription copies enter (and are re-entered from) the
///   enhancer/promoter states inside transcribed regions with the same
///   probability
///
const LIKELIHOOD_GROUPS: [&[(&str, &str)]; 6] = [
    &[("TR:1", "TR:1"), ("TR:2", "TR:2")],
    &[("NS:1", "NS:1"), ("NS:2", "NS:2")],
    &[("TR:1", "EA:tr"), ("TR:2", "EA:tr")],
    &[("TR:1", "PA:tr"), ("TR:2", "PA:tr")],
    &[("EA:tr", "TR:1"), ("EA:tr", "TR:2")],
    &[("PA:tr", "TR:1"), ("PA:tr", "TR:2")],
];

fn skeleton(template: &Template) -> Array2<f64> {
    let m = template.n_expanded();
    let mut a = Array2::zeros((m, m));
    for i in 0..m {
        let cols: Vec<usize> = (0..m).filter(|&j| template.is_permitted(i, j)).collect();
        let w = 1.0 / cols.len() as f64;
        for j in cols {
            a[[i, j]] = w;
        }
    }
    a
}

fn likelihood_groups(template: &Template) -> Result<Vec<EqualityConstraint>> {
    LIKELIHOOD_GROUPS
        .iter()
        .map(|group| {
            let cells = group
                .iter()
                .map(|&(from, to)| Ok((template.index_of(from)?, template.index_of(to)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(EqualityConstraint(cells))
        })
        .collect()
}

///
/// One group per (source row, destination canonical state): the
/// permitted non-self columns of each row partitioned by the canonical
/// state they map to.
///
fn posterior_groups(template: &Template, state_map: &StateMap) -> Vec<EqualityConstraint> {
    let mut groups = Vec::new();
    for i in 0..template.n_expanded() {
        let by_canonical = template
            .successors(i)
            .into_iter()
            .map(|j| (state_map.canonical(j), j))
            .into_group_map();
        for c in by_canonical.keys().copied().sorted() {
            let cells = by_canonical[&c].iter().map(|&j| (i, j)).collect();
            groups.push(EqualityConstraint(cells));
        }
    }
    groups
}

///
/// Every cell is permitted and no cell belongs to two groups.
///
fn validate(template: &Template, constraints: &[EqualityConstraint]) -> Result<()> {
    let mut seen: FnvHashSet<(usize, usize)> = FnvHashSet::default();
    for (g, constraint) in constraints.iter().enumerate() {
        if constraint.0.is_empty() {
            return Err(Error::InconsistentPartition(format!("group {} is empty", g)));
        }
        for &(i, j) in constraint.cells() {
            if !template.is_permitted(i, j) {
                return Err(Error::InconsistentPartition(format!(
                    "group {} ties forbidden transition {} -> {}",
                    g,
                    template.expanded(i).name,
                    template.expanded(j).name
                )));
            }
            if !seen.insert((i, j)) {
                return Err(Error::InconsistentPartition(format!(
                    "transition {} -> {} appears in two groups",
                    template.expanded(i).name,
                    template.expanded(j).name
                )));
            }
        }
    }
    Ok(())
}

pub fn build(template: &Template, mode: TyingMode) -> Result<TiedTransitions> {
    let state_map = template.state_map()?;
    let constraints = match mode {
        TyingMode::Likelihood => likelihood_groups(template)?,
        TyingMode::Posterior => posterior_groups(template, &state_map),
    };
    validate(template, &constraints)?;
    Ok(TiedTransitions {
        skeleton: skeleton(template),
        constraints,
        state_map,
    })
}

///
/// Put all mass on `fallback` if the likelihood vector of a locus is
/// identically zero. Returns whether the row was rewritten.
///
pub fn rewrite_degenerate(row: &mut [f64], fallback: usize) -> Result<bool> {
    if fallback >= row.len() {
        return Err(Error::InconsistentPartition(format!(
            "fallback state {} out of {} canonical states",
            fallback,
            row.len()
        )));
    }
    if row.iter().any(|x| x.is_nan()) {
        return Err(Error::NotANumber("canonical-state likelihoods".to_string()));
    }
    if row.iter().all(|&x| x == 0.0) {
        row[fallback] = 1.0;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::State;
    use approx::assert_abs_diff_eq;

    fn names(t: &Template, c: &EqualityConstraint) -> Vec<(String, String)> {
        c.cells()
            .iter()
            .map(|&(i, j)| (t.expanded(i).name.clone(), t.expanded(j).name.clone()))
            .collect()
    }

    #[test]
    fn skeleton_rows_are_stochastic() {
        let t = Template::chromatin();
        let r = build(&t, TyingMode::Posterior).unwrap();
        let m = t.n_expanded();
        assert_eq!(r.skeleton.dim(), (m, m));
        for i in 0..m {
            assert_abs_diff_eq!(r.skeleton.row(i).sum(), 1.0, epsilon = 1e-12);
            for j in 0..m {
                assert_eq!(r.skeleton[[i, j]] > 0.0, t.is_permitted(i, j));
            }
        }
    }
    #[test]
    fn posterior_groups_partition_rows() {
        let t = Template::chromatin();
        let r = build(&t, TyingMode::Posterior).unwrap();
        for i in 0..t.n_expanded() {
            let mut cells: Vec<usize> = r
                .constraints
                .iter()
                .flat_map(|c| c.cells().iter().filter(|(row, _)| *row == i).map(|&(_, j)| j))
                .collect();
            let n = cells.len();
            cells.sort_unstable();
            cells.dedup();
            assert_eq!(n, cells.len(), "row {} has overlapping groups", i);
            assert_eq!(cells, t.successors(i));
        }
        for c in &r.constraints {
            // one row and one destination canonical state per group
            let rows: Vec<usize> = c.cells().iter().map(|&(i, _)| i).dedup().collect();
            assert_eq!(rows.len(), 1);
            let dests: Vec<usize> = c
                .cells()
                .iter()
                .map(|&(_, j)| r.state_map.canonical(j))
                .dedup()
                .collect();
            assert_eq!(dests.len(), 1);
            assert!(c.cells().iter().all(|&(i, j)| i != j));
        }
        // transcription copies collapse into one parameter from EA:tr
        let ea_tr = t.index_of("EA:tr").unwrap();
        let tied: Vec<&EqualityConstraint> = r
            .constraints
            .iter()
            .filter(|c| c.cells()[0].0 == ea_tr)
            .collect();
        assert_eq!(tied.len(), 1);
        assert_eq!(
            names(&t, tied[0]),
            vec![
                ("EA:tr".to_string(), "TR:1".to_string()),
                ("EA:tr".to_string(), "TR:2".to_string())
            ]
        );
    }
    #[test]
    fn likelihood_groups_are_literal() {
        let t = Template::chromatin();
        let r = build(&t, TyingMode::Likelihood).unwrap();
        assert_eq!(r.constraints.len(), LIKELIHOOD_GROUPS.len());
        for (c, group) in r.constraints.iter().zip(LIKELIHOOD_GROUPS.iter()) {
            let expected: Vec<(String, String)> = group
                .iter()
                .map(|&(a, b)| (a.to_string(), b.to_string()))
                .collect();
            assert_eq!(names(&t, c), expected);
            assert!(c.cells().iter().all(|&(i, j)| t.is_permitted(i, j)));
        }
    }
    #[test]
    fn likelihood_groups_break_on_foreign_template() {
        let t = Template::from_names(
            vec![State::NS],
            &[("NS:1", State::NS), ("NS:2", State::NS)],
            &[("NS:1", &["NS:2"])],
        )
        .unwrap();
        assert!(matches!(
            build(&t, TyingMode::Likelihood),
            Err(Error::UnknownName { .. })
        ));
        assert!(build(&t, TyingMode::Posterior).is_ok());
    }
    #[test]
    fn validate_rejects_overlaps_and_forbidden_cells() {
        let t = Template::chromatin();
        let ns = t.index_of("NS:1").unwrap();
        let pa = t.index_of("PA").unwrap();
        let cl = t.index_of("CL").unwrap();
        let overlap = vec![
            EqualityConstraint(vec![(ns, pa)]),
            EqualityConstraint(vec![(ns, pa), (ns, cl)]),
        ];
        assert!(matches!(
            validate(&t, &overlap),
            Err(Error::InconsistentPartition(_))
        ));
        let forbidden = vec![EqualityConstraint(vec![(cl, pa)])];
        assert!(validate(&t, &forbidden).is_err());
    }
    #[test]
    fn degenerate_rows() {
        let mut row = vec![0.0; 4];
        assert!(rewrite_degenerate(&mut row, 3).unwrap());
        assert_eq!(row, vec![0.0, 0.0, 0.0, 1.0]);
        let mut row = vec![0.0, 0.2, 0.0, 0.0];
        assert!(!rewrite_degenerate(&mut row, 3).unwrap());
        assert_eq!(row, vec![0.0, 0.2, 0.0, 0.0]);
        let mut row = vec![0.0, f64::NAN, 0.0, 0.0];
        assert!(matches!(
            rewrite_degenerate(&mut row, 3),
            Err(Error::NotANumber(_))
        ));
    }
    #[test]
    fn degenerate_rows_with_bad_fallback() {
        let mut empty: Vec<f64> = vec![];
        assert!(matches!(
            rewrite_degenerate(&mut empty, 0),
            Err(Error::InconsistentPartition(_))
        ));
        let mut row = vec![0.0; 4];
        assert!(matches!(
            rewrite_degenerate(&mut row, 4),
            Err(Error::InconsistentPartition(_))
        ));
        assert_eq!(row, vec![0.0; 4]);
    }
}

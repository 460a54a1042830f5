//!
//! Batch evaluation of a `Scorer` over whole tracks
//!
use super::matrix::{Domain, PositionMatrix};
use super::model::Scorer;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::track::{check_same_genome, Contig, Track};
use log::debug;

///
/// Peak probability tracks of every feature in `Feature::ALL` order.
/// No-peak probabilities are `1 - p`.
///
pub struct FeatureTracks {
    pub peaks: Vec<Track>,
}

impl FeatureTracks {
    pub fn new(peaks: Vec<Track>) -> Result<Self> {
        if peaks.len() != Feature::ALL.len() {
            return Err(Error::Config(format!(
                "expected {} feature tracks, got {}",
                Feature::ALL.len(),
                peaks.len()
            )));
        }
        let refs: Vec<&Track> = peaks.iter().collect();
        check_same_genome(&refs)?;
        Ok(FeatureTracks { peaks })
    }
    ///
    /// Fill `x` with the window centered at `bin` of contig `c`.
    /// Columns outside the contig are "no peak".
    ///
    pub fn fill(&self, x: &mut PositionMatrix, c: usize, bin: usize) {
        let n = x.n_cols();
        let half = (n / 2) as isize;
        for &feature in Feature::ALL.iter() {
            let values = &self.peaks[feature.index()].contigs[c].values;
            for j in 0..n {
                let pos = bin as isize + j as isize - half;
                let p = if pos >= 0 && (pos as usize) < values.len() {
                    values[pos as usize]
                } else {
                    0.0
                };
                let (peak, nopeak) = match x.domain() {
                    Domain::Linear => (p, 1.0 - p),
                    Domain::Log => (p.ln(), (-p).ln_1p()),
                };
                x.set(feature.row(), j, peak, nopeak);
            }
        }
    }
}

///
/// Evaluate `scorer` at every bin, producing a track over the same genome.
///
pub fn eval_track(scorer: &dyn Scorer, tracks: &FeatureTracks) -> Result<Track> {
    let (n_rows, n_cols) = scorer.dims();
    if n_rows != 2 * Feature::ALL.len() {
        return Err(Error::Config(format!(
            "scorer of {} expects {} rows",
            scorer.state(),
            n_rows
        )));
    }
    let mut x = PositionMatrix::filled(n_cols, scorer.domain(), 0.0);
    let template = &tracks.peaks[0];
    let mut contigs = Vec::with_capacity(template.contigs.len());
    for (c, contig) in template.contigs.iter().enumerate() {
        debug!("scoring {} on {}", scorer.state(), contig.name);
        let mut values = Vec::with_capacity(contig.values.len());
        for bin in 0..contig.values.len() {
            tracks.fill(&mut x, c, bin);
            values.push(scorer.eval(&x)?);
        }
        contigs.push(Contig::new(contig.name.clone(), values));
    }
    Ok(Track::new(template.bin_size, contigs))
}

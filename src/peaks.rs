//!
//! Genomic regions from posterior tracks and state paths, written as BED
//!
use crate::error::{Error, Result};
use crate::feature::State;
use crate::track::Track;
use derive_new::new;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

///
/// Half-open interval `[start, end)` in base pairs
///
#[derive(Clone, Debug, PartialEq, new)]
pub struct Region {
    pub contig: String,
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub score: Option<f64>,
}

///
/// Maximal runs of bins with a value at least `threshold`, named `name` and
/// scored by their maximum value.
///
pub fn call_peaks(track: &Track, name: &str, threshold: f64) -> Vec<Region> {
    let mut regions = Vec::new();
    for contig in &track.contigs {
        let mut run: Option<(usize, f64)> = None;
        // sentinel closes a run reaching the contig end
        let values = contig.values.iter().chain(std::iter::once(&f64::NEG_INFINITY));
        for (bin, &v) in values.enumerate() {
            match (run, v >= threshold) {
                (None, true) => run = Some((bin, v)),
                (Some((start, max)), true) => run = Some((start, max.max(v))),
                (Some((start, max)), false) => {
                    regions.push(Region::new(
                        contig.name.clone(),
                        start * track.bin_size,
                        bin * track.bin_size,
                        name.to_string(),
                        Some(max),
                    ));
                    run = None;
                }
                (None, false) => {}
            }
        }
    }
    regions
}

///
/// Collapse a per-bin state path into runs of identical states.
///
pub fn segments(contig: &str, path: &[usize], bin_size: usize) -> Vec<Region> {
    let mut regions: Vec<Region> = Vec::new();
    for (bin, &s) in path.iter().enumerate() {
        let name = State::ALL[s].name();
        match regions.last_mut() {
            Some(r) if r.name == name && r.end == bin * bin_size => r.end += bin_size,
            _ => regions.push(Region::new(
                contig.to_string(),
                bin * bin_size,
                (bin + 1) * bin_size,
                name.to_string(),
                None,
            )),
        }
    }
    regions
}

///
/// `contig start end name [score]`, tab separated
///
pub fn write_bed<P: AsRef<Path>>(path: P, regions: &[Region]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(file);
    for r in regions {
        let line = match r.score {
            Some(score) => writeln!(
                w,
                "{}\t{}\t{}\t{}\t{:.4}",
                r.contig, r.start, r.end, r.name, score
            ),
            None => writeln!(w, "{}\t{}\t{}\t{}", r.contig, r.start, r.end, r.name),
        };
        line.map_err(|e| Error::io(path, e))?;
    }
    w.flush().map_err(|e| Error::io(path, e))
}

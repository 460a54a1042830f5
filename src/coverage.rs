//!
//! Read counts per bin from aligned reads
//!
//! Inputs are BAM/SAM/CRAM files (read with htslib) or BED records
//! `chrom start end [name [mapq [strand]]]`. Every fragment is counted
//! once, in the bin holding its center.
//!
//! Reads whose mate is unknown are extended from their 5' end to the
//! fragment length. The length is estimated by strand cross-correlation
//! of 5' ends, or taken from the configuration.
//!
use crate::config::Config;
use crate::error::{Error, Result};
use crate::track::{open_reader, Contig, Genome, Track};
use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, info, warn};
use rust_htslib::bam::{self, Read as _};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub struct CoverageOptions {
    /// used when the fragment length is not estimated
    pub fragment_length: usize,
    pub estimate_fragment_length: bool,
    /// inclusive range of candidate fragment lengths
    pub fragment_length_range: (usize, usize),
    pub fragment_length_step: usize,
    /// treat mates of paired reads (or BED records) as single-end reads
    pub paired_as_single_end: bool,
    pub min_mapq: u32,
    pub filter_duplicates: bool,
    pub exclude_contigs: Vec<String>,
}

impl CoverageOptions {
    pub fn from_config(config: &Config) -> Self {
        CoverageOptions {
            fragment_length: config.fragment_length,
            estimate_fragment_length: config.estimate_fragment_length,
            fragment_length_range: config.fragment_length_range,
            fragment_length_step: config.fragment_length_step,
            paired_as_single_end: config.paired_as_single_end,
            min_mapq: config.min_mapq,
            filter_duplicates: config.filter_duplicates,
            exclude_contigs: config.exclude_contigs.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

///
/// Alignment kept by the filters, on contig `contig` of the genome
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Alignment {
    pub contig: usize,
    pub start: usize,
    pub end: usize,
    pub strand: Strand,
    /// a read to be extended, rather than a whole fragment
    pub is_read: bool,
}

impl Alignment {
    ///
    /// `[start, end)` of the fragment; reads are extended from their 5'
    /// end along the strand.
    ///
    pub fn fragment(&self, length: usize) -> (usize, usize) {
        if !self.is_read {
            return (self.start, self.end);
        }
        match self.strand {
            Strand::Reverse => (self.end.saturating_sub(length), self.end),
            Strand::Forward | Strand::Unknown => (self.start, self.start + length),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterStats {
    pub used: usize,
    /// unmapped, secondary, supplementary or QC-failed
    pub unmapped: usize,
    pub low_mapq: usize,
    pub duplicate: usize,
    pub excluded: usize,
    /// second mate of a fragment counted through the first
    pub mate: usize,
    /// unknown contig or fragment center past the contig end
    pub outside: usize,
}

///
/// Filtered alignments of every input file of one feature. Duplicates are
/// detected across files.
///
pub struct Alignments<'a> {
    options: &'a CoverageOptions,
    contigs: FnvHashMap<String, usize>,
    seen: FnvHashSet<(usize, usize, usize, Strand)>,
    stats: FilterStats,
    kept: Vec<Alignment>,
}

impl<'a> Alignments<'a> {
    pub fn new(options: &'a CoverageOptions, genome: &Genome) -> Self {
        Alignments {
            options,
            contigs: genome
                .contigs
                .iter()
                .enumerate()
                .map(|(i, (name, _))| (name.clone(), i))
                .collect(),
            seen: FnvHashSet::default(),
            stats: FilterStats::default(),
            kept: Vec::new(),
        }
    }
    pub fn options(&self) -> &CoverageOptions {
        self.options
    }
    pub fn skip_unmapped(&mut self) {
        self.stats.unmapped += 1;
    }
    pub fn skip_mate(&mut self) {
        self.stats.mate += 1;
    }
    ///
    /// Keep the alignment unless a filter rejects it. `duplicate` is the
    /// flag of formats that carry one; otherwise duplicates are alignments
    /// with the same contig, interval and strand.
    ///
    pub fn push(
        &mut self,
        contig: &str,
        (start, end): (usize, usize),
        strand: Strand,
        is_read: bool,
        mapq: u32,
        duplicate: Option<bool>,
    ) {
        if mapq < self.options.min_mapq {
            self.stats.low_mapq += 1;
            return;
        }
        if self.options.exclude_contigs.iter().any(|c| c == contig) {
            self.stats.excluded += 1;
            return;
        }
        let c = match self.contigs.get(contig) {
            Some(&c) => c,
            None => {
                self.stats.outside += 1;
                return;
            }
        };
        if self.options.filter_duplicates {
            let is_duplicate = match duplicate {
                Some(flag) => flag,
                None => !self.seen.insert((c, start, end, strand)),
            };
            if is_duplicate {
                self.stats.duplicate += 1;
                return;
            }
        }
        self.kept.push(Alignment {
            contig: c,
            start,
            end,
            strand,
            is_read,
        });
    }
}

///
/// Reader of one alignment file format
///
pub trait CoverageEngine {
    /// Add the alignments of the file at `path`
    fn read(&self, path: &Path, alignments: &mut Alignments) -> Result<()>;
}

///
/// BED records. Without `paired_as_single_end` every record is a fragment.
///
pub struct BedEngine;

fn parse_strand(s: Option<&&str>) -> Strand {
    match s.and_then(|s| s.trim().chars().next()) {
        Some('+') => Strand::Forward,
        Some('-') => Strand::Reverse,
        _ => Strand::Unknown,
    }
}

impl CoverageEngine for BedEngine {
    fn read(&self, path: &Path, alignments: &mut Alignments) -> Result<()> {
        let is_read = alignments.options().paired_as_single_end;
        let reader = open_reader(path)?;
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io(path, e))?;
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with("track")
                || line.starts_with("browser")
            {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(Error::format(path, i + 1, "expected at least 3 columns"));
            }
            let parse = |s: &str, what: &str| {
                s.trim()
                    .parse::<usize>()
                    .map_err(|_| Error::format(path, i + 1, format!("invalid {} `{}`", what, s)))
            };
            let start = parse(fields[1], "start")?;
            let end = parse(fields[2], "end")?;
            if end < start {
                return Err(Error::format(path, i + 1, "end before start"));
            }
            let mapq = match fields.get(4) {
                Some(s) => parse(*s, "mapq")? as u32,
                None => u32::MAX,
            };
            let strand = parse_strand(fields.get(5));
            alignments.push(fields[0], (start, end), strand, is_read, mapq, None);
        }
        Ok(())
    }
}

///
/// SAM/BAM/CRAM through htslib. Filters use the flags: unmapped, secondary,
/// supplementary and QC-failed records are skipped, duplicates are the
/// flagged ones. A properly paired fragment is counted through its
/// leftmost mate unless `paired_as_single_end`.
///
pub struct BamEngine;

impl CoverageEngine for BamEngine {
    fn read(&self, path: &Path, alignments: &mut Alignments) -> Result<()> {
        let paired_as_single_end = alignments.options().paired_as_single_end;
        let mut reader = bam::Reader::from_path(path).map_err(|e| Error::htslib(path, e))?;
        let header = reader.header();
        let names: Vec<String> = (0..header.target_count())
            .map(|tid| String::from_utf8_lossy(header.tid2name(tid)).into_owned())
            .collect();
        for record in reader.records() {
            let record = record.map_err(|e| Error::htslib(path, e))?;
            if record.is_unmapped()
                || record.is_secondary()
                || record.is_supplementary()
                || record.is_quality_check_failed()
                || record.tid() < 0
            {
                alignments.skip_unmapped();
                continue;
            }
            let contig = &names[record.tid() as usize];
            let start = record.pos().max(0) as usize;
            let strand = if record.is_reverse() {
                Strand::Reverse
            } else {
                Strand::Forward
            };
            let (end, is_read) = if record.is_paired() && !paired_as_single_end {
                if !record.is_proper_pair() || record.insert_size() <= 0 {
                    alignments.skip_mate();
                    continue;
                }
                (start + record.insert_size() as usize, false)
            } else {
                (record.cigar().end_pos().max(0) as usize, true)
            };
            alignments.push(
                contig,
                (start, end),
                strand,
                is_read,
                u32::from(record.mapq()),
                Some(record.is_duplicate()),
            );
        }
        Ok(())
    }
}

///
/// Engine reading `path`, chosen by extension
///
pub fn engine_for(path: &Path) -> Box<dyn CoverageEngine> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if name.ends_with(".bam") || name.ends_with(".sam") || name.ends_with(".cram") {
        Box::new(BamEngine)
    } else {
        Box::new(BedEngine)
    }
}

///
/// Fragment length used to extend reads, with its strand cross-correlation
/// when it was estimated
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentLength {
    pub length: usize,
    pub estimated: bool,
    /// (candidate length, correlation)
    pub cross_correlation: Vec<(usize, f64)>,
}

impl FragmentLength {
    pub fn fixed(length: usize) -> Self {
        FragmentLength {
            length,
            estimated: false,
            cross_correlation: Vec::new(),
        }
    }
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let s = serde_json::to_string_pretty(self).map_err(|e| Error::json(path, e))?;
        std::fs::write(path, s).map_err(|e| Error::io(path, e))
    }
}

///
/// Shift maximizing the Pearson correlation between the 5' ends of forward
/// reads and the 5' ends of reverse reads, both counted in windows of
/// `fragment_length_step` bp. `None` without reads on both strands.
///
pub fn estimate_fragment_length(
    alignments: &[Alignment],
    genome: &Genome,
    options: &CoverageOptions,
) -> Option<FragmentLength> {
    let step = options.fragment_length_step;
    let (min, max) = options.fragment_length_range;
    let mut forward: FnvHashMap<(usize, usize), f64> = FnvHashMap::default();
    let mut reverse: FnvHashMap<(usize, usize), f64> = FnvHashMap::default();
    for a in alignments.iter().filter(|a| a.is_read) {
        match a.strand {
            Strand::Forward => *forward.entry((a.contig, a.start / step)).or_default() += 1.0,
            Strand::Reverse => *reverse.entry((a.contig, a.end / step)).or_default() += 1.0,
            Strand::Unknown => {}
        }
    }
    let n = genome
        .contigs
        .iter()
        .map(|(_, len)| (len * genome.bin_size + step - 1) / step)
        .sum::<usize>() as f64;
    let moments = |counts: &FnvHashMap<(usize, usize), f64>| {
        let mean = counts.values().sum::<f64>() / n;
        let var = counts.values().map(|x| x * x).sum::<f64>() / n - mean * mean;
        (mean, var)
    };
    let (mean_f, var_f) = moments(&forward);
    let (mean_r, var_r) = moments(&reverse);
    if !(var_f > 0.0 && var_r > 0.0) {
        return None;
    }
    let cross_correlation: Vec<(usize, f64)> = ((min + step - 1) / step..=max / step)
        .map(|d| {
            let sxy: f64 = forward
                .iter()
                .map(|(&(c, i), &x)| x * reverse.get(&(c, i + d)).copied().unwrap_or(0.0))
                .sum();
            let cov = sxy / n - mean_f * mean_r;
            (d * step, cov / (var_f * var_r).sqrt())
        })
        .collect();
    let &(length, _) = cross_correlation
        .iter()
        .fold(None, |best: Option<&(usize, f64)>, x| match best {
            Some(b) if b.1 >= x.1 => Some(b),
            _ => Some(x),
        })?;
    Some(FragmentLength {
        length,
        estimated: true,
        cross_correlation,
    })
}

fn fragment_length(
    alignments: &[Alignment],
    genome: &Genome,
    options: &CoverageOptions,
) -> FragmentLength {
    let has_reads = alignments.iter().any(|a| a.is_read);
    if !(has_reads && options.estimate_fragment_length) {
        return FragmentLength::fixed(options.fragment_length);
    }
    match estimate_fragment_length(alignments, genome, options) {
        Some(f) => {
            info!("estimated fragment length {}", f.length);
            f
        }
        None => {
            warn!(
                "fragment length cannot be estimated, using {}",
                options.fragment_length
            );
            FragmentLength::fixed(options.fragment_length)
        }
    }
}

pub struct Coverage {
    pub track: Track,
    pub fragment_length: FragmentLength,
    pub stats: FilterStats,
}

///
/// Count the fragments of every input file over `genome`
///
pub fn count_fragments(
    inputs: &[PathBuf],
    genome: &Genome,
    options: &CoverageOptions,
) -> Result<Coverage> {
    let mut alignments = Alignments::new(options, genome);
    for path in inputs {
        info!("reading {}", path.display());
        engine_for(path).read(path, &mut alignments)?;
    }
    let Alignments {
        kept, mut stats, ..
    } = alignments;
    let fragment_length = fragment_length(&kept, genome, options);

    let mut values: Vec<Vec<f64>> = genome
        .contigs
        .iter()
        .map(|(_, len)| vec![0.0; *len])
        .collect();
    for a in &kept {
        let (start, end) = a.fragment(fragment_length.length);
        match values[a.contig].get_mut((start + end) / 2 / genome.bin_size) {
            Some(v) => {
                *v += 1.0;
                stats.used += 1;
            }
            None => stats.outside += 1,
        }
    }
    debug!("{:?}", stats);
    info!(
        "counted {} fragments ({} duplicates, {} below mapq {})",
        stats.used, stats.duplicate, stats.low_mapq, options.min_mapq
    );
    let contigs = genome
        .contigs
        .iter()
        .zip(values)
        .map(|((name, _), v)| Contig::new(name.clone(), v))
        .collect();
    Ok(Coverage {
        track: Track::new(genome.bin_size, contigs),
        fragment_length,
        stats,
    })
}

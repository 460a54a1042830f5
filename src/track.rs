//!
//! Per-contig, per-bin numeric tracks and their file formats
//!
//! Format is inferred from the file extension:
//!
//! * `.json` / `.json.gz`: serialized `Track`
//! * `.bedgraph` / `.bg` (optionally `.gz`): `contig start end value`
//!
use crate::error::{Error, Result};
use derive_new::new;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, new)]
pub struct Contig {
    pub name: String,
    pub values: Vec<f64>,
}

///
/// Contig names and lengths (in bins) with the bin size;
/// two tracks can be combined iff their genomes are equal.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Genome {
    pub bin_size: usize,
    pub contigs: Vec<(String, usize)>,
}

impl Genome {
    ///
    /// Read a `name<TAB>length` chromosome sizes file; lengths are
    /// rounded up to whole bins.
    ///
    pub fn from_chrom_sizes<P: AsRef<Path>>(path: P, bin_size: usize) -> Result<Genome> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let mut contigs = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io(path, e))?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (name, length) = match (fields.next(), fields.next()) {
                (Some(name), Some(length)) => (name, length),
                _ => return Err(Error::format(path, i + 1, "expected 2 columns")),
            };
            let length: usize = length
                .parse()
                .map_err(|_| Error::format(path, i + 1, format!("invalid length `{}`", length)))?;
            contigs.push((name.to_string(), (length + bin_size - 1) / bin_size));
        }
        Ok(Genome { bin_size, contigs })
    }
    pub fn n_bins(&self, name: &str) -> Option<usize> {
        self.contigs
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, len)| len)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub bin_size: usize,
    pub contigs: Vec<Contig>,
}

///
/// Summary statistic used when coarsening a track
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinSummary {
    /// arithmetic mean of the merged bins
    Mean,
    /// mean rounded to the nearest integer (count-like tracks)
    DiscreteMean,
}

impl Track {
    pub fn new(bin_size: usize, contigs: Vec<Contig>) -> Track {
        Track { bin_size, contigs }
    }
    ///
    /// Track over `genome` whose every bin is `value`
    ///
    pub fn constant(genome: &Genome, value: f64) -> Track {
        Track {
            bin_size: genome.bin_size,
            contigs: genome
                .contigs
                .iter()
                .map(|(name, len)| Contig::new(name.clone(), vec![value; *len]))
                .collect(),
        }
    }
    pub fn genome(&self) -> Genome {
        Genome {
            bin_size: self.bin_size,
            contigs: self
                .contigs
                .iter()
                .map(|c| (c.name.clone(), c.values.len()))
                .collect(),
        }
    }
    pub fn n_bins(&self) -> usize {
        self.contigs.iter().map(|c| c.values.len()).sum()
    }
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Track {
        Track {
            bin_size: self.bin_size,
            contigs: self
                .contigs
                .iter()
                .map(|c| Contig::new(c.name.clone(), c.values.iter().map(|&x| f(x)).collect()))
                .collect(),
        }
    }
    ///
    /// Merge every `factor` consecutive bins into one.
    ///
    pub fn coarsen(&self, factor: usize, summary: BinSummary) -> Track {
        assert!(factor > 0);
        let contigs = self
            .contigs
            .iter()
            .map(|c| {
                let values = c
                    .values
                    .chunks(factor)
                    .map(|chunk| {
                        let mean = chunk.iter().sum::<f64>() / chunk.len() as f64;
                        match summary {
                            BinSummary::Mean => mean,
                            BinSummary::DiscreteMean => mean.round(),
                        }
                    })
                    .collect();
                Contig::new(c.name.clone(), values)
            })
            .collect();
        Track::new(self.bin_size * factor, contigs)
    }
}

///
/// Fail unless every track is defined over the same genome.
///
pub fn check_same_genome(tracks: &[&Track]) -> Result<Genome> {
    let first = tracks
        .first()
        .ok_or_else(|| Error::GenomeMismatch("no tracks to combine".to_string()))?
        .genome();
    for track in &tracks[1..] {
        let genome = track.genome();
        if genome != first {
            return Err(Error::GenomeMismatch(format!(
                "bin size {} with {} contigs vs bin size {} with {} contigs",
                first.bin_size,
                first.contigs.len(),
                genome.bin_size,
                genome.contigs.len()
            )));
        }
    }
    Ok(first)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Json,
    BedGraph,
}

fn infer_format(path: &Path) -> Result<(Format, bool)> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let (stem, gz) = match name.strip_suffix(".gz") {
        Some(stem) => (stem, true),
        None => (name.as_str(), false),
    };
    if stem.ends_with(".json") {
        Ok((Format::Json, gz))
    } else if stem.ends_with(".bedgraph") || stem.ends_with(".bg") {
        Ok((Format::BedGraph, gz))
    } else {
        Err(Error::format(path, 0, "unknown track file extension"))
    }
}

///
/// Open a (possibly gzipped) file for buffered reading
///
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let is_gz = path.extension().map_or(false, |ext| ext == "gz");
    if is_gz {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

///
/// Buffered, optionally gzipped, output. `finish` must be called to get
/// the errors of the last writes.
///
enum Sink<W: Write> {
    Plain(BufWriter<W>),
    Gz(GzEncoder<BufWriter<W>>),
}

impl<W: Write> Sink<W> {
    fn new(inner: W, gz: bool) -> Self {
        if gz {
            Sink::Gz(GzEncoder::new(BufWriter::new(inner), Compression::default()))
        } else {
            Sink::Plain(BufWriter::new(inner))
        }
    }
    /// write the gzip trailer and flush every layer
    fn finish(self) -> std::io::Result<W> {
        let buffered = match self {
            Sink::Plain(w) => w,
            Sink::Gz(gz) => gz.finish()?,
        };
        buffered.into_inner().map_err(|e| e.into_error())
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(w) => w.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gz(w) => w.flush(),
        }
    }
}

pub fn read_track<P: AsRef<Path>>(path: P) -> Result<Track> {
    let path = path.as_ref();
    let (format, _) = infer_format(path)?;
    let mut reader = open_reader(path)?;
    match format {
        Format::Json => {
            let mut s = String::new();
            reader
                .read_to_string(&mut s)
                .map_err(|e| Error::io(path, e))?;
            serde_json::from_str(&s).map_err(|e| Error::json(path, e))
        }
        Format::BedGraph => parse_bedgraph(path, reader),
    }
}

fn parse_bedgraph(path: &Path, reader: Box<dyn BufRead>) -> Result<Track> {
    let mut bin_size: Option<usize> = None;
    let mut contigs: Vec<Contig> = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        if line.is_empty() || line.starts_with('#') || line.starts_with("track") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(Error::format(path, i + 1, "expected 4 columns"));
        }
        let parse_usize = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| Error::format(path, i + 1, format!("invalid position `{}`", s)))
        };
        let start = parse_usize(fields[1])?;
        let end = parse_usize(fields[2])?;
        let value: f64 = fields[3]
            .parse()
            .map_err(|_| Error::format(path, i + 1, format!("invalid value `{}`", fields[3])))?;
        if end <= start {
            return Err(Error::format(path, i + 1, "empty interval"));
        }
        let width = *bin_size.get_or_insert(end - start);
        if start % width != 0 || (end - start) % width != 0 {
            return Err(Error::format(path, i + 1, "interval not aligned to bins"));
        }
        if contigs.last().map_or(true, |c| c.name != fields[0]) {
            contigs.push(Contig::new(fields[0].to_string(), Vec::new()));
        }
        let values = &mut contigs.last_mut().unwrap().values;
        if values.len() < end / width {
            values.resize(end / width, 0.0);
        }
        for bin in start / width..end / width {
            values[bin] = value;
        }
    }
    let bin_size = bin_size.ok_or_else(|| Error::format(path, 0, "empty bedGraph"))?;
    Ok(Track::new(bin_size, contigs))
}

pub fn write_track<P: AsRef<Path>>(path: P, track: &Track) -> Result<()> {
    let path = path.as_ref();
    let (format, gz) = infer_format(path)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    encode(file, path, format, gz, track)?;
    Ok(())
}

///
/// Serialize `track` into `inner`; `path` only names the output in errors.
///
fn encode<W: Write>(inner: W, path: &Path, format: Format, gz: bool, track: &Track) -> Result<W> {
    let mut writer = Sink::new(inner, gz);
    let io_err = |e| Error::io(path, e);
    match format {
        Format::Json => {
            serde_json::to_writer(&mut writer, track).map_err(|e| Error::json(path, e))?;
        }
        Format::BedGraph => {
            for contig in &track.contigs {
                for (bin, value) in contig.values.iter().enumerate() {
                    writeln!(
                        writer,
                        "{}\t{}\t{}\t{}",
                        contig.name,
                        bin * track.bin_size,
                        (bin + 1) * track.bin_size,
                        value
                    )
                    .map_err(io_err)?;
                }
            }
        }
    }
    writer.finish().map_err(io_err)
}

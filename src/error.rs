//!
//! Error type shared by every stage of the pipeline
//!
//! All variants are fatal for the run: the orchestrator stops at the first
//! error and the binary reports it as a single log line.
//!
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// serde_json (de)serialization errors of config, models and tracks
    #[error("JSON error on `{path}`: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// htslib errors while reading alignments
    #[error("htslib error on `{path}`: {source}")]
    Htslib {
        path: PathBuf,
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// malformed or inconsistent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// name that is not a known feature or state
    #[error("unknown {kind} name `{name}`")]
    UnknownName { kind: &'static str, name: String },

    /// required upstream artifact does not exist
    #[error("missing required input `{0}`")]
    MissingInput(PathBuf),

    /// probability-domain score larger than `1 + PROB_TOLERANCE`
    #[error("probability overshoot: {value} > 1")]
    ProbabilityOvershoot { value: f64 },

    /// NaN reached a place where all upstream producers must have removed it
    #[error("NaN encountered in {0}")]
    NotANumber(String),

    /// tracks defined over different contigs or bin sizes were combined
    #[error("genome assembly mismatch: {0}")]
    GenomeMismatch(String),

    /// StateMap or equality constraints do not form a valid partition
    #[error("inconsistent state partition: {0}")]
    InconsistentPartition(String),

    /// matrix whose dimensions do not fit its layout
    #[error("shape error: {0}")]
    Shape(String),

    /// malformed track or read file
    #[error("format error in `{path}` line {line}: {message}")]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// rayon pool could not be built
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
    pub fn htslib(path: impl Into<PathBuf>, source: rust_htslib::errors::Error) -> Self {
        Error::Htslib {
            path: path.into(),
            source,
        }
    }
    pub fn format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

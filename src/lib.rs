//!
//! Chromatin-state segmentation from multiple sequencing assays
//!
//! Stages, in pipeline order:
//!
//! 1. `coverage`: read counts per bin
//! 2. `mixture`: per-feature enrichment probability
//! 3. `pattern`: per-state peak-pattern scores
//! 4. `tying` and `hmm`: state-tied HMM, segmentation and posteriors
//! 5. `peaks`: regions of high posterior
//!
//! `pipeline` schedules them lazily with `stale`.
//!
pub mod config;
pub mod coverage;
pub mod error;
pub mod feature;
pub mod hmm;
pub mod mixture;
pub mod pattern;
pub mod peaks;
pub mod pipeline;
pub mod prob;
pub mod stale;
pub mod track;
pub mod tying;

extern crate jemallocator;
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

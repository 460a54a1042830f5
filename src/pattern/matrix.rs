//!
//! PositionMatrix: per-mark peak / no-peak probabilities around one bin
//!
use crate::error::{Error, Result};
use crate::feature::Feature;
use ndarray::Array2;

///
/// Values of one matrix are either all probabilities or all
/// log-probabilities.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Linear,
    Log,
}

///
/// `2k x n` matrix for `k` marks and a window of `n` bins.
///
/// Row `2i` holds the peak probability of mark `i` at each offset and row
/// `2i + 1` the no-peak probability. Column `n / 2` is the query bin.
///
#[derive(Clone, Debug, PartialEq)]
pub struct PositionMatrix {
    values: Array2<f64>,
    domain: Domain,
}

impl PositionMatrix {
    /// rows must come in peak/no-peak pairs
    pub fn new(values: Array2<f64>, domain: Domain) -> Result<Self> {
        if values.nrows() % 2 != 0 {
            return Err(Error::Shape(format!(
                "{} rows do not form peak/no-peak pairs",
                values.nrows()
            )));
        }
        Ok(PositionMatrix { values, domain })
    }
    ///
    /// Matrix for all features of `Feature::ALL` filled with `fill`
    ///
    pub fn filled(n_cols: usize, domain: Domain, fill: f64) -> Self {
        PositionMatrix {
            values: Array2::from_elem((2 * Feature::ALL.len(), n_cols), fill),
            domain,
        }
    }
    ///
    /// Probability-domain matrix from row vectors
    ///
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, |r| r.len());
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let values = Array2::from_shape_vec((rows.len(), n_cols), flat)
            .map_err(|e| Error::Shape(format!("rows of unequal length: {}", e)))?;
        PositionMatrix::new(values, Domain::Linear)
    }
    pub fn to_log(&self) -> Self {
        match self.domain {
            Domain::Log => self.clone(),
            Domain::Linear => PositionMatrix {
                values: self.values.mapv(f64::ln),
                domain: Domain::Log,
            },
        }
    }
    pub fn domain(&self) -> Domain {
        self.domain
    }
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }
    pub fn n_marks(&self) -> usize {
        self.values.nrows() / 2
    }
    pub fn center(&self) -> usize {
        self.n_cols() / 2
    }
    /// peak value of the mark whose peak row is `row`, at column `j`
    #[inline]
    pub fn peak(&self, row: usize, j: usize) -> f64 {
        self.values[[row, j]]
    }
    /// no-peak value of the mark whose peak row is `row`, at column `j`
    #[inline]
    pub fn nopeak(&self, row: usize, j: usize) -> f64 {
        self.values[[row + 1, j]]
    }
    pub fn set(&mut self, row: usize, j: usize, peak: f64, nopeak: f64) {
        self.values[[row, j]] = peak;
        self.values[[row + 1, j]] = nopeak;
    }
    ///
    /// column index of an offset relative to the center,
    /// clamped into the window
    ///
    pub fn column(&self, offset: isize) -> usize {
        let j = self.center() as isize + offset;
        j.max(0).min(self.n_cols() as isize - 1) as usize
    }
}

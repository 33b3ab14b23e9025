//! Fixed-width 1D histogram with TH1-style statistics.

use crate::error::{Result, RootError};

/// A 1D histogram with uniform bins over `[x_min, x_max)`.
///
/// Under- and overflow are kept apart from the bins. The running sums behind
/// [`mean`](Self::mean) only see in-range fills, which is what `TH1::GetMean`
/// reports by default.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    n_bins: usize,
    x_min: f64,
    x_max: f64,
    contents: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
    sum_w: f64,
    sum_wx: f64,
}

impl Histogram1D {
    /// Create an empty histogram.
    pub fn new(n_bins: usize, x_min: f64, x_max: f64) -> Result<Self> {
        if n_bins == 0 {
            return Err(RootError::Histogram("need at least one bin".into()));
        }
        if !(x_min < x_max) || !x_min.is_finite() || !x_max.is_finite() {
            return Err(RootError::Histogram(format!("invalid range [{x_min}, {x_max})")));
        }
        Ok(Self {
            n_bins,
            x_min,
            x_max,
            contents: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            sum_w: 0.0,
            sum_wx: 0.0,
        })
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Fill with weight `w`.
    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        self.entries += 1;
        if x < self.x_min {
            self.underflow += w;
        } else if !(x < self.x_max) {
            // NaN lands here as well, like TAxis::FindBin
            self.overflow += w;
        } else {
            let width = (self.x_max - self.x_min) / self.n_bins as f64;
            let bin = (((x - self.x_min) / width) as usize).min(self.n_bins - 1);
            self.contents[bin] += w;
            self.sum_w += w;
            self.sum_wx += w * x;
        }
    }

    /// Number of fills, including under/overflow.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Weighted mean of in-range fills; 0 when nothing was filled in range.
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 { 0.0 } else { self.sum_wx / self.sum_w }
    }

    /// Content of bin `i` (0-based, excluding under/overflow).
    pub fn bin_content(&self, i: usize) -> Option<f64> {
        self.contents.get(i).copied()
    }

    /// All bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Bin edges, `n_bins + 1` values.
    pub fn bin_edges(&self) -> Vec<f64> {
        let width = (self.x_max - self.x_min) / self.n_bins as f64;
        (0..=self.n_bins).map(|i| self.x_min + width * i as f64).collect()
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Sum of weights below `x_min`.
    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Sum of weights at or above `x_max`.
    pub fn overflow(&self) -> f64 {
        self.overflow
    }
}

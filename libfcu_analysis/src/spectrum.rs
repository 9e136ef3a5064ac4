use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::error::NormalizeError;

/// Uniform binning of a numeric domain [min, max) into n_bins half-open bins
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    pub n_bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Binning {
    pub fn new(n_bins: usize, min: f64, max: f64) -> Self {
        Self { n_bins, min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.n_bins > 0 && self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }

    /// Find the bin containing x.
    ///
    /// Bins are numbered 1..=n_bins; 0 is the underflow and n_bins + 1 the overflow.
    /// The lower edge of a bin belongs to it, so x == max is overflow. NaN is overflow.
    pub fn find_bin(&self, x: f64) -> usize {
        if x.is_nan() || x >= self.max {
            self.n_bins + 1
        } else if x < self.min {
            0
        } else {
            let bin = (self.n_bins as f64 * (x - self.min) / (self.max - self.min)) as usize;
            // rounding can put a value just below max at n_bins
            1 + bin.min(self.n_bins.saturating_sub(1))
        }
    }

    /// The n_bins + 1 edges of the binning
    pub fn edges(&self) -> Vec<f64> {
        let width = self.bin_width();
        (0..=self.n_bins)
            .map(|i| self.min + i as f64 * width)
            .collect()
    }

    /// Center of the bin with 0-based index idx
    pub fn bin_center(&self, idx: usize) -> f64 {
        self.min + (idx as f64 + 0.5) * self.bin_width()
    }
}

/// A fixed-binning frequency spectrum.
///
/// `counts` is indexed from 0 (bin 1 of [`Binning::find_bin`] is `counts[0]`). `entries`
/// counts every value filled, including those that landed in the underflow or overflow,
/// and is never rescaled.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    binning: Binning,
    counts: Array1<f64>,
    entries: u64,
    underflow: u64,
    overflow: u64,
}

impl Spectrum {
    /// An empty spectrum
    pub fn new(binning: Binning) -> Self {
        Self {
            binning,
            counts: Array1::zeros(binning.n_bins),
            entries: 0,
            underflow: 0,
            overflow: 0,
        }
    }

    /// Bin the values, optionally keeping only those strictly above a threshold
    pub fn build(values: &[f64], binning: Binning, threshold: Option<f64>) -> Self {
        let mut spectrum = Self::new(binning);
        match threshold {
            Some(cut) => spectrum.fill_from(values.iter().copied().filter(|v| *v > cut)),
            None => spectrum.fill_from(values.iter().copied()),
        }
        spectrum
    }

    pub fn fill(&mut self, x: f64) {
        self.entries += 1;
        let bin = self.binning.find_bin(x);
        if bin == 0 {
            self.underflow += 1;
        } else if bin > self.binning.n_bins {
            self.overflow += 1;
        } else {
            self.counts[bin - 1] += 1.0;
        }
    }

    pub fn fill_from<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for x in values {
            self.fill(x);
        }
    }

    /// A copy with every bin divided by the exposure
    pub fn normalized(&self, exposure: f64) -> Result<Self, NormalizeError> {
        if exposure.is_nan() || exposure <= 0.0 {
            return Err(NormalizeError::DivisionByZero { exposure });
        }
        Ok(Self {
            binning: self.binning,
            counts: &self.counts / exposure,
            entries: self.entries,
            underflow: self.underflow,
            overflow: self.overflow,
        })
    }

    /// Sum of the bin contents from bin `first` to bin `last` inclusive, using
    /// [`Binning::find_bin`] numbering. Underflow and overflow are never included.
    pub fn integral(&self, first: usize, last: usize) -> f64 {
        let first = first.max(1);
        let last = last.min(self.binning.n_bins);
        if first > last {
            return 0.0;
        }
        self.counts
            .slice(ndarray::s![(first - 1)..last])
            .sum()
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    pub fn counts(&self) -> &Array1<f64> {
        &self.counts
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Number of entries discarded as outside the domain
    pub fn discarded(&self) -> u64 {
        self.underflow + self.overflow
    }
}

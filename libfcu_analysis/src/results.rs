use fxhash::FxHashMap;

use super::efficiency::EfficiencyPoint;
use super::error::AnalysisError;
use super::gaussian_fit::GaussianFit;
use super::spectrum::Spectrum;

/// Timing calibration of one detector relative to the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub detector_id: u32,
    pub mean: f64,
    pub mean_error: f64,
    pub sigma: f64,
    pub sigma_error: f64,
    pub entries: u64,
}

impl CalibrationResult {
    pub fn from_fit(detector_id: u32, fit: &GaussianFit) -> Self {
        Self {
            detector_id,
            mean: fit.mean,
            mean_error: fit.mean_error,
            sigma: fit.sigma,
            sigma_error: fit.sigma_error,
            entries: fit.entries,
        }
    }
}

/// Efficiency points ordered by run group, one pre-allocated slot per group.
///
/// Slot i holds the point of group i + 1, so the order never depends on which
/// worker finished first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EfficiencySeries {
    slots: Vec<Option<EfficiencyPoint>>,
}

impl EfficiencySeries {
    pub fn with_slots(n_groups: usize) -> Self {
        Self {
            slots: vec![None; n_groups],
        }
    }

    /// Place a point in the slot of its run group. Returns false if there is no such slot
    pub fn insert(&mut self, point: EfficiencyPoint) -> bool {
        match point
            .run_group_index
            .checked_sub(1)
            .and_then(|idx| self.slots.get_mut(idx))
        {
            Some(slot) => {
                *slot = Some(point);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, run_group_index: usize) -> Option<&EfficiencyPoint> {
        run_group_index
            .checked_sub(1)
            .and_then(|idx| self.slots.get(idx))
            .and_then(|slot| slot.as_ref())
    }

    /// The filled points in run group order
    pub fn points(&self) -> impl Iterator<Item = &EfficiencyPoint> {
        self.slots.iter().flatten()
    }

    /// (x, y, y error) triples for plotting; x is the run group index
    pub fn triples(&self) -> Vec<(f64, f64, f64)> {
        self.points()
            .map(|p| (p.run_group_index as f64, p.value, p.error))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_some())
    }
}

/// Calibration results keyed by detector, kept in analysis order
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    rows: Vec<CalibrationResult>,
    index: FxHashMap<u32, usize>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result. A second result for the same detector replaces the first in place
    pub fn insert(&mut self, result: CalibrationResult) {
        match self.index.get(&result.detector_id) {
            Some(row) => self.rows[*row] = result,
            None => {
                self.index.insert(result.detector_id, self.rows.len());
                self.rows.push(result);
            }
        }
    }

    pub fn get(&self, detector_id: u32) -> Option<&CalibrationResult> {
        self.index.get(&detector_id).map(|row| &self.rows[*row])
    }

    pub fn rows(&self) -> &[CalibrationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything produced by one efficiency analysis of one detector
#[derive(Debug)]
pub struct EfficiencyReport {
    pub detector: u32,
    pub threshold: f64,
    pub series: EfficiencySeries,
    /// Normalized full-range spectrum per group, labelled for the legend
    pub spectra: Vec<(Spectrum, String)>,
    /// Normalized above-threshold spectrum per group
    pub cut_spectra: Vec<(Spectrum, String)>,
    pub failures: Vec<AnalysisError>,
}

/// Everything produced by one gamma-flash calibration
#[derive(Debug)]
pub struct CalibrationReport {
    pub table: CalibrationTable,
    /// Time-difference spectrum per detector, labelled for the legend
    pub spectra: Vec<(Spectrum, String)>,
    pub failures: Vec<AnalysisError>,
}

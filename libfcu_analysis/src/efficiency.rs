use super::error::NormalizeError;
use super::spectrum::Spectrum;

/// Exposure-normalized event rate above threshold for one run group.
///
/// This is a count per unit of beam intensity, not a probability; it is not bounded by 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EfficiencyPoint {
    pub run_group_index: usize,
    pub value: f64,
    pub error: f64,
}

/// Integrate a normalized spectrum from the bin holding the threshold up to the end
/// of its domain.
///
/// The error is the Poisson error of the raw entry count, scaled by the same
/// exposure: sqrt(raw_entries) / exposure.
pub fn compute_efficiency(
    run_group_index: usize,
    normalized: &Spectrum,
    raw_entries: u64,
    exposure: f64,
    threshold: f64,
) -> Result<EfficiencyPoint, NormalizeError> {
    if exposure.is_nan() || exposure <= 0.0 {
        return Err(NormalizeError::DivisionByZero { exposure });
    }
    let binning = normalized.binning();
    let bin_cut = binning.find_bin(threshold);
    let bin_end = binning.find_bin(binning.max);
    Ok(EfficiencyPoint {
        run_group_index,
        value: normalized.integral(bin_cut, bin_end),
        error: (raw_entries as f64).sqrt() / exposure,
    })
}

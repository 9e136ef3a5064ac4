/// Sort timestamps and collapse exact duplicates.
///
/// Several hits of one pulse share the pulse's gamma-flash time, so after this each
/// pulse appears once.
pub fn deduplicate(timestamps: &[f64]) -> Vec<f64> {
    let mut unique = timestamps.to_vec();
    unique.sort_by(f64::total_cmp);
    unique.dedup();
    unique
}

/// Reference minus target time for each pulse.
///
/// Both sets are deduplicated and then paired by position; the result has the length
/// of the shorter set. Pairing by position assumes that both streams saw the same
/// pulses. If one of them missed a pulse every later difference is shifted.
pub fn time_differences(reference: &[f64], target: &[f64]) -> Vec<f64> {
    let reference = deduplicate(reference);
    let target = deduplicate(target);
    if reference.len() != target.len() {
        log::warn!(
            "Pairing {} reference pulses with {} target pulses; the streams may be out of step",
            reference.len(),
            target.len()
        );
    }
    reference
        .iter()
        .zip(target.iter())
        .map(|(r, t)| r - t)
        .collect()
}

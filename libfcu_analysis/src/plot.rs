use super::results::{CalibrationTable, EfficiencySeries};
use super::spectrum::Spectrum;

/// Receiver of the analysis products for display.
///
/// Implementations own all drawing decisions; the analysis only hands over finished
/// spectra, series and tables.
pub trait PlotSink {
    /// Spectra to be drawn on top of each other, with their legend labels
    fn overlay_spectra(&mut self, title: &str, spectra: &[(Spectrum, String)]);
    fn efficiency_series(&mut self, title: &str, series: &EfficiencySeries);
    fn calibration_table(&mut self, title: &str, table: &CalibrationTable);
}

/// One summary line per spectrum
pub fn spectrum_lines(spectra: &[(Spectrum, String)]) -> Vec<String> {
    spectra
        .iter()
        .map(|(spectrum, label)| {
            let edges = spectrum.binning().edges();
            let peak = spectrum
                .counts()
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (idx, c)| {
                    if *c > best.1 {
                        (idx, *c)
                    } else {
                        best
                    }
                });
            format!(
                "{label}: entries = {}, integral = {:.4e}, peak in [{:.1}, {:.1}) ({:.4e}), underflow = {}, overflow = {}",
                spectrum.entries(),
                spectrum.counts().sum(),
                edges[peak.0],
                edges.get(peak.0 + 1).copied().unwrap_or(edges[peak.0]),
                peak.1,
                spectrum.underflow(),
                spectrum.overflow()
            )
        })
        .collect()
}

pub fn efficiency_lines(series: &EfficiencySeries) -> Vec<String> {
    let mut lines = vec![format!("{:>8} {:>14} {:>14}", "Runlist", "Efficiency", "Error")];
    lines.extend(
        series
            .triples()
            .into_iter()
            .map(|(x, y, err)| format!("{:>8} {:>14.6e} {:>14.6e}", x as usize, y, err)),
    );
    lines
}

/// Rows in the style of the calibration legend
pub fn calibration_lines(table: &CalibrationTable) -> Vec<String> {
    table
        .rows()
        .iter()
        .map(|row| {
            format!(
                "FCU{}: Entries = {}, Mean = {:.3} +/- {:.3} ns, Sigma = {:.3} +/- {:.3} ns",
                row.detector_id, row.entries, row.mean, row.mean_error, row.sigma, row.sigma_error
            )
        })
        .collect()
}

/// A PlotSink which writes text summaries to the log
#[derive(Debug, Default)]
pub struct LogPlotSink;

impl PlotSink for LogPlotSink {
    fn overlay_spectra(&mut self, title: &str, spectra: &[(Spectrum, String)]) {
        log::info!("{title}");
        for line in spectrum_lines(spectra) {
            log::info!("  {line}");
        }
    }

    fn efficiency_series(&mut self, title: &str, series: &EfficiencySeries) {
        log::info!("{title}");
        for line in efficiency_lines(series) {
            log::info!("  {line}");
        }
    }

    fn calibration_table(&mut self, title: &str, table: &CalibrationTable) {
        log::info!("{title}");
        for line in calibration_lines(table) {
            log::info!("  {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficiency::EfficiencyPoint;
    use crate::results::CalibrationResult;
    use crate::spectrum::Binning;

    #[test]
    fn test_calibration_lines() {
        let mut table = CalibrationTable::new();
        table.insert(CalibrationResult {
            detector_id: 3,
            mean: 664.12345,
            mean_error: 0.04321,
            sigma: 11.9876,
            sigma_error: 0.0312,
            entries: 18234,
        });
        assert_eq!(
            calibration_lines(&table),
            vec![String::from(
                "FCU3: Entries = 18234, Mean = 664.123 +/- 0.043 ns, Sigma = 11.988 +/- 0.031 ns"
            )]
        );
    }

    #[test]
    fn test_efficiency_lines_skip_missing_groups() {
        let mut series = EfficiencySeries::with_slots(3);
        for idx in [1, 3] {
            series.insert(EfficiencyPoint {
                run_group_index: idx,
                value: 1.0e-15,
                error: 1.0e-17,
            });
        }
        let lines = efficiency_lines(&series);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].trim_start().starts_with('3'));
    }

    #[test]
    fn test_spectrum_lines() {
        let spectrum = Spectrum::build(&[1.5, 2.5, 2.6, 12.0], Binning::new(10, 0.0, 10.0), None);
        let lines = spectrum_lines(&[(spectrum, String::from("runlist 1 - Sin"))]);
        assert!(lines[0].starts_with("runlist 1 - Sin: entries = 4"));
        assert!(lines[0].contains("peak in [2.0, 3.0)"));
        assert!(lines[0].ends_with("underflow = 0, overflow = 1"));
    }

    #[test]
    fn test_log_sink_accepts_everything() {
        let mut sink = LogPlotSink;
        sink.overlay_spectra("empty", &[]);
        sink.efficiency_series("empty", &EfficiencySeries::with_slots(2));
        sink.calibration_table("empty", &CalibrationTable::new());
    }
}

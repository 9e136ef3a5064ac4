use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::{AnalysisError, SourceError};
use super::event_source::{EventSource, Field, Stream};
use super::gaussian_fit::{GaussianFit, GaussianFitter};
use super::results::{CalibrationReport, CalibrationResult, CalibrationTable};
use super::run_group::RunGroup;
use super::spectrum::Spectrum;
use super::time_difference::time_differences;
use super::worker_status::{Phase, WorkerStatus};

/// Build the monitor - detector gamma-flash time spectrum of one detector
pub fn time_difference_spectrum<S: EventSource>(
    source: &S,
    config: &Config,
    group: &RunGroup,
    monitor_times: &[f64],
    detector: u32,
) -> Result<Spectrum, SourceError> {
    let events = source.events(Stream::Detector, Some(detector), &[Field::Timestamp], group)?;
    let differences = time_differences(monitor_times, events.column(Field::Timestamp, group)?);
    Ok(Spectrum::build(&differences, config.time_binning, None))
}

fn log_fit(detector: u32, fit: &GaussianFit) {
    log::info!(
        "Detector {detector}: Entries = {}, Mean = {:.3} +/- {:.3} ns, Sigma = {:.3} +/- {:.3} ns",
        fit.entries,
        fit.mean,
        fit.mean_error,
        fit.sigma,
        fit.sigma_error
    );
    log::debug!(
        "Detector {detector}: fit took {} iterations, residual sum of squares {:.4e}",
        fit.iterations,
        fit.residual
    );
}

/// Calibrate the gamma-flash time of every configured detector against the monitor.
///
/// A detector whose data or fit fails is reported in the failures and does not stop the
/// others. Failing to read the monitor stream fails the whole calibration.
pub fn run_calibration<S: EventSource, F: GaussianFitter>(
    config: &Config,
    source: &S,
    fitter: &F,
    tx: &Sender<WorkerStatus>,
) -> Result<CalibrationReport, AnalysisError> {
    config.validate()?;
    let group = config.calibration_group();
    log::info!("Building gamma-flash calibration for runs {:?}", group.runs());

    let monitor = source
        .events(Stream::Monitor, None, &[Field::Timestamp], &group)
        .map_err(AnalysisError::MonitorSource)?;
    let monitor_times = monitor
        .column(Field::Timestamp, &group)
        .map_err(AnalysisError::MonitorSource)?;

    let mut report = CalibrationReport {
        table: CalibrationTable::new(),
        spectra: Vec::new(),
        failures: Vec::new(),
    };

    let n_detectors = config.detlist.len();
    for (idx, detector) in config.detlist.iter().enumerate() {
        tx.send(WorkerStatus::new(
            idx as f32 / n_detectors as f32,
            idx + 1,
            0,
            Phase::Calibration,
        ))?;

        let spectrum =
            match time_difference_spectrum(source, config, &group, monitor_times, *detector) {
                Ok(s) => s,
                Err(e) => {
                    log::error!("Detector {detector} skipped: {e}");
                    report.failures.push(AnalysisError::DetectorSource {
                        detector: *detector,
                        source: e,
                    });
                    continue;
                }
            };

        match fitter.fit(&spectrum, config.fit_window, None) {
            Ok(fit) => {
                log_fit(*detector, &fit);
                report
                    .table
                    .insert(CalibrationResult::from_fit(*detector, &fit));
            }
            Err(e) => {
                log::error!("Detector {detector} fit failed: {e}");
                report.failures.push(AnalysisError::DetectorFit {
                    detector: *detector,
                    source: e,
                });
            }
        }
        report.spectra.push((
            spectrum,
            format!("PKUP signal - tgflash of FCU{detector}"),
        ));
    }

    tx.send(WorkerStatus::new(1.0, n_detectors, 0, Phase::Calibration))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, FitError};
    use crate::event_source::{EventColumns, InMemorySource};
    use crate::gaussian_fit::LevenbergMarquardt;
    use crate::spectrum::Binning;
    use std::sync::mpsc;

    /// Pulses at 1000 ns intervals. Detector hits come `offset` ns before the monitor
    /// signal, with a bell-shaped deterministic jitter of zero mean
    fn make_source(detectors: &[(u32, f64)], n_pulses: usize) -> InMemorySource {
        let monitor_times: Vec<f64> = (0..n_pulses).map(|p| 1.0e6 + p as f64 * 1000.0).collect();
        let mut amp = Vec::new();
        let mut tflash = Vec::new();
        let mut detn = Vec::new();
        for (det, offset) in detectors {
            for (p, t) in monitor_times.iter().enumerate() {
                let jitter = ((p * 7) % 11 + (p * 13) % 17 + (p * 3) % 7) as f64 - 16.0;
                // two hits of the same pulse share its flash time
                for _ in 0..2 {
                    amp.push(5000.0);
                    tflash.push(t - offset - jitter);
                    detn.push(*det as f64);
                }
            }
        }
        let mut source = InMemorySource::new();
        source.insert(
            1,
            Stream::Detector,
            EventColumns::from_columns([
                (Field::Amplitude, amp),
                (Field::Timestamp, tflash),
                (Field::DetectorTag, detn),
            ])
            .unwrap(),
        );
        source.insert(
            1,
            Stream::Monitor,
            EventColumns::from_columns([
                (Field::Timestamp, monitor_times.clone()),
                (Field::PulseIntensity, vec![1.0; n_pulses]),
            ])
            .unwrap(),
        );
        source
    }

    fn make_config(detlist: Vec<u32>) -> Config {
        let mut config = Config::default();
        config.runlist = vec![1];
        config.detlist = detlist;
        config
    }

    #[test]
    fn test_calibrates_each_detector() {
        let source = make_source(&[(1, 650.0), (2, 680.0)], 2000);
        let config = make_config(vec![2, 1]);
        let (tx, rx) = mpsc::channel();
        let report = run_calibration(&config, &source, &LevenbergMarquardt::default(), &tx)
            .unwrap();

        assert!(report.failures.is_empty());
        let ids: Vec<u32> = report.table.rows().iter().map(|r| r.detector_id).collect();
        assert_eq!(ids, vec![2, 1]);
        let first = report.table.get(1).unwrap();
        let second = report.table.get(2).unwrap();
        assert!((first.mean - 650.0).abs() < 2.0, "mean {}", first.mean);
        assert!((second.mean - 680.0).abs() < 2.0, "mean {}", second.mean);
        assert_eq!(first.entries, 2000);
        assert_eq!(report.spectra.len(), 2);
        assert_eq!(report.spectra[0].1, "PKUP signal - tgflash of FCU2");
        assert!(rx.try_iter().count() >= 3);
    }

    #[test]
    fn test_failed_detector_does_not_stop_others() {
        let source = make_source(&[(1, 650.0)], 500);
        let config = make_config(vec![1, 8]);
        let (tx, _rx) = mpsc::channel();
        let report = run_calibration(&config, &source, &LevenbergMarquardt::default(), &tx)
            .unwrap();

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0] {
            AnalysisError::DetectorFit {
                detector,
                source: FitError::Underdetermined { .. },
            } => assert_eq!(*detector, 8),
            other => panic!("Expected a failed fit for detector 8, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_time_binning_is_rejected() {
        let source = make_source(&[(1, 650.0)], 10);
        let mut config = make_config(vec![1]);
        config.time_binning = Binning::new(0, 450.0, 850.0);
        let (tx, rx) = mpsc::channel();
        let result = run_calibration(&config, &source, &LevenbergMarquardt::default(), &tx);
        assert!(matches!(
            result,
            Err(AnalysisError::ConfigError(ConfigError::BadBinning { n_bins: 0, .. }))
        ));
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_missing_monitor_times() {
        let mut source = InMemorySource::new();
        source.insert(
            1,
            Stream::Monitor,
            EventColumns::from_columns([(Field::PulseIntensity, vec![1.0])]).unwrap(),
        );
        let config = make_config(vec![1]);
        let (tx, _rx) = mpsc::channel();
        let result = run_calibration(&config, &source, &LevenbergMarquardt::default(), &tx);
        assert!(matches!(result, Err(AnalysisError::MonitorSource(_))));
    }
}

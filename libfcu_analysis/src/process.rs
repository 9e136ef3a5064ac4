use std::ops::Range;
use std::sync::mpsc::Sender;

use super::config::Config;
use super::efficiency::{compute_efficiency, EfficiencyPoint};
use super::error::{AnalysisError, NormalizeError};
use super::event_source::{EventSource, Field, Stream};
use super::exposure::group_exposure;
use super::results::{EfficiencyReport, EfficiencySeries};
use super::run_group::RunGroup;
use super::spectrum::Spectrum;
use super::worker_status::{Phase, WorkerStatus};

/// The products of one run group: its efficiency point and both normalized spectra
#[derive(Debug, Clone)]
pub struct GroupEfficiency {
    pub point: EfficiencyPoint,
    pub spectrum: Spectrum,
    pub cut_spectrum: Spectrum,
}

type GroupOutcome = Option<Result<GroupEfficiency, AnalysisError>>;

/// Analyse a single run group.
///
/// Exposure, the full and the above-threshold amplitude spectra, normalization and the
/// efficiency integral, in that order.
pub fn process_group<S: EventSource>(
    config: &Config,
    source: &S,
    group: &RunGroup,
    detector: u32,
    threshold: f64,
) -> Result<GroupEfficiency, AnalysisError> {
    let index = group.index();
    let exposure = group_exposure(source, group).map_err(|e| AnalysisError::GroupSource {
        group: index,
        source: e,
    })?;
    log::info!("Run group {index}: total pulse intensity {exposure:e}");

    let events = source
        .events(Stream::Detector, Some(detector), &[Field::Amplitude], group)
        .map_err(|e| AnalysisError::GroupSource {
            group: index,
            source: e,
        })?;
    log::debug!("Run group {index} detector events:\n{}", events.preview(5));
    let amplitudes = events
        .column(Field::Amplitude, group)
        .map_err(|e| AnalysisError::GroupSource {
            group: index,
            source: e,
        })?;

    let raw = Spectrum::build(amplitudes, config.amplitude_binning, None);
    let raw_cut = Spectrum::build(amplitudes, config.amplitude_binning, Some(threshold));
    if raw.discarded() > 0 {
        log::warn!(
            "Run group {index}: {} amplitudes outside the spectrum range",
            raw.discarded()
        );
    }

    let normalize_error = |e: NormalizeError| AnalysisError::GroupNormalize {
        group: index,
        source: e,
    };
    let spectrum = raw.normalized(exposure).map_err(normalize_error)?;
    let cut_spectrum = raw_cut.normalized(exposure).map_err(normalize_error)?;
    let point = compute_efficiency(index, &cut_spectrum, raw_cut.entries(), exposure, threshold)
        .map_err(normalize_error)?;

    Ok(GroupEfficiency {
        point,
        spectrum,
        cut_spectrum,
    })
}

/// Process a contiguous subset of the run groups, writing each outcome to its own slot
#[allow(clippy::too_many_arguments)]
pub fn process_subset<S: EventSource>(
    config: &Config,
    source: &S,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
    groups: &[RunGroup],
    slots: &mut [GroupOutcome],
    detector: u32,
    threshold: f64,
) -> Result<(), AnalysisError> {
    let n_groups = groups.len();
    for (done, (group, slot)) in groups.iter().zip(slots.iter_mut()).enumerate() {
        tx.send(WorkerStatus::new(
            done as f32 / n_groups as f32,
            group.index(),
            worker_id,
            Phase::Efficiency,
        ))?;
        let outcome = process_group(config, source, group, detector, threshold);
        if let Err(e) = &outcome {
            log::error!("{e}");
        }
        *slot = Some(outcome);
    }
    tx.send(WorkerStatus::new(
        1.0,
        groups.last().map(|g| g.index()).unwrap_or(0),
        worker_id,
        Phase::Efficiency,
    ))?;
    Ok(())
}

/// Divide the run groups into contiguous index ranges, one per worker.
///
/// Only workers that would have something to do get a range.
pub fn create_subsets(n_groups: usize, n_threads: i32) -> Vec<Range<usize>> {
    let n_workers = (n_threads.max(1) as usize).min(n_groups);
    if n_workers == 0 {
        return vec![];
    }
    let base = n_groups / n_workers;
    let extra = n_groups % n_workers;
    let mut start = 0;
    (0..n_workers)
        .map(|worker| {
            let len = base + usize::from(worker < extra);
            let range = start..(start + len);
            start += len;
            range
        })
        .collect()
}

/// The efficiency analysis of one detector over every configured run group.
///
/// Groups are spread over `n_threads` workers, each with its own clone of the source.
/// A failed group is reported in the failures of the report and leaves a hole in the
/// series; its siblings are unaffected.
pub fn run_efficiency<S: EventSource>(
    config: &Config,
    detector: u32,
    source: &S,
    tx: &Sender<WorkerStatus>,
) -> Result<EfficiencyReport, AnalysisError> {
    config.validate()?;
    let threshold = config.cut_for(detector)?;
    run_efficiency_with_cut(config, detector, threshold, source, tx)
}

/// The efficiency analysis of one detector with an already resolved threshold
fn run_efficiency_with_cut<S: EventSource>(
    config: &Config,
    detector: u32,
    threshold: f64,
    source: &S,
    tx: &Sender<WorkerStatus>,
) -> Result<EfficiencyReport, AnalysisError> {
    let groups = config.run_groups()?;
    log::info!("Analysing detector {detector}");
    log::info!("With amplitude threshold: {} channels", threshold as i64);

    let mut outcomes: Vec<GroupOutcome> = (0..groups.len()).map(|_| None).collect();
    let subsets = create_subsets(groups.len(), config.n_threads);

    let worker_results = std::thread::scope(|scope| {
        let mut handles = Vec::new();
        let mut remaining = outcomes.as_mut_slice();
        for (worker_id, range) in subsets.into_iter().enumerate() {
            let (slots, rest) = std::mem::take(&mut remaining).split_at_mut(range.len());
            remaining = rest;
            let subset = &groups[range];
            let worker_source = source.clone();
            let worker_tx = tx.clone();
            handles.push(scope.spawn(move || {
                process_subset(
                    config,
                    &worker_source,
                    &worker_tx,
                    worker_id,
                    subset,
                    slots,
                    detector,
                    threshold,
                )
            }));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(Err(AnalysisError::WorkerPanic)))
            .collect::<Vec<_>>()
    });
    for result in worker_results {
        result?;
    }

    let mut report = EfficiencyReport {
        detector,
        threshold,
        series: EfficiencySeries::with_slots(groups.len()),
        spectra: Vec::new(),
        cut_spectra: Vec::new(),
        failures: Vec::new(),
    };
    for (group, outcome) in groups.iter().zip(outcomes) {
        match outcome {
            Some(Ok(result)) => {
                report.series.insert(result.point);
                report
                    .spectra
                    .push((result.spectrum, group.display_label()));
                report
                    .cut_spectra
                    .push((result.cut_spectrum, group.display_label()));
            }
            Some(Err(e)) => report.failures.push(e),
            None => log::warn!("Run group {} was never processed", group.index()),
        }
    }
    Ok(report)
}

/// The efficiency analysis of several detectors, one after the other.
///
/// Every detector must have a configured cut; this is checked before any data is read.
pub fn run_efficiency_detectors<S: EventSource>(
    config: &Config,
    detectors: &[u32],
    source: &S,
    tx: &Sender<WorkerStatus>,
) -> Result<Vec<EfficiencyReport>, AnalysisError> {
    config.validate()?;
    let cuts = config.cut_table(detectors)?;
    detectors
        .iter()
        .map(|det| run_efficiency_with_cut(config, *det, cuts[det], source, tx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SourceError};
    use crate::event_source::{EventColumns, InMemorySource};
    use crate::run_group::RunListConfig;
    use crate::spectrum::Binning;
    use std::sync::mpsc;

    const DETECTOR: u32 = 2;

    fn insert_run(source: &mut InMemorySource, run: i32, amplitudes: Vec<f64>, exposure: f64) {
        let n = amplitudes.len();
        source.insert(
            run,
            Stream::Detector,
            EventColumns::from_columns([
                (Field::Amplitude, amplitudes),
                (Field::DetectorTag, vec![DETECTOR as f64; n]),
            ])
            .unwrap(),
        );
        source.insert(
            run,
            Stream::Monitor,
            EventColumns::from_columns([(Field::PulseIntensity, vec![exposure])]).unwrap(),
        );
    }

    fn make_config(n_groups: usize, n_threads: i32) -> Config {
        let mut config = Config::default();
        config.runlists = (0..n_groups)
            .map(|i| RunListConfig {
                runs: vec![i as i32 + 1],
                label: String::from(if i % 2 == 0 { "Sin" } else { "Sout" }),
            })
            .collect();
        config.cuts.insert(DETECTOR, 25.0);
        config.amplitude_binning = Binning::new(10, 0.0, 100.0);
        config.n_threads = n_threads;
        config
    }

    #[test]
    fn test_two_group_scenario() {
        let mut source = InMemorySource::new();
        insert_run(&mut source, 1, vec![1.0, 2.0, 3.0, 50.0, 60.0], 100.0);
        // 25 sits on the cut and is not above it
        insert_run(&mut source, 2, vec![10.0, 20.0, 25.0, 40.0, 90.0], 200.0);
        let config = make_config(2, 1);
        let (tx, _rx) = mpsc::channel();

        let report = run_efficiency(&config, DETECTOR, &source, &tx).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.threshold, 25.0);

        let first = report.series.get(1).unwrap();
        assert_eq!(first.value, 0.02);
        assert!((first.error - 0.01414).abs() < 1e-5);
        let second = report.series.get(2).unwrap();
        assert_eq!(second.value, 0.01);
        assert!((second.error - 0.00707).abs() < 1e-5);

        assert_eq!(report.spectra.len(), 2);
        assert_eq!(report.spectra[0].1, "runlist 1 - Sin");
        assert_eq!(report.cut_spectra[1].0.entries(), 2);
        assert!((report.spectra[1].0.counts().sum() - 5.0 / 200.0).abs() < 1e-15);
    }

    #[test]
    fn test_workers_fill_every_slot_in_order() {
        let mut source = InMemorySource::new();
        for run in 1..=14 {
            insert_run(&mut source, run, vec![30.0; run as usize], 10.0);
        }
        let config = make_config(14, 4);
        let (tx, rx) = mpsc::channel();

        let report = run_efficiency(&config, DETECTOR, &source, &tx).unwrap();
        assert!(report.series.is_complete());
        for (idx, point) in report.series.points().enumerate() {
            assert_eq!(point.run_group_index, idx + 1);
            assert!((point.value - (idx + 1) as f64 / 10.0).abs() < 1e-12);
        }
        let workers: std::collections::BTreeSet<usize> = rx.try_iter().map(|s| s.worker_id).collect();
        assert_eq!(workers.len(), 4);
    }

    #[test]
    fn test_zero_exposure_group_is_reported() {
        let mut source = InMemorySource::new();
        insert_run(&mut source, 1, vec![50.0], 100.0);
        insert_run(&mut source, 2, vec![50.0], 0.0);
        insert_run(&mut source, 3, vec![50.0], 100.0);
        let config = make_config(3, 2);
        let (tx, _rx) = mpsc::channel();

        let report = run_efficiency(&config, DETECTOR, &source, &tx).unwrap();
        assert_eq!(report.series.points().count(), 2);
        assert!(report.series.get(2).is_none());
        assert_eq!(report.failures.len(), 1);
        match &report.failures[0] {
            AnalysisError::GroupNormalize {
                group,
                source: NormalizeError::DivisionByZero { .. },
            } => assert_eq!(*group, 2),
            other => panic!("Expected a zero exposure failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_amplitudes_are_reported() {
        let mut source = InMemorySource::new();
        insert_run(&mut source, 1, vec![50.0], 100.0);
        source.insert(
            2,
            Stream::Detector,
            EventColumns::from_columns([(Field::DetectorTag, vec![DETECTOR as f64])]).unwrap(),
        );
        source.insert(
            2,
            Stream::Monitor,
            EventColumns::from_columns([(Field::PulseIntensity, vec![1.0])]).unwrap(),
        );
        let config = make_config(2, 1);
        let (tx, _rx) = mpsc::channel();

        let report = run_efficiency(&config, DETECTOR, &source, &tx).unwrap();
        assert!(report.series.get(1).is_some());
        assert!(matches!(
            &report.failures[0],
            AnalysisError::GroupSource {
                group: 2,
                source: SourceError::MissingField {
                    field: Field::Amplitude,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_unconfigured_detector() {
        let source = InMemorySource::new();
        let config = make_config(2, 1);
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            run_efficiency(&config, 7, &source, &tx),
            Err(AnalysisError::ConfigError(_))
        ));
    }

    #[test]
    fn test_several_detectors_checked_up_front() {
        let mut source = InMemorySource::new();
        insert_run(&mut source, 1, vec![50.0], 100.0);
        let config = make_config(1, 1);
        let (tx, rx) = mpsc::channel();
        assert!(matches!(
            run_efficiency_detectors(&config, &[DETECTOR, 4], &source, &tx),
            Err(AnalysisError::ConfigError(ConfigError::MissingCut(4)))
        ));
        assert_eq!(rx.try_iter().count(), 0);

        let reports = run_efficiency_detectors(&config, &[DETECTOR], &source, &tx).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].threshold, 25.0);
        assert_eq!(reports[0].series.get(1).unwrap().value, 0.01);
    }

    #[test]
    fn test_create_subsets() {
        assert_eq!(create_subsets(14, 4), vec![0..4, 4..8, 8..11, 11..14]);
        assert_eq!(create_subsets(2, 3), vec![0..1, 1..2]);
        assert_eq!(create_subsets(5, 1), vec![0..5]);
        assert!(create_subsets(0, 2).is_empty());
    }
}

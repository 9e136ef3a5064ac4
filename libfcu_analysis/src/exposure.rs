use super::error::SourceError;
use super::event_source::{EventColumns, EventSource, Field, Stream};
use super::run_group::RunGroup;

/// Total monitor intensity of a group, the normalization denominator of its spectra.
///
/// An empty group has zero exposure.
pub fn accumulate_exposure(monitor: &EventColumns, group: &RunGroup) -> Result<f64, SourceError> {
    Ok(monitor.column(Field::PulseIntensity, group)?.iter().sum())
}

/// Query the monitor stream of a group and sum its pulse intensity
pub fn group_exposure<S: EventSource>(source: &S, group: &RunGroup) -> Result<f64, SourceError> {
    let monitor = source.events(Stream::Monitor, None, &[Field::PulseIntensity], group)?;
    accumulate_exposure(&monitor, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::InMemorySource;

    fn make_monitor(values: Vec<f64>) -> EventColumns {
        EventColumns::from_columns([(Field::PulseIntensity, values)]).unwrap()
    }

    #[test]
    fn test_sum_is_order_independent() {
        let group = RunGroup::new(1, "", &[1]);
        let values: Vec<f64> = (1..=500).map(|i| i as f64 * 1.37e10).collect();
        let mut reversed = values.clone();
        reversed.reverse();
        let forward = accumulate_exposure(&make_monitor(values), &group).unwrap();
        let backward = accumulate_exposure(&make_monitor(reversed), &group).unwrap();
        let expected = 1.37e10 * 500.0 * 501.0 / 2.0;
        assert!((forward - expected).abs() / expected < 1e-12);
        assert!((forward - backward).abs() / expected < 1e-12);
    }

    #[test]
    fn test_empty_group_has_zero_exposure() {
        let group = RunGroup::new(3, "", &[]);
        let monitor = EventColumns::empty(&[Field::PulseIntensity]);
        assert_eq!(accumulate_exposure(&monitor, &group).unwrap(), 0.0);
    }

    #[test]
    fn test_missing_intensity_field() {
        let group = RunGroup::new(5, "", &[1]);
        let monitor = EventColumns::from_columns([(Field::Timestamp, vec![1.0])]).unwrap();
        match accumulate_exposure(&monitor, &group) {
            Err(SourceError::MissingField { field, group }) => {
                assert_eq!(field, Field::PulseIntensity);
                assert_eq!(group, 5);
            }
            other => panic!("Expected a missing field, got {other:?}"),
        }
    }

    #[test]
    fn test_group_exposure_sums_runs() {
        let mut source = InMemorySource::new();
        source.insert(1, Stream::Monitor, make_monitor(vec![10.0, 20.0]));
        source.insert(2, Stream::Monitor, make_monitor(vec![70.0]));
        let group = RunGroup::new(1, "", &[1, 2]);
        assert_eq!(group_exposure(&source, &group).unwrap(), 100.0);
    }
}

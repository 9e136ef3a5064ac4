use fxhash::FxHashMap;
use std::fmt::Display;
use std::str::FromStr;

use super::error::SourceError;
use super::run_group::RunGroup;

const DETECTOR_TREE: &str = "FC-U";
const MONITOR_TREE: &str = "PKUP";

/// The two event streams recorded per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// The fission chamber, one record per hit, tagged with the detector number
    Detector,
    /// The beam pick-up monitor, one record per pulse
    Monitor,
}

impl Stream {
    pub fn tree_name(&self) -> &'static str {
        match self {
            Self::Detector => DETECTOR_TREE,
            Self::Monitor => MONITOR_TREE,
        }
    }
}

impl Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tree_name())
    }
}

impl FromStr for Stream {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            DETECTOR_TREE => Ok(Self::Detector),
            MONITOR_TREE => Ok(Self::Monitor),
            _ => Err(()),
        }
    }
}

/// Numeric per-event fields known to the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Amplitude,
    Timestamp,
    DetectorTag,
    PulseIntensity,
}

impl Field {
    pub fn branch_name(&self) -> &'static str {
        match self {
            Self::Amplitude => "amp",
            Self::Timestamp => "tflash",
            Self::DetectorTag => "detn",
            Self::PulseIntensity => "PulseIntensity",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.branch_name())
    }
}

impl FromStr for Field {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amp" => Ok(Self::Amplitude),
            "tflash" => Ok(Self::Timestamp),
            "detn" => Ok(Self::DetectorTag),
            "PulseIntensity" => Ok(Self::PulseIntensity),
            _ => Err(()),
        }
    }
}

/// Event-aligned numeric columns. Every column has the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventColumns {
    columns: FxHashMap<Field, Vec<f64>>,
    len: usize,
}

impl EventColumns {
    /// Build from a set of columns.
    ///
    /// Returns None if the columns do not all have the same length
    pub fn from_columns<I>(columns: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Field, Vec<f64>)>,
    {
        let columns: FxHashMap<Field, Vec<f64>> = columns.into_iter().collect();
        let len = columns.values().next().map(|c| c.len()).unwrap_or(0);
        if columns.values().any(|c| c.len() != len) {
            return None;
        }
        Some(Self { columns, len })
    }

    /// Empty columns for the given fields
    pub fn empty(fields: &[Field]) -> Self {
        Self {
            columns: fields.iter().map(|f| (*f, Vec::new())).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a column; a missing column is reported against the given group
    pub fn column(&self, field: Field, group: &RunGroup) -> Result<&[f64], SourceError> {
        self.columns
            .get(&field)
            .map(|c| c.as_slice())
            .ok_or(SourceError::MissingField {
                field,
                group: group.index(),
            })
    }

    /// Append the requested fields of the events in `other`, keeping only those
    /// recorded by `detector` if one is given.
    pub fn extend_selected(
        &mut self,
        other: &EventColumns,
        detector: Option<u32>,
        fields: &[Field],
        group: &RunGroup,
    ) -> Result<(), SourceError> {
        let mask: Option<Vec<bool>> = match detector {
            Some(det) => Some(
                other
                    .column(Field::DetectorTag, group)?
                    .iter()
                    .map(|tag| *tag == det as f64)
                    .collect(),
            ),
            None => None,
        };

        let mut added = 0;
        for field in fields {
            let source = other.column(*field, group)?;
            let dest = self.columns.entry(*field).or_default();
            let before = dest.len();
            match &mask {
                Some(mask) => dest.extend(
                    source
                        .iter()
                        .zip(mask.iter())
                        .filter(|(_, keep)| **keep)
                        .map(|(value, _)| *value),
                ),
                None => dest.extend_from_slice(source),
            }
            added = dest.len() - before;
        }
        self.len += added;
        Ok(())
    }

    /// Render the first n events as a text table
    pub fn preview(&self, n: usize) -> String {
        let mut fields: Vec<&Field> = self.columns.keys().collect();
        fields.sort_by_key(|f| f.branch_name());
        let mut text = fields
            .iter()
            .map(|f| format!("{:>16}", f.branch_name()))
            .collect::<Vec<String>>()
            .join("");
        for row in 0..n.min(self.len) {
            text.push('\n');
            for field in fields.iter() {
                text.push_str(&format!("{:>16}", self.columns[*field][row]));
            }
        }
        text
    }
}

/// Supplies the event columns of a run group.
///
/// Handles are cloned so that every worker owns its own.
pub trait EventSource: Clone + Send {
    /// Get the requested fields of the events of one stream within a run group,
    /// optionally only those recorded by a given detector.
    fn events(
        &self,
        stream: Stream,
        detector: Option<u32>,
        fields: &[Field],
        group: &RunGroup,
    ) -> Result<EventColumns, SourceError>;
}

/// An EventSource holding all run data in memory, keyed by run number
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    runs: FxHashMap<(i32, Stream), EventColumns>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the data of one stream of one run
    pub fn insert(&mut self, run: i32, stream: Stream, columns: EventColumns) {
        self.runs.insert((run, stream), columns);
    }
}

impl EventSource for InMemorySource {
    fn events(
        &self,
        stream: Stream,
        detector: Option<u32>,
        fields: &[Field],
        group: &RunGroup,
    ) -> Result<EventColumns, SourceError> {
        let mut selected = EventColumns::empty(fields);
        for run in group.runs() {
            // A run without data for this stream contributes no events
            if let Some(columns) = self.runs.get(&(*run, stream)) {
                selected.extend_selected(columns, detector, fields, group)?;
            }
        }
        Ok(selected)
    }
}

use serde::{Deserialize, Serialize};

/// A run list as it appears in the configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunListConfig {
    pub runs: Vec<i32>,
    #[serde(default)]
    pub label: String,
}

/// An ordered set of runs analysed together as one statistical sample.
///
/// Groups are identified by their 1-based ordinal in the configuration; this index
/// is also the x coordinate of the efficiency series.
#[derive(Debug, Clone, PartialEq)]
pub struct RunGroup {
    index: usize,
    label: String,
    runs: Vec<i32>,
}

impl RunGroup {
    pub fn new(index: usize, label: &str, runs: &[i32]) -> Self {
        Self {
            index,
            label: label.to_string(),
            runs: runs.to_vec(),
        }
    }

    /// Build the 1-indexed groups from the configured run lists
    pub fn from_run_lists(lists: &[RunListConfig]) -> Vec<Self> {
        lists
            .iter()
            .enumerate()
            .map(|(idx, list)| Self::new(idx + 1, &list.label, &list.runs))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn runs(&self) -> &[i32] {
        &self.runs
    }

    /// Legend label, e.g. "runlist 3 - Sin"
    pub fn display_label(&self) -> String {
        if self.label.is_empty() {
            format!("runlist {}", self.index)
        } else {
            format!("runlist {} - {}", self.index, self.label)
        }
    }
}

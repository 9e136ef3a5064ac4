use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::run_group::{RunGroup, RunListConfig};
use super::spectrum::Binning;

const DEFAULT_AMPLITUDE_BINS: usize = 300;
const DEFAULT_AMPLITUDE_MAX: f64 = 45.0e3;
const DEFAULT_TIME_BINS: usize = 250;
const DEFAULT_TIME_MIN: f64 = 450.0;
const DEFAULT_TIME_MAX: f64 = 850.0;
const DEFAULT_FIT_WINDOW: (f64, f64) = (615.0, 715.0);

/// Structure representing the analysis configuration. Contains pathing, run lists, amplitude cuts
/// and binning. Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub prefix: String,
    pub suffix: String,
    /// Run groups of the efficiency analysis, in order (runlist1, runlist2, ...)
    pub runlists: Vec<RunListConfig>,
    /// Runs of the gamma-flash calibration
    pub runlist: Vec<i32>,
    /// Amplitude threshold per detector id
    pub cuts: BTreeMap<u32, f64>,
    /// Detectors of the gamma-flash calibration, in analysis order
    pub detlist: Vec<u32>,
    pub amplitude_binning: Binning,
    pub time_binning: Binning,
    pub fit_window: (f64, f64),
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Run lists and cuts will be empty
    fn default() -> Self {
        Self {
            prefix: String::from(""),
            suffix: String::from(".yml"),
            runlists: vec![],
            runlist: vec![],
            cuts: BTreeMap::new(),
            detlist: vec![],
            amplitude_binning: Binning::new(DEFAULT_AMPLITUDE_BINS, 0.0, DEFAULT_AMPLITUDE_MAX),
            time_binning: Binning::new(DEFAULT_TIME_BINS, DEFAULT_TIME_MIN, DEFAULT_TIME_MAX),
            fit_window: DEFAULT_FIT_WINDOW,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a validated Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the numeric parts of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for binning in [&self.amplitude_binning, &self.time_binning] {
            if !binning.is_valid() {
                return Err(ConfigError::BadBinning {
                    n_bins: binning.n_bins,
                    min: binning.min,
                    max: binning.max,
                });
            }
        }
        let (lo, hi) = self.fit_window;
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(ConfigError::BadFitWindow(lo, hi));
        }
        if !self.is_n_threads_valid() {
            return Err(ConfigError::BadThreadCount(self.n_threads));
        }
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    /// The efficiency run groups, 1-indexed
    pub fn run_groups(&self) -> Result<Vec<RunGroup>, ConfigError> {
        if self.runlists.is_empty() {
            return Err(ConfigError::NoRunGroups);
        }
        Ok(RunGroup::from_run_lists(&self.runlists))
    }

    /// The calibration runs form a single group
    pub fn calibration_group(&self) -> RunGroup {
        RunGroup::new(1, "calibration", &self.runlist)
    }

    /// Amplitude cut of a single detector
    pub fn cut_for(&self, detector: u32) -> Result<f64, ConfigError> {
        self.cuts
            .get(&detector)
            .copied()
            .ok_or(ConfigError::MissingCut(detector))
    }

    /// Build the detector -> threshold lookup for the requested detectors.
    ///
    /// Every requested detector must have a configured cut.
    pub fn cut_table(&self, detectors: &[u32]) -> Result<FxHashMap<u32, f64>, ConfigError> {
        let mut table = FxHashMap::default();
        for det in detectors {
            table.insert(*det, self.cut_for(*det)?);
        }
        Ok(table)
    }

    /// Paths of the data files of a group: {prefix}{run}{suffix}
    pub fn group_files(&self, group: &RunGroup) -> Vec<PathBuf> {
        group
            .runs()
            .iter()
            .map(|run| PathBuf::from(format!("{}{}{}", self.prefix, run, self.suffix)))
            .collect()
    }
}

use std::path::PathBuf;
use thiserror::Error;

use super::event_source::{Field, Stream};
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Field {field} is missing from the event data of run group {group}")]
    MissingField { field: Field, group: usize },
    #[error("Stream {stream} is missing from run file {path:?}")]
    MissingStream { stream: Stream, path: PathBuf },
    #[error("Columns of stream {stream} in run file {path:?} have different lengths")]
    MismatchedColumns { stream: Stream, path: PathBuf },
    #[error("Could not open run file {0:?} because it does not exist")]
    BadFilePath(PathBuf),
    #[error("EventSource failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EventSource failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Error)]
pub enum NormalizeError {
    #[error("Cannot normalize a spectrum by a non-positive exposure ({exposure})")]
    DivisionByZero { exposure: f64 },
}

#[derive(Debug, Clone, Error)]
pub enum FitError {
    #[error("Gaussian fit is underdetermined: only {nonzero_bins} non-empty bins in the fit window")]
    Underdetermined { nonzero_bins: usize },
    #[error("Gaussian fit did not converge within {iterations} iterations")]
    NoConvergence { iterations: usize },
    #[error("Gaussian fit ended outside the fit window: amplitude {amplitude}, mean {mean}, sigma {sigma}")]
    Diverged { amplitude: f64, mean: f64, sigma: f64 },
    #[error("Gaussian fit covariance matrix is singular")]
    SingularCovariance,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No amplitude cut is configured for detector {0}")]
    MissingCut(u32),
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Invalid binning: {n_bins} bins over [{min}, {max})")]
    BadBinning { n_bins: usize, min: f64, max: f64 },
    #[error("Invalid fit window [{0}, {1}]")]
    BadFitWindow(f64, f64),
    #[error("Config does not contain any run groups")]
    NoRunGroups,
    #[error("Config requested {0} threads; at least 1 is required")]
    BadThreadCount(i32),
}

/// Failure of a single run group or detector. Fatal to that unit only.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Run group {group} failed due to EventSource error: {source}")]
    GroupSource { group: usize, source: SourceError },
    #[error("Run group {group} failed due to normalization error: {source}")]
    GroupNormalize { group: usize, source: NormalizeError },
    #[error("Detector {detector} failed due to EventSource error: {source}")]
    DetectorSource { detector: u32, source: SourceError },
    #[error("Detector {detector} failed due to fit error: {source}")]
    DetectorFit { detector: u32, source: FitError },
    #[error("Monitor stream failed due to EventSource error: {0}")]
    MonitorSource(SourceError),
    #[error("Analysis failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Analysis failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("An analysis worker panicked")]
    WorkerPanic,
}

//! # fcu_analysis
//!
//! fcu_analysis is a set of analyses of fission chamber (FC-U) data, written in Rust. It
//! takes per-event data of the chamber and of the beam pick-up monitor (PKUP) and
//! produces two things:
//!
//! - The efficiency of a chamber detector for each group of runs: the number of hits above
//! an amplitude threshold, normalized to the total pulse intensity seen by the monitor.
//! - The gamma-flash time calibration of each detector: the distribution of the monitor
//! gamma-flash time minus the detector gamma-flash time, fitted with a gaussian.
//!
//! ## Efficiency
//!
//! For every run group the library
//!
//! 1. sums the `PulseIntensity` of the monitor (the exposure),
//! 2. bins the detector amplitudes into a spectrum (300 bins over [0, 45000) by default),
//! and a second spectrum with only the amplitudes strictly above the cut of the detector,
//! 3. divides both spectra by the exposure,
//! 4. integrates the above-threshold spectrum from the bin containing the cut to the end
//! of the range. The error is sqrt(entries) / exposure.
//!
//! Note that the efficiency is a rate per unit of beam intensity and not a probability.
//! Groups are independent and can be spread over several worker threads. A group that
//! fails (missing data, zero exposure) is reported and the other groups are kept.
//!
//! ## Calibration
//!
//! The gamma-flash times of the monitor and of each detector are deduplicated and paired
//! by position. The differences are binned (250 bins over [450, 850) ns by default) and
//! fitted with a gaussian in a window (615 to 715 ns by default). The mean, sigma, their
//! errors and the number of entries form the calibration of the detector.
//!
//! Positional pairing assumes both streams saw exactly the same pulses. If a detector
//! missed a pulse, every later difference is wrong; check the number of pulses of each
//! stream (a warning is logged when they differ).
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! prefix: /data/fcu/run_
//! suffix: .yml
//! runlists:
//! - runs: [117200, 117201]
//!   label: Sin
//! - runs: [117250]
//!   label: Sout
//! runlist: [117200, 117201, 117250]
//! cuts:
//!   1: 5200.0
//!   2: 4800.0
//! detlist: [1, 2, 3, 4, 7, 8]
//! amplitude_binning:
//!   n_bins: 300
//!   min: 0.0
//!   max: 45000.0
//! time_binning:
//!   n_bins: 250
//!   min: 450.0
//!   max: 850.0
//! fit_window: [615.0, 715.0]
//! n_threads: 1
//! ```
//!
//! Every detector analysed for efficiency must have an entry in `cuts`.
//!
//! ## Data
//!
//! The analyses read events through the [`event_source::EventSource`] trait. The bundled
//! [`columnar_source::ColumnarFileSource`] reads one YAML file per run at
//! `{prefix}{run}{suffix}`, with one mapping per stream (`FC-U`, `PKUP`) of branch name
//! to values (`amp`, `tflash`, `detn`, `PulseIntensity`).
pub mod calibration;
pub mod columnar_source;
pub mod config;
pub mod efficiency;
pub mod error;
pub mod event_source;
pub mod exposure;
pub mod gaussian_fit;
pub mod plot;
pub mod process;
pub mod results;
pub mod run_group;
pub mod spectrum;
pub mod time_difference;
pub mod worker_status;

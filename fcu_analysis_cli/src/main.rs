use clap::{value_parser, Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use libfcu_analysis::columnar_source::ColumnarFileSource;
use libfcu_analysis::config::Config;
use libfcu_analysis::error::AnalysisError;
use libfcu_analysis::gaussian_fit::LevenbergMarquardt;
use libfcu_analysis::plot::{LogPlotSink, PlotSink};
use libfcu_analysis::results::{CalibrationReport, EfficiencyReport};
use libfcu_analysis::worker_status::WorkerStatus;

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could not create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

/// Forward worker progress to one bar per worker until the analysis thread is done
fn watch<T>(
    handle: JoinHandle<Result<T, AnalysisError>>,
    rx: mpsc::Receiver<WorkerStatus>,
    pb_manager: &MultiProgress,
) -> Option<T> {
    let mut bars: BTreeMap<usize, ProgressBar> = BTreeMap::new();
    loop {
        // Ugh since we don't have a UI here, poll the channel with a short timeout
        if let Ok(status) = rx.recv_timeout(std::time::Duration::from_millis(250)) {
            let bar = bars
                .entry(status.worker_id)
                .or_insert_with(|| pb_manager.add(ProgressBar::new(100)));
            bar.set_message(format!("{:?} group {}", status.phase, status.group_index));
            bar.set_position((status.progress * 100.0) as u64);
        }

        if handle.is_finished() {
            for bar in bars.values() {
                bar.finish();
            }
            return match handle.join() {
                Ok(Ok(report)) => Some(report),
                Ok(Err(e)) => {
                    log::error!("Analysis failed with error: {e}");
                    None
                }
                Err(_) => {
                    log::error!("Failed to join analysis task!");
                    None
                }
            };
        }
    }
}

fn show_efficiency(report: &EfficiencyReport, sink: &mut impl PlotSink) {
    let det = report.detector;
    sink.overlay_spectra(&format!("Amplitudes detector {det}"), &report.spectra);
    sink.overlay_spectra(
        &format!("Amplitudes detector {det} with cut"),
        &report.cut_spectra,
    );
    sink.efficiency_series(&format!("Efficiency - detector {det}"), &report.series);
    for failure in report.failures.iter() {
        log::warn!("{failure}");
    }
}

fn show_calibration(report: &CalibrationReport, sink: &mut impl PlotSink) {
    sink.overlay_spectra("PKUP signal - tgflash of FCU", &report.spectra);
    sink.calibration_table("Gamma-flash calibration", &report.table);
    for failure in report.failures.iter() {
        log::warn!("{failure}");
    }
}

fn main() {
    // Create a cli
    let matches = Command::new("fcu_analysis_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("efficiency")
                .about("Efficiency of detectors for each run group")
                .arg(
                    Arg::new("detector")
                        .short('d')
                        .long("detector")
                        .required(true)
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(u32))
                        .help("Detector number; repeat to analyse several detectors"),
                ),
        )
        .subcommand(Command::new("calibrate").about("Gamma-flash calibration of the detector list"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Data files: {}<run>{}", config.prefix, config.suffix);
    log::info!("Run groups: {}", config.runlists.len());
    log::info!("Calibration runs: {:?}", config.runlist);
    log::info!("Detectors: {:?}", config.detlist);
    log::info!("Number of threads: {}", config.n_threads);

    let source = ColumnarFileSource::new(&config);
    let mut sink = LogPlotSink;
    let (tx, rx) = mpsc::channel::<WorkerStatus>();

    match matches.subcommand() {
        Some(("efficiency", sub)) => {
            let detectors: Vec<u32> = sub
                .get_many::<u32>("detector")
                .expect("We require a detector")
                .copied()
                .collect();
            // Spawn the task!
            let handle = std::thread::spawn(move || {
                libfcu_analysis::process::run_efficiency_detectors(
                    &config, &detectors, &source, &tx,
                )
            });
            if let Some(reports) = watch(handle, rx, &pb_manager) {
                for report in reports.iter() {
                    show_efficiency(report, &mut sink);
                }
            }
        }
        Some(("calibrate", _)) => {
            let handle = std::thread::spawn(move || {
                libfcu_analysis::calibration::run_calibration(
                    &config,
                    &source,
                    &LevenbergMarquardt::default(),
                    &tx,
                )
            });
            if let Some(report) = watch(handle, rx, &pb_manager) {
                show_calibration(&report, &mut sink);
            }
        }
        _ => log::error!("Unrecognized command; use new, efficiency or calibrate"),
    }

    log::info!("Done.");
}

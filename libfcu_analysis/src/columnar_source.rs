use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use super::config::Config;
use super::error::SourceError;
use super::event_source::{EventColumns, EventSource, Field, Stream};
use super::run_group::RunGroup;

/// Layout of a run file: tree name -> branch name -> values
type RunFile = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

/// EventSource reading one columnar YAML dump per run.
///
/// Run files are found at `{prefix}{run}{suffix}` and look like
///
/// ```yml
/// FC-U:
///   amp: [1200.0, 5300.5]
///   tflash: [650.2, 650.2]
///   detn: [1, 2]
/// PKUP:
///   PulseIntensity: [7.1e12]
///   tflash: [0.0]
/// ```
///
/// Branches that the analysis does not know are ignored.
#[derive(Debug, Clone)]
pub struct ColumnarFileSource {
    config: Config,
}

impl ColumnarFileSource {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Load one stream of one run file
    fn read_stream(path: &Path, stream: Stream) -> Result<EventColumns, SourceError> {
        if !path.exists() {
            return Err(SourceError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        let mut file: RunFile = serde_yaml::from_str(&yaml_str)?;
        let branches = file
            .remove(stream.tree_name())
            .ok_or(SourceError::MissingStream {
                stream,
                path: path.to_path_buf(),
            })?;

        let columns = branches.into_iter().filter_map(|(name, values)| {
            match Field::from_str(&name) {
                Ok(field) => Some((field, values)),
                Err(_) => {
                    log::debug!("Ignoring branch {name} of {stream} in {path:?}");
                    None
                }
            }
        });
        EventColumns::from_columns(columns).ok_or(SourceError::MismatchedColumns {
            stream,
            path: path.to_path_buf(),
        })
    }
}

impl EventSource for ColumnarFileSource {
    fn events(
        &self,
        stream: Stream,
        detector: Option<u32>,
        fields: &[Field],
        group: &RunGroup,
    ) -> Result<EventColumns, SourceError> {
        let mut selected = EventColumns::empty(fields);
        for path in self.config.group_files(group) {
            let columns = Self::read_stream(&path, stream)?;
            selected.extend_selected(&columns, detector, fields, group)?;
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_group::RunListConfig;
    use std::path::PathBuf;

    const RUN_FILE: &str = "
FC-U:
  amp: [1200.0, 5300.5, 800.0]
  tflash: [650.0, 650.0, 651.0]
  detn: [1, 2, 1]
  unused: [0, 0, 0]
PKUP:
  PulseIntensity: [7.0, 3.0]
  tflash: [0.0, 1.0]
";

    fn write_run(dir: &Path, run: i32, contents: &str) {
        std::fs::write(dir.join(format!("run_{run}.yml")), contents).unwrap();
    }

    fn make_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.prefix = format!("{}/run_", dir.to_string_lossy());
        config.suffix = String::from(".yml");
        config.runlists = vec![RunListConfig {
            runs: vec![1, 2],
            label: String::from("Sin"),
        }];
        config
    }

    fn make_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fcu_analysis_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reads_and_filters_runs() {
        let dir = make_dir("reads");
        write_run(&dir, 1, RUN_FILE);
        write_run(&dir, 2, RUN_FILE);
        let config = make_config(&dir);
        let group = config.run_groups().unwrap().remove(0);
        let source = ColumnarFileSource::new(&config);

        let events = source
            .events(Stream::Detector, Some(1), &[Field::Amplitude], &group)
            .unwrap();
        assert_eq!(
            events.column(Field::Amplitude, &group).unwrap(),
            &[1200.0, 800.0, 1200.0, 800.0]
        );

        let monitor = source
            .events(Stream::Monitor, None, &[Field::PulseIntensity], &group)
            .unwrap();
        assert_eq!(monitor.len(), 4);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_run_file() {
        let dir = make_dir("missing");
        write_run(&dir, 1, RUN_FILE);
        let config = make_config(&dir);
        let group = config.run_groups().unwrap().remove(0);
        let source = ColumnarFileSource::new(&config);
        let result = source.events(Stream::Monitor, None, &[Field::PulseIntensity], &group);
        assert!(matches!(result, Err(SourceError::BadFilePath(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_stream_and_mismatched_columns() {
        let dir = make_dir("malformed");
        write_run(&dir, 1, "PKUP:\n  PulseIntensity: [1.0]\n");
        write_run(&dir, 2, "FC-U:\n  amp: [1.0, 2.0]\n  detn: [1]\n");
        let source = ColumnarFileSource::new(&make_config(&dir));

        let first = RunGroup::new(1, "", &[1]);
        let result = source.events(Stream::Detector, None, &[Field::Amplitude], &first);
        assert!(matches!(result, Err(SourceError::MissingStream { .. })));

        let second = RunGroup::new(1, "", &[2]);
        let result = source.events(Stream::Detector, None, &[Field::Amplitude], &second);
        assert!(matches!(result, Err(SourceError::MismatchedColumns { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

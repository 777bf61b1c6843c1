//! Reconciling a finished work list against the completion ledger.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::exec::ToolEnv;
use crate::fs::{work_list_stamp, Fs};
use crate::ledger::CompletionTracker;
use crate::settings::RunConfig;

const BIDS_VERSION: &str = "1.10.1";
const DATASET_NAME: &str = "dMRI Preprocessing Output";
const PIPELINE_NAME: &str = "dMRI Preprocessing Pipeline";
const TOOL_NAME: &str = "FSL";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to read work list {0:?}: {1}")]
    WorkList(PathBuf, String),
    #[error("unable to serialize manifest")]
    Serialize(#[from] serde_json::Error),
    #[error("unable to write manifest {0:?}: {1}")]
    Write(PathBuf, String),
    #[error("manifest {0:?} already exists")]
    Exists(PathBuf),
}

/// `dataset_description` JSON listing the items that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub name: String,
    #[serde(rename = "BIDSVersion")]
    pub bids_version: String,
    pub pipeline_description: PipelineDescription,
    pub generated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineDescription {
    pub name: String,
    pub version: String,
    pub run_on_machine: String,
    pub run_by_user: String,
    pub software: Vec<Software>,
    pub subjects_processed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Software {
    pub name: String,
    pub version: String,
}

impl Manifest {
    fn new(
        succeeded: Vec<String>,
        tool_version: String,
        now: &chrono::DateTime<chrono::Local>,
    ) -> Self {
        Self {
            name: format!("{DATASET_NAME} {}", now.format("%Y-%m-%d")),
            bids_version: BIDS_VERSION.to_owned(),
            pipeline_description: PipelineDescription {
                name: PIPELINE_NAME.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                run_on_machine: host_name(),
                run_by_user: user_name(),
                software: vec![Software {
                    name: TOOL_NAME.to_owned(),
                    version: tool_version,
                }],
                subjects_processed: succeeded,
            },
            generated_at: now.to_rfc3339(),
        }
    }
}

fn host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            log::warn!("Unable to get host name: {e}");
            "unknown".to_owned()
        }
    }
}

fn user_name() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Runs once per submission, after every array element has finished.
pub struct Aggregator<'a> {
    config: &'a RunConfig,
    fs: &'a Fs,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a RunConfig, fs: &'a Fs) -> Self {
        Self { config, fs }
    }

    /// Write the manifest for `work_list`, then clear the ledger and the run's artifacts.
    ///
    /// If the manifest can't be written nothing is purged, so aggregation can be retried.
    pub fn aggregate(&self, work_list: &Path) -> Result<(PathBuf, Manifest), Error> {
        let ids = self
            .fs
            .load_work_list(work_list)
            .map_err(|e| Error::WorkList(work_list.to_path_buf(), format!("{e:#}")))?;

        let tracker = CompletionTracker::new(self.fs);
        let marked = tracker.list_marked(ids.iter().map(String::as_str));
        let succeeded: Vec<String> = ids
            .iter()
            .filter(|id| marked.contains(id.as_str()))
            .cloned()
            .collect();
        log::info!("{} of {} items completed", succeeded.len(), ids.len());
        for id in ids.iter().filter(|id| !marked.contains(id.as_str())) {
            log::warn!("{id} did not complete");
        }

        let now = chrono::Local::now();
        let version = ToolEnv::new(&self.config.tool_root).version();
        let manifest = Manifest::new(succeeded, version, &now);
        let path = self.write_manifest(&manifest, work_list, &now)?;
        log::info!("Wrote manifest {:?}", path);

        if let Err(e) = tracker.purge() {
            log::warn!("Unable to remove completion markers: {e:#}");
        }
        self.purge_artifacts(work_list);

        Ok((path, manifest))
    }

    /// Write to the dated name, or the run-stamped name if a manifest for today exists.
    fn write_manifest(
        &self,
        manifest: &Manifest,
        work_list: &Path,
        now: &chrono::DateTime<chrono::Local>,
    ) -> Result<PathBuf, Error> {
        let json = serde_json::to_string_pretty(manifest)?;
        let run_stamp = match work_list_stamp(work_list) {
            Some(stamp) => stamp.to_owned(),
            None => now.format("%Y%m%d_%H%M%S").to_string(),
        };

        let write_err =
            |path: &Path, e: anyhow::Error| Error::Write(path.to_path_buf(), format!("{e:#}"));
        self.fs
            .create_dir(self.fs.output_dir())
            .map_err(|e| write_err(self.fs.output_dir(), e))?;

        let mut last = PathBuf::new();
        for label in [now.format("%Y-%m-%d").to_string(), run_stamp] {
            let path = self.fs.manifest(&label);
            match self.fs.create_new_file(&path, &json) {
                Ok(true) => return Ok(path),
                Ok(false) => log::info!("{:?} exists; trying another name", path),
                Err(e) => return Err(write_err(&path, e)),
            }
            last = path;
        }
        Err(Error::Exists(last))
    }

    /// Remove the work list and the submission scripts sharing its stamp.
    /// Failures are only logged.
    fn purge_artifacts(&self, work_list: &Path) {
        let mut artifacts = vec![work_list.to_path_buf()];
        if let (Some(stamp), Some(dir)) = (work_list_stamp(work_list), work_list.parent()) {
            artifacts.push(self.fs.array_script(dir, stamp));
            artifacts.push(self.fs.report_script(dir, stamp));
        }
        for path in artifacts.iter().filter(|p| self.fs.exists(p)) {
            match self.fs.delete_file(path) {
                Ok(()) => log::debug!("Removed {:?}", path),
                Err(e) => log::warn!("Unable to remove {:?}: {e:#}", path),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const STAMP: &str = "20250102_030405";

    fn setup(root: &Path) -> Result<(RunConfig, Fs, PathBuf)> {
        let config = RunConfig::for_tests(root);
        let fs = Fs::new(&config, false);
        fs.create_dir(&config.submit_dir)?;
        let work_list = fs.work_list(STAMP);
        fs.write_work_list(&work_list, &["sub-X", "sub-Y"])?;
        fs.write_file(fs.array_script(&config.submit_dir, STAMP), "#!/bin/bash\n")?;
        fs.write_file(fs.report_script(&config.submit_dir, STAMP), "#!/bin/bash\n")?;
        Ok((config, fs, work_list))
    }

    #[test]
    fn test_manifest_lists_only_marked_and_purges() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, work_list) = setup(dir.path())?;
        std::fs::create_dir_all(config.tool_root.join("etc"))?;
        std::fs::write(config.tool_root.join("etc/fslversion"), "6.0.7.9\n")?;
        let tracker = CompletionTracker::new(&fs);
        tracker.mark("sub-X")?;
        tracker.mark("sub-elsewhere")?;

        let (path, manifest) = Aggregator::new(&config, &fs).aggregate(&work_list)?;

        assert_eq!(manifest.pipeline_description.subjects_processed, ["sub-X"]);
        assert_eq!(manifest.pipeline_description.software[0].version, "6.0.7.9");
        assert_eq!(manifest.bids_version, "1.10.1");

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(
            written["PipelineDescription"]["SubjectsProcessed"],
            serde_json::json!(["sub-X"])
        );
        assert_eq!(written["BIDSVersion"], "1.10.1");

        assert!(!fs.status_dir().exists());
        assert!(!work_list.exists());
        assert!(!fs.array_script(&config.submit_dir, STAMP).exists());
        assert!(!fs.report_script(&config.submit_dir, STAMP).exists());
        Ok(())
    }

    #[test]
    fn test_second_manifest_same_day_gets_run_stamp() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, work_list) = setup(dir.path())?;
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        fs.create_dir(&config.output)?;
        fs.write_file(fs.manifest(&today), "{}")?;

        let (path, _) = Aggregator::new(&config, &fs).aggregate(&work_list)?;
        assert_eq!(path, fs.manifest(STAMP));
        assert_eq!(std::fs::read_to_string(fs.manifest(&today))?, "{}");
        Ok(())
    }

    #[test]
    fn test_write_failure_keeps_markers() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, work_list) = setup(dir.path())?;
        CompletionTracker::new(&fs).mark("sub-X")?;
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        // a directory squatting on both names makes every write fail
        fs.create_dir(fs.manifest(&today))?;
        fs.create_dir(fs.manifest(STAMP))?;

        let err = Aggregator::new(&config, &fs).aggregate(&work_list).unwrap_err();
        assert!(matches!(err, Error::Exists(_)));
        assert!(CompletionTracker::new(&fs).has("sub-X"));
        assert!(work_list.exists());
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use super::Fs;

const STATUS_DIR: &str = "status";
const STAGING_DIR: &str = "staging";
const STAGE_LOGS_DIR: &str = "logs";

pub const WORK_LIST_PREFIX: &str = "worklist_";
pub const WORK_LIST_SUFFIX: &str = ".txt";

/// Utility fns for making common types of paths.
impl Fs {
    /// $OUTPUT
    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// $OUTPUT/item_session
    pub fn item_dir(&self, item_dir_name: &str) -> PathBuf {
        self.output.join(item_dir_name)
    }

    /// $OUTPUT/item_session/staging
    pub fn staging_dir(&self, item_dir: &Path) -> PathBuf {
        item_dir.join(STAGING_DIR)
    }

    /// $OUTPUT/item_session/logs/stage.stdout.txt, $OUTPUT/item_session/logs/stage.stderr.txt
    pub fn stage_logs(&self, item_dir: &Path, stage: &str) -> (PathBuf, PathBuf) {
        let dir = item_dir.join(STAGE_LOGS_DIR);
        (
            dir.join(format!("{stage}.stdout.txt")),
            dir.join(format!("{stage}.stderr.txt")),
        )
    }

    /// $OUTPUT/status
    pub fn status_dir(&self) -> PathBuf {
        self.output.join(STATUS_DIR)
    }

    /// $OUTPUT/status/item.done
    pub fn marker(&self, item: &str) -> PathBuf {
        let mut path = self.status_dir();
        path.push(format!("{item}.done"));
        path
    }

    /// $OUTPUT/dataset_description_label.json
    pub fn manifest(&self, label: &str) -> PathBuf {
        self.output.join(format!("dataset_description_{label}.json"))
    }

    /// $SUBMIT
    pub fn submit_dir(&self) -> &Path {
        &self.submit
    }

    /// $SUBMIT/worklist_stamp.txt
    pub fn work_list(&self, stamp: &str) -> PathBuf {
        self.submit
            .join(format!("{WORK_LIST_PREFIX}{stamp}{WORK_LIST_SUFFIX}"))
    }

    /// dir/submit_array_stamp.sh
    pub fn array_script(&self, dir: &Path, stamp: &str) -> PathBuf {
        dir.join(format!("submit_array_{stamp}.sh"))
    }

    /// dir/submit_report_stamp.sh
    pub fn report_script(&self, dir: &Path, stamp: &str) -> PathBuf {
        dir.join(format!("submit_report_{stamp}.sh"))
    }

    /// $LOGS
    pub fn log_dir(&self) -> &Path {
        &self.logs
    }

    /// $LOGS/dwiprep-%A_%a.log (array job id, array index)
    pub fn array_log_template(&self) -> PathBuf {
        self.logs.join("dwiprep-%A_%a.log")
    }

    /// $LOGS/dwiprep_report-%j.log
    pub fn report_log_template(&self) -> PathBuf {
        self.logs.join("dwiprep_report-%j.log")
    }
}

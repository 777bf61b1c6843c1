use std::path::Path;
use std::process::Command;

use crate::exec::{run_cmd, CancelFlag};

use super::Error;

/// The batch scheduler that runs submitted scripts.
pub trait Scheduler {
    /// Submit the batch script at `script`, returning the new job's id.
    fn submit(&self, script: &Path) -> Result<String, Error>;
}

/// `Scheduler` backed by SLURM's `sbatch`.
pub struct Sbatch {
    cancel: CancelFlag,
}

impl Sbatch {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl Scheduler for Sbatch {
    fn submit(&self, script: &Path) -> Result<String, Error> {
        let mut cmd = Command::new("sbatch");
        cmd.arg(script);
        let output = run_cmd(&mut cmd, None, &self.cancel)?;
        if !output.success() {
            return Err(Error::Rejected(
                script.to_path_buf(),
                output.status.to_string(),
                output.tail(10),
            ));
        }
        parse_job_id(&output.stdout)
            .map(str::to_owned)
            .ok_or_else(|| Error::NoJobId(output.stdout.trim().to_owned()))
    }
}

/// Job id from `sbatch` output: the last token of
/// `Submitted batch job 123` (or `123;cluster` with `--parsable`).
pub fn parse_job_id(stdout: &str) -> Option<&str> {
    let last = stdout.split_whitespace().last()?;
    let id = last.split(';').next()?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use super::{Error, Scheduler};

    /// Records submitted scripts and hands out sequential job ids starting at `first_id`.
    /// Submissions fail once `fail_at` scripts have been accepted.
    #[derive(Default)]
    pub struct FakeScheduler {
        pub submitted: RefCell<Vec<(PathBuf, String)>>,
        pub first_id: usize,
        pub fail_at: Option<usize>,
    }

    impl Scheduler for FakeScheduler {
        fn submit(&self, script: &Path) -> Result<String, Error> {
            let mut submitted = self.submitted.borrow_mut();
            if self.fail_at == Some(submitted.len()) {
                return Err(Error::Rejected(
                    script.to_path_buf(),
                    "exit status: 1".to_owned(),
                    "sbatch: error: invalid partition".to_owned(),
                ));
            }
            let contents = std::fs::read_to_string(script)
                .map_err(|e| Error::Exec(crate::exec::Error::Io(e)))?;
            submitted.push((script.to_path_buf(), contents));
            Ok((self.first_id + submitted.len() - 1).to_string())
        }
    }
}

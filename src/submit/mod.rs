use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pipeline::WorkItem;

use crate::exec;
use crate::fs::Fs;
use crate::settings::RunConfig;

/// Batch scripts with `#SBATCH` directives
mod descriptor;
pub use descriptor::{ArraySpec, Dependency, Descriptor};

/// Submitting scripts to the batch scheduler
mod scheduler;
pub use scheduler::{Sbatch, Scheduler};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("nothing to submit: work list is empty")]
    Empty,
    #[error("scheduler rejected {0:?} ({1}): {2}")]
    Rejected(PathBuf, String, String),
    #[error("scheduler response has no job id: {0:?}")]
    NoJobId(String),
    #[error("{0:?} already exists")]
    Exists(PathBuf),
    #[error(transparent)]
    Exec(#[from] exec::Error),
}

/// What a successful submission left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub work_list: PathBuf,
    pub array_job: String,
    pub report_job: String,
}

/// Shown in the report script preview in place of the real array job id.
const PENDING_JOB_ID: &str = "<array job id>";

/// Turns a list of work items into an array job plus a dependent report job.
pub struct SubmissionCoordinator<'a> {
    config: &'a RunConfig,
    fs: &'a Fs,
    scheduler: &'a dyn Scheduler,
}

impl<'a> SubmissionCoordinator<'a> {
    pub fn new(config: &'a RunConfig, fs: &'a Fs, scheduler: &'a dyn Scheduler) -> Self {
        Self {
            config,
            fs,
            scheduler,
        }
    }

    /// Write the work list and both scripts, then submit them in order.
    ///
    /// `exe` is the program the scheduler runs for each job; `stamp`
    /// keys every artifact of this run.
    pub fn submit(&self, items: &[WorkItem], exe: &Path, stamp: &str) -> Result<Submission> {
        if items.is_empty() {
            return Err(Error::Empty.into());
        }
        let fs = self.fs;
        fs.create_dir(fs.submit_dir())?;
        fs.create_dir(fs.log_dir())?;

        let work_list = fs.work_list(stamp);
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        fs.write_work_list(&work_list, &ids)?;
        log::info!("Wrote {} items to {:?}", ids.len(), work_list);

        let array_script = fs.array_script(fs.submit_dir(), stamp);
        self.write_script(&array_script, &self.array_descriptor(exe, &work_list, ids.len()))?;
        log::info!("Submitting array job {:?}", array_script);
        let array_job = self
            .scheduler
            .submit(&array_script)
            .context("while submitting array job; report job not submitted")?;
        log::info!("Array job id: {array_job}");

        let report_script = fs.report_script(fs.submit_dir(), stamp);
        let report = self.report_descriptor(exe, &work_list, &array_job);
        self.write_script(&report_script, &report)?;
        log::info!("Submitting report job {:?}", report_script);
        let report_job = self
            .scheduler
            .submit(&report_script)
            .with_context(|| format!("while submitting report job for array job {array_job}"))?;
        log::info!("Report job id: {report_job}");

        Ok(Submission {
            work_list,
            array_job,
            report_job,
        })
    }

    /// The work list and both scripts as they would be written, without touching anything.
    pub fn preview(&self, items: &[WorkItem], exe: &Path, stamp: &str) -> String {
        let work_list = self.fs.work_list(stamp);
        let array = self.array_descriptor(exe, &work_list, items.len());
        let report = self.report_descriptor(exe, &work_list, PENDING_JOB_ID);

        let mut preview = String::with_capacity(2048);
        preview.push_str(&format!("# {}\n", work_list.display()));
        for item in items {
            preview.push_str(&item.id);
            preview.push('\n');
        }
        let array_script = self.fs.array_script(self.fs.submit_dir(), stamp);
        preview.push_str(&format!("\n# {}\n", array_script.display()));
        preview.push_str(&array.render());
        let report_script = self.fs.report_script(self.fs.submit_dir(), stamp);
        preview.push_str(&format!("\n# {}\n", report_script.display()));
        preview.push_str(&report.render());
        preview
    }

    fn array_descriptor(&self, exe: &Path, work_list: &Path, size: usize) -> Descriptor {
        let config = self.config;
        if config.max_parallel > size {
            log::info!(
                "Concurrency cap {} exceeds work list size {size}",
                config.max_parallel
            );
        }
        Descriptor {
            job_name: "dwiprep",
            log_template: self.fs.array_log_template(),
            partition: config.partition.clone(),
            cpus: config.cpus,
            mem: config.mem.clone(),
            array: Some(ArraySpec {
                size,
                max_parallel: config.max_parallel,
            }),
            dependency: None,
            command: self.command(exe, "--worker", work_list),
        }
    }

    fn report_descriptor(&self, exe: &Path, work_list: &Path, array_job: &str) -> Descriptor {
        Descriptor {
            job_name: "dwiprep_report",
            log_template: self.fs.report_log_template(),
            partition: self.config.partition.clone(),
            cpus: 1,
            mem: "1G".to_owned(),
            array: None,
            dependency: Some(Dependency::AfterAny(array_job.to_owned())),
            command: self.command(exe, "--report", work_list),
        }
    }

    /// `exe <mode> --work-list <path> <config flags>`; workers take their
    /// index from the scheduler's environment.
    fn command(&self, exe: &Path, mode: &str, work_list: &Path) -> Vec<String> {
        let mut command = vec![
            exe.to_string_lossy().into_owned(),
            mode.to_owned(),
            "--work-list".to_owned(),
            work_list.to_string_lossy().into_owned(),
        ];
        command.extend(self.config.worker_args());
        command
    }

    fn write_script(&self, path: &Path, descriptor: &Descriptor) -> Result<()> {
        if !self.fs.create_new_file(path, &descriptor.render())? {
            return Err(Error::Exists(path.to_path_buf()).into());
        }
        Ok(())
    }
}

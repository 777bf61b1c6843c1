use std::path::{Path, PathBuf};

use crate::args::Args;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} mode requires --work-list")]
    WorkListRequired(&'static str),
    #[error("worker mode requires --index or SLURM_ARRAY_TASK_ID")]
    IndexRequired,
    #[error("array index is 1-based; got 0")]
    IndexZero,
    #[error("--max-parallel must be at least 1")]
    ZeroParallel,
    #[error("--cpus must be at least 1")]
    ZeroCpus,
    #[error("empty value for {0}")]
    Empty(&'static str),
    #[error("unable to resolve path \"{0}\": {1}")]
    BadPath(String, std::io::Error),
}

/// Which of the three process roles this invocation plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Discover eligible items and submit the array + report jobs.
    Submit,
    /// Process the `index`th (1-based) item of `work_list`.
    Worker { work_list: PathBuf, index: usize },
    /// Reconcile `work_list` against completion markers.
    Report { work_list: PathBuf },
}

/// Immutable per-run configuration, passed by reference to every component.
///
/// All paths are absolute, so that processes dispatched by the scheduler
/// from a different working directory resolve the same locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub catalog: PathBuf,
    pub output: PathBuf,
    /// Where finished outputs are looked for during discovery
    pub done: PathBuf,
    pub session: String,
    pub tool_root: PathBuf,
    pub remote: Option<String>,
    pub force_remote: bool,
    pub max_parallel: usize,
    pub cpus: usize,
    pub mem: String,
    pub partition: String,
    pub submit_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl RunConfig {
    /// Command-line flags that recreate this config in another process.
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(24);
        let mut push = |flag: &str, val: &Path| {
            args.push(flag.to_owned());
            args.push(val.to_string_lossy().into_owned());
        };
        push("--catalog", &self.catalog);
        push("--output", &self.output);
        push("--done-dir", &self.done);
        push("--tool-root", &self.tool_root);
        push("--submit-dir", &self.submit_dir);
        push("--log-dir", &self.log_dir);
        args.push("--session".to_owned());
        args.push(self.session.clone());
        if let Some(remote) = &self.remote {
            args.push("--remote".to_owned());
            args.push(remote.clone());
        }
        if self.force_remote {
            args.push("--force-remote".to_owned());
        }
        args
    }

    /// Non-fatal inconsistencies worth telling the user about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::with_capacity(0);
        if self.force_remote && self.remote.is_none() {
            warnings.push(
                "--force-remote has no effect without --remote; inputs are read in place"
                    .to_owned(),
            );
        }
        if self.done != self.output {
            warnings.push(format!(
                "discovery checks finished outputs in {:?}, but workers write to {:?}",
                self.done, self.output
            ));
        }
        warnings
    }

    #[cfg(test)]
    pub fn for_tests(root: &Path) -> Self {
        let output = root.join("output");
        Self {
            catalog: root.join("catalog"),
            done: output.clone(),
            output,
            session: "ses-01".to_owned(),
            tool_root: root.join("tools"),
            remote: None,
            force_remote: false,
            max_parallel: 2,
            cpus: 1,
            mem: "1G".to_owned(),
            partition: "test".to_owned(),
            submit_dir: root.join("submit"),
            log_dir: root.join("submit/logs"),
        }
    }
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub mode: Mode,
    pub config: RunConfig,
    pub yes: bool,
    pub verbose: u8,
    pub dry_run: bool,
}

fn absolute(path: &str) -> Result<PathBuf, Error> {
    std::path::absolute(path).map_err(|e| Error::BadPath(path.to_owned(), e))
}

fn non_empty(val: String, name: &'static str) -> Result<String, Error> {
    if val.trim().is_empty() {
        Err(Error::Empty(name))
    } else {
        Ok(val)
    }
}

impl TryFrom<Args> for Settings {
    type Error = Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mode = if args.worker {
            let work_list = args.work_list.ok_or(Error::WorkListRequired("worker"))?;
            let index = args.index.ok_or(Error::IndexRequired)?;
            if index == 0 {
                return Err(Error::IndexZero);
            }
            Mode::Worker {
                work_list: absolute(&work_list)?,
                index,
            }
        } else if args.report {
            let work_list = args.work_list.ok_or(Error::WorkListRequired("report"))?;
            Mode::Report {
                work_list: absolute(&work_list)?,
            }
        } else {
            Mode::Submit
        };

        if args.max_parallel == 0 {
            return Err(Error::ZeroParallel);
        }
        if args.cpus == 0 {
            return Err(Error::ZeroCpus);
        }

        let catalog = absolute(&non_empty(args.catalog, "--catalog")?)?;
        let output = absolute(&non_empty(args.output, "--output")?)?;
        let done = match args.done_dir {
            Some(dir) => absolute(&non_empty(dir, "--done-dir")?)?,
            None => output.clone(),
        };
        let remote = match args.remote {
            Some(host) => Some(non_empty(host, "--remote")?),
            None => None,
        };

        let config = RunConfig {
            catalog,
            output,
            done,
            session: non_empty(args.session, "--session")?,
            tool_root: absolute(&args.tool_root)?,
            remote,
            force_remote: args.force_remote,
            max_parallel: args.max_parallel,
            cpus: args.cpus,
            mem: non_empty(args.mem, "--mem")?,
            partition: non_empty(args.partition, "--partition")?,
            submit_dir: absolute(&args.submit_dir)?,
            log_dir: absolute(&args.log_dir)?,
        };

        Ok(Self {
            mode,
            config,
            yes: args.yes,
            verbose: args.verbose,
            dry_run: args.dry_run,
        })
    }
}

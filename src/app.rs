use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use pipeline::{dti, CatalogLayout, Pipeline};

use crate::discover::Discovery;
use crate::exec::{CancelFlag, Worker};
use crate::fs::Fs;
use crate::ledger::CompletionTracker;
use crate::remote::{Remote, SshRemote};
use crate::report::Aggregator;
use crate::settings::{Mode, Settings};
use crate::submit::{Sbatch, Scheduler, SubmissionCoordinator};
use crate::ui::Ui;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("work list {0:?} is empty")]
    EmptyWorkList(PathBuf),
    #[error("index {0} is out of range for a work list of {1} items")]
    IndexOutOfRange(usize, usize),
    #[error("{0} cancelled by termination signal")]
    Cancelled(String),
}

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
    layout: CatalogLayout,
    pipeline: Pipeline,
    remote: Box<dyn Remote>,
    scheduler: Box<dyn Scheduler>,
    cancel: CancelFlag,
    /// Program the scheduler runs; defaults to the current executable
    exe: Option<PathBuf>,
}

impl App {
    /// Create a new `App` running the diffusion pipeline over ssh and sbatch.
    pub fn new(settings: Settings, cancel: CancelFlag) -> Self {
        let fs = Fs::new(&settings.config, settings.dry_run);
        let ui = Ui::new(&settings);
        Self {
            settings,
            fs,
            ui,
            layout: dti::layout(),
            pipeline: dti::pipeline(),
            remote: Box::new(SshRemote::new(cancel.clone())),
            scheduler: Box::new(Sbatch::new(cancel.clone())),
            cancel,
            exe: None,
        }
    }

    pub fn with_pipeline(mut self, layout: CatalogLayout, pipeline: Pipeline) -> Self {
        self.layout = layout;
        self.pipeline = pipeline;
        self
    }

    pub fn with_remote(mut self, remote: Box<dyn Remote>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_exe(mut self, exe: PathBuf) -> Self {
        self.exe = Some(exe);
        self
    }

    /// Run the app in the mode chosen on the command line.
    pub fn run(&self) -> Result<()> {
        for warning in self.settings.config.warnings() {
            log::warn!("{warning}");
        }
        if self.settings.verbose > 0 {
            eprintln!("Using output directory {:?}", self.settings.config.output);
        }

        match &self.settings.mode {
            Mode::Submit => self.run_submit(),
            Mode::Worker { work_list, index } => self.run_worker(work_list, *index),
            Mode::Report { work_list } => self.run_report(work_list),
        }
    }
}

// SUBMIT //////////////////
impl App {
    fn run_submit(&self) -> Result<()> {
        let config = &self.settings.config;

        self.ui.verbose_progress("Discovering items");
        let items = Discovery::new(config, &self.fs, &self.layout, self.remote.as_ref())
            .discover()
            .context("while discovering work items")?;
        self.ui.done();

        if items.is_empty() {
            eprintln!("{}", "No items to process; exiting.".green());
            return Ok(());
        }
        self.ui.print_items(&items);

        let exe = match &self.exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe().context("while locating the dwiprep executable")?,
        };
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let coordinator = SubmissionCoordinator::new(config, &self.fs, self.scheduler.as_ref());

        if self.settings.dry_run {
            print!("{}", coordinator.preview(&items, &exe, &stamp));
            return Ok(());
        }
        if !self.ui.confirm("Submit?")? {
            return Ok(());
        }

        let submission = coordinator
            .submit(&items, &exe, &stamp)
            .context("while submitting jobs")?;
        self.ui.print_submission(&submission);
        Ok(())
    }
}

// WORKER //////////////////
impl App {
    /// A failed item is not a failed process: it is recorded by its missing
    /// marker. Only configuration errors and cancellation exit nonzero.
    fn run_worker(&self, work_list: &Path, index: usize) -> Result<()> {
        let ids = self
            .fs
            .load_work_list(work_list)
            .context("while loading work list")?;
        if ids.is_empty() {
            return Err(Error::EmptyWorkList(work_list.to_path_buf()).into());
        }
        let id = ids
            .get(index - 1)
            .ok_or(Error::IndexOutOfRange(index, ids.len()))?;
        log::info!("Array index {index} -> {id}");

        if self.settings.dry_run {
            let names: Vec<&str> = self.pipeline.stages().iter().map(|s| s.name.as_str()).collect();
            eprintln!("Dry run. Would run {id} through: {}", names.join(", "));
            return Ok(());
        }

        let worker = Worker::new(
            &self.settings.config,
            &self.fs,
            &self.layout,
            &self.pipeline,
            self.remote.as_ref(),
            &self.cancel,
        );
        match worker.run(id) {
            Ok(()) => Ok(()),
            Err(failure) if failure.is_cancelled() => Err(Error::Cancelled(id.clone()).into()),
            Err(failure) => {
                log::error!("{} {id}: {failure}", "FAILED".red());
                Ok(())
            }
        }
    }
}

// REPORT //////////////////
impl App {
    fn run_report(&self, work_list: &Path) -> Result<()> {
        if self.settings.dry_run {
            let ids = self.fs.load_work_list(work_list)?;
            let marked =
                CompletionTracker::new(&self.fs).list_marked(ids.iter().map(String::as_str));
            eprintln!(
                "Dry run. {} of {} items have completion markers.",
                marked.len(),
                ids.len()
            );
            return Ok(());
        }

        let (path, manifest) = Aggregator::new(&self.settings.config, &self.fs)
            .aggregate(work_list)
            .context("while aggregating results")?;
        eprintln!(
            "{} {} items in {:?}.",
            "Reported".green(),
            manifest.pipeline_description.subjects_processed.len(),
            path
        );
        Ok(())
    }
}

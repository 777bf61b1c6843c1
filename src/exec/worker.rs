use std::path::{Path, PathBuf};

use colored::Colorize;

use pipeline::{CatalogLayout, Pipeline, Vars, WorkItem, OUT_VAR};

use crate::fs::Fs;
use crate::ledger::CompletionTracker;
use crate::remote::Remote;
use crate::settings::RunConfig;
use crate::staging::{self, StagingCache, StagingDir};

use super::{CancelFlag, StageFailure, StageRunner, ToolEnv};

/// Why an item did not complete. Recorded only as the absence of a marker.
#[derive(Debug, thiserror::Error)]
pub enum ItemFailure {
    #[error("unable to prepare work directory for {0}: {1}")]
    Setup(String, String),
    #[error("no required input found for {item}; checked {checked:?}")]
    MissingInputs { item: String, checked: Vec<PathBuf> },
    #[error(transparent)]
    Stage(#[from] StageFailure),
    #[error("{0} completed, but its marker could not be written: {1}")]
    Marker(String, String),
    #[error("cancelled by termination signal")]
    Cancelled,
}

impl ItemFailure {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ItemFailure::Cancelled => true,
            ItemFailure::Stage(failure) => failure.is_cancelled(),
            _ => false,
        }
    }
}

/// Runs one work item: stage inputs, run the pipeline, mark completion.
///
/// Anything staged lives in a directory owned by this call and removed
/// before it returns, whatever the outcome.
pub struct Worker<'a> {
    config: &'a RunConfig,
    fs: &'a Fs,
    layout: &'a CatalogLayout,
    pipeline: &'a Pipeline,
    remote: &'a dyn Remote,
    cancel: &'a CancelFlag,
}

impl<'a> Worker<'a> {
    pub fn new(
        config: &'a RunConfig,
        fs: &'a Fs,
        layout: &'a CatalogLayout,
        pipeline: &'a Pipeline,
        remote: &'a dyn Remote,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            config,
            fs,
            layout,
            pipeline,
            remote,
            cancel,
        }
    }

    pub fn run(&self, id: &str) -> Result<(), ItemFailure> {
        let config = self.config;
        let mut item = self
            .layout
            .resolve(&config.catalog, &config.done, id, &config.session);

        log::info!("Starting processing for {} ({})", id.cyan(), item.session);

        let work_dir = self
            .fs
            .item_dir(&self.layout.item_dir_name(id, &item.session));
        self.fs
            .create_dir(&work_dir)
            .map_err(|e| ItemFailure::Setup(id.to_owned(), format!("{e:#}")))?;

        // held until the end of this fn; dropping it removes the staged copies.
        let _staging = match &config.remote {
            Some(host) => Some(self.stage_inputs(&mut item, host, &work_dir)?),
            None => None,
        };

        if !item.required_inputs().any(|input| self.fs.exists(&input.local)) {
            return Err(ItemFailure::MissingInputs {
                item: id.to_owned(),
                checked: item.required_inputs().map(|i| i.local.clone()).collect(),
            });
        }

        let vars = self.make_vars(&item, &work_dir);
        let env = ToolEnv::new(&config.tool_root);
        StageRunner::new(self.fs, &env, self.cancel).run(id, self.pipeline, &vars, &work_dir)?;

        CompletionTracker::new(self.fs)
            .mark(id)
            .map_err(|e| ItemFailure::Marker(id.to_owned(), format!("{e:#}")))?;

        log::info!("{} {id}", "COMPLETED".green());
        Ok(())
    }

    /// Create the staging dir, point `item`'s inputs into it and fetch them.
    /// Failed transfers are logged; the missing files surface later.
    fn stage_inputs(
        &self,
        item: &mut WorkItem,
        host: &str,
        work_dir: &Path,
    ) -> Result<StagingDir<'a>, ItemFailure> {
        let staging = StagingDir::create(self.fs, self.fs.staging_dir(work_dir))
            .map_err(|e| ItemFailure::Setup(item.id.clone(), format!("{e:#}")))?;
        item.rebase_inputs(staging.path());

        let cache = StagingCache::new(self.fs, self.remote, host, self.config.force_remote);
        for input in &item.inputs {
            match cache.ensure(&input.local, &input.canonical) {
                Ok(_) => {}
                Err(staging::Error::Cancelled) => return Err(ItemFailure::Cancelled),
                Err(e) => log::error!("[{}] {e}", item.id),
            }
        }
        Ok(staging)
    }

    fn make_vars(&self, item: &WorkItem, work_dir: &Path) -> Vars {
        let mut vars = Vars::default();
        vars.insert(OUT_VAR, work_dir.to_string_lossy());
        for input in &item.inputs {
            vars.insert(input.role, input.local.to_string_lossy());
        }
        vars
    }
}

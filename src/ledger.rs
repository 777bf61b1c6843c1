//! Filesystem-backed record of which items finished every stage.
//!
//! One `<id>.done` file per item under `$OUTPUT/status`. Writers never
//! share a file, and a marker is created at most once, so many workers can
//! mark concurrently without locking.

use anyhow::{Context, Result};

use util::HashSet;

use crate::fs::Fs;

pub struct CompletionTracker<'a> {
    fs: &'a Fs,
}

impl<'a> CompletionTracker<'a> {
    pub fn new(fs: &'a Fs) -> Self {
        Self { fs }
    }

    /// Record that `item` completed. Marking an already-marked item is a no-op,
    /// since the scheduler may re-dispatch a worker after an infrastructure failure.
    pub fn mark(&self, item: &str) -> Result<()> {
        self.fs
            .create_dir(self.fs.status_dir())
            .context("while creating status directory")?;
        let marker = self.fs.marker(item);
        let stamp = chrono::Local::now().to_rfc3339();
        if self.fs.create_new_file(&marker, &stamp)? {
            log::info!("Marked {item} complete");
        } else {
            log::debug!("{item} was already marked complete");
        }
        Ok(())
    }

    pub fn has(&self, item: &str) -> bool {
        self.fs.exists(self.fs.marker(item))
    }

    /// Which of `candidates` have a marker.
    pub fn list_marked<'c, I>(&self, candidates: I) -> HashSet<&'c str>
    where
        I: IntoIterator<Item = &'c str>,
    {
        candidates.into_iter().filter(|id| self.has(id)).collect()
    }

    /// Remove every marker. Only call once the marked set has been captured.
    pub fn purge(&self) -> Result<()> {
        let dir = self.fs.status_dir();
        if self.fs.is_dir(&dir) {
            log::info!("Removing status directory {:?}", dir);
            self.fs.delete_dir(&dir)?;
        }
        Ok(())
    }
}

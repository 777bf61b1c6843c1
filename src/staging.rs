//! Bringing remote inputs into local scratch space.

use std::path::{Path, PathBuf};

use crate::fs::Fs;
use crate::remote::Remote;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to fetch {host}:{remote:?} to {local:?}: {cause}")]
    Transfer {
        host: String,
        remote: PathBuf,
        local: PathBuf,
        cause: String,
    },
    #[error("unable to prepare {0:?}: {1}")]
    Prepare(PathBuf, String),
    #[error("cancelled by termination signal")]
    Cancelled,
}

/// What `StagingCache::ensure` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// Local copy already present; nothing transferred.
    Cached,
    Fetched,
}

/// Makes sure inputs exist locally, copying them from a remote host when needed.
///
/// Never writes to the remote side, and never deletes anything: the staged
/// files belong to whoever created the directory they land in.
pub struct StagingCache<'a> {
    fs: &'a Fs,
    remote: &'a dyn Remote,
    host: &'a str,
    force: bool,
}

impl<'a> StagingCache<'a> {
    pub fn new(fs: &'a Fs, remote: &'a dyn Remote, host: &'a str, force: bool) -> Self {
        Self {
            fs,
            remote,
            host,
            force,
        }
    }

    /// Ensure `local_path` holds a copy of `remote_path`.
    pub fn ensure(&self, local_path: &Path, remote_path: &Path) -> Result<Staged, Error> {
        if !self.force && self.fs.exists(local_path) {
            log::debug!("Using cached {:?}", local_path);
            return Ok(Staged::Cached);
        }

        log::info!(
            "Fetching {:?} from {} (force={})",
            local_path,
            self.host,
            self.force
        );
        self.fs
            .create_parent_dir(local_path)
            .map_err(|e| Error::Prepare(local_path.to_path_buf(), format!("{e:#}")))?;

        match self.remote.fetch(self.host, remote_path, local_path) {
            Ok(()) => Ok(Staged::Fetched),
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Transfer {
                host: self.host.to_owned(),
                remote: remote_path.to_path_buf(),
                local: local_path.to_path_buf(),
                cause: e.to_string(),
            }),
        }
    }
}

/// A scratch directory owned by one worker invocation.
///
/// Removed when dropped, so it goes away on success, on a failed stage,
/// on cancellation and on panic alike.
pub struct StagingDir<'a> {
    fs: &'a Fs,
    path: PathBuf,
}

impl<'a> StagingDir<'a> {
    /// Create `path` empty. Anything an earlier invocation left there
    /// (e.g. a partial transfer from a killed worker) is removed first.
    pub fn create(fs: &'a Fs, path: PathBuf) -> anyhow::Result<Self> {
        if fs.exists(&path) {
            log::warn!("Removing leftover staging directory {:?}", path);
            fs.delete_dir(&path)?;
        }
        fs.create_dir(&path)?;
        Ok(Self { fs, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir<'_> {
    fn drop(&mut self) {
        if !self.fs.exists(&self.path) {
            return;
        }
        log::info!("Cleaning up staging directory {:?}", self.path);
        if let Err(e) = self.fs.delete_dir(&self.path) {
            log::error!("Failed to remove staging directory {:?}: {e:#}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::DirRemote;
    use crate::settings::RunConfig;
    use anyhow::Result;
    use tempfile::tempdir;

    fn setup(root: &Path) -> Result<(RunConfig, PathBuf)> {
        let config = RunConfig::for_tests(root);
        std::fs::create_dir_all(&config.catalog)?;
        let source = config.catalog.join("t1.nii.gz");
        std::fs::write(&source, "image")?;
        Ok((config, source))
    }

    #[test]
    fn test_cache_hit_skips_transfer() -> Result<()> {
        let dir = tempdir()?;
        let (config, source) = setup(dir.path())?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let local = config.output.join("stage/t1.nii.gz");

        let cache = StagingCache::new(&fs, &remote, "host", false);
        assert_eq!(cache.ensure(&local, &source)?, Staged::Fetched);
        assert_eq!(cache.ensure(&local, &source)?, Staged::Cached);
        assert_eq!(remote.fetches.get(), 1);
        assert_eq!(std::fs::read_to_string(&local)?, "image");
        Ok(())
    }

    #[test]
    fn test_force_always_fetches() -> Result<()> {
        let dir = tempdir()?;
        let (config, source) = setup(dir.path())?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let local = config.output.join("stage/t1.nii.gz");

        let cache = StagingCache::new(&fs, &remote, "host", true);
        cache.ensure(&local, &source)?;
        cache.ensure(&local, &source)?;
        assert_eq!(remote.fetches.get(), 2);
        Ok(())
    }

    #[test]
    fn test_transfer_failure_is_reported() -> Result<()> {
        let dir = tempdir()?;
        let (config, _) = setup(dir.path())?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let local = config.output.join("stage/missing.nii.gz");

        let cache = StagingCache::new(&fs, &remote, "host", false);
        let err = cache
            .ensure(&local, &config.catalog.join("missing.nii.gz"))
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
        assert!(!local.exists());
        Ok(())
    }

    #[test]
    fn test_staging_dir_removed_on_drop() -> Result<()> {
        let dir = tempdir()?;
        let config = RunConfig::for_tests(dir.path());
        let fs = Fs::new(&config, false);
        let path = config.output.join("sub-1_ses-01/staging");
        {
            let staging = StagingDir::create(&fs, path.clone())?;
            std::fs::write(staging.path().join("file"), "x")?;
            assert!(path.exists());
        }
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_staging_dir_starts_empty() -> Result<()> {
        let dir = tempdir()?;
        let (config, source) = setup(dir.path())?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let path = config.output.join("sub-1_ses-01/staging");
        std::fs::create_dir_all(&path)?;
        std::fs::write(path.join("t1.nii.gz"), "trunc")?;

        let staging = StagingDir::create(&fs, path.clone())?;
        assert!(!staging.path().join("t1.nii.gz").exists());

        let cache = StagingCache::new(&fs, &remote, "host", false);
        let local = staging.path().join("t1.nii.gz");
        assert_eq!(cache.ensure(&local, &source)?, Staged::Fetched);
        assert_eq!(std::fs::read_to_string(&local)?, "image");
        Ok(())
    }
}

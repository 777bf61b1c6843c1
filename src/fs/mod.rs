use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::settings::RunConfig;

/// Defines fns for creating common paths in the output and submission directories
mod paths;

/// Dealing with work-list files
mod work_list;
pub use work_list::work_list_stamp;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
    #[error("Dry run; not modifying \"{0}\"")]
    DryRun(String),
    #[error("Path has no parent: \"{0}\"")]
    NoParent(String),
}

/// All file operations in the crate should go through this struct.
///
/// All destructive operations check that the path in question is a child of one
/// of the whitelisted prefixes (output dir, submission dir, log dir), otherwise
/// they will not be performed. Stage commands and remote transfers run as
/// subprocesses and are only constrained by the paths we hand them.
#[derive(Debug)]
pub struct Fs {
    /// Root of per-item work dirs, markers and manifests
    output: PathBuf,
    /// Where work lists and submission scripts are written
    submit: PathBuf,
    /// Where the scheduler writes job logs
    logs: PathBuf,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` whitelisting the directories named in `config`.
    pub fn new(config: &RunConfig, dry_run: bool) -> Self {
        Self {
            output: config.output.clone(),
            submit: config.submit_dir.clone(),
            logs: config.log_dir.clone(),
            dry_run,
        }
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Check if path exists and is a directory.
    pub fn is_dir<T: AsRef<Path>>(&self, path: T) -> bool {
        path.as_ref().is_dir()
    }

    /// Create a directory and any missing parents.
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
        Ok(())
    }

    /// Create parent directory of a given path.
    pub fn create_parent_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        let parent = path
            .parent()
            .ok_or_else(|| Error::NoParent(path.to_string_lossy().into_owned()))?;
        self.check_whitelist(parent)?;
        fs::create_dir_all(parent).context("creating parent dir")?;
        Ok(())
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        Ok(f)
    }

    /// Write `text` to a file that must not exist yet.
    /// Returns `false` without touching anything if the file is already there.
    pub fn create_new_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<bool> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let mut f = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("creating file {:?}", path)),
        };
        f.write_all(text.as_bytes())
            .and_then(|_| f.sync_all())
            .with_context(|| format!("writing file {:?}", path))?;
        Ok(true)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).with_context(|| format!("writing file {:?}", path))?;
        Ok(())
    }

    /// Delete a file.
    pub fn delete_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_file(path).with_context(|| format!("deleting file {:?}", path))?;
        Ok(())
    }

    /// Recursively delete a directory.
    pub fn delete_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_dir_all(path).with_context(|| format!("deleting dir {:?}", path))?;
        Ok(())
    }

    /// Read entire file into a String.
    pub fn read_to_buf<T: AsRef<Path>>(&self, path: T, strbuf: &mut String) -> Result<()> {
        use std::io::Read;
        let path = path.as_ref();
        strbuf.clear();
        let mut f = fs::File::open(path).with_context(|| format!("opening {:?}", path))?;
        f.read_to_string(strbuf)?;
        Ok(())
    }

    /// List entries in a directory
    pub fn read_dir<T: AsRef<Path>>(&self, path: T) -> Result<fs::ReadDir, io::Error> {
        fs::read_dir(path)
    }

    fn is_whitelisted<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        [&self.output, &self.submit, &self.logs]
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.dry_run {
            Err(Error::DryRun(util::path_str(path)?.to_owned()).into())
        } else if !self.is_whitelisted(path) {
            Err(Error::NotWhitelisted(util::path_str(path)?.to_owned()).into())
        } else {
            Ok(())
        }
    }
}

//! Utility functions for dealing with work-list files.
//!
//! A work list holds one item id per line; line N is array index N (1-based).

use std::path::Path;

use anyhow::{Context, Result};

use super::paths::{WORK_LIST_PREFIX, WORK_LIST_SUFFIX};
use super::Fs;

impl Fs {
    /// Load item ids from `path`, skipping blank lines.
    pub fn load_work_list(&self, path: &Path) -> Result<Vec<String>> {
        let mut strbuf = String::with_capacity(1024);
        self.read_to_buf(path, &mut strbuf)
            .with_context(|| format!("while reading work list {:?}", path))?;
        Ok(strbuf
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Write item ids to `path`. Fails if the file already exists,
    /// so two runs can never share a work list.
    pub fn write_work_list(&self, path: &Path, ids: &[&str]) -> Result<()> {
        let mut strbuf = String::with_capacity(ids.len() * 16);
        for id in ids {
            strbuf.push_str(id);
            strbuf.push('\n');
        }
        if !self.create_new_file(path, &strbuf)? {
            anyhow::bail!("work list {:?} already exists", path);
        }
        Ok(())
    }
}

/// Extract the run stamp from a work-list file name (`worklist_<stamp>.txt`).
pub fn work_list_stamp(path: &Path) -> Option<&str> {
    path.file_name()?
        .to_str()?
        .strip_prefix(WORK_LIST_PREFIX)?
        .strip_suffix(WORK_LIST_SUFFIX)
        .filter(|stamp| !stamp.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RunConfig;
    use tempfile::tempdir;

    #[test]
    fn test_work_list_roundtrip_skips_blanks() -> Result<()> {
        let dir = tempdir()?;
        let config = RunConfig::for_tests(dir.path());
        let fs = Fs::new(&config, false);
        fs.create_dir(&config.submit_dir)?;

        let path = fs.work_list("20240101_120000");
        fs.write_work_list(&path, &["sub-01", "sub-02"])?;
        std::fs::write(&path, "sub-01\n\n  sub-02  \n")?;
        assert_eq!(fs.load_work_list(&path)?, vec!["sub-01", "sub-02"]);
        Ok(())
    }

    #[test]
    fn test_write_work_list_refuses_existing() -> Result<()> {
        let dir = tempdir()?;
        let config = RunConfig::for_tests(dir.path());
        let fs = Fs::new(&config, false);
        fs.create_dir(&config.submit_dir)?;

        let path = fs.work_list("stamp");
        fs.write_work_list(&path, &["a"])?;
        assert!(fs.write_work_list(&path, &["b"]).is_err());
        Ok(())
    }

    #[test]
    fn test_work_list_stamp() {
        assert_eq!(
            work_list_stamp(Path::new("/x/worklist_20240101_120000.txt")),
            Some("20240101_120000")
        );
        assert_eq!(work_list_stamp(Path::new("/x/subjects.txt")), None);
        assert_eq!(work_list_stamp(Path::new("worklist_.txt")), None);
    }
}

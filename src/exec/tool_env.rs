use std::path::{Path, PathBuf};
use std::process::Command;

/// Pins external tool invocations to one installation.
#[derive(Debug, Clone)]
pub struct ToolEnv {
    root: PathBuf,
}

impl ToolEnv {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Point `cmd` at this installation: FSLDIR, PATH and the output image type.
    pub fn apply(&self, cmd: &mut Command) {
        let bin = self.root.join("bin");
        let path = match std::env::var_os("PATH") {
            Some(path) => {
                let mut paths = vec![bin];
                paths.extend(std::env::split_paths(&path));
                std::env::join_paths(paths).unwrap_or(path)
            }
            None => bin.into_os_string(),
        };
        cmd.env("FSLDIR", &self.root)
            .env("PATH", path)
            .env("FSLOUTPUTTYPE", "NIFTI_GZ");
    }

    /// Installed version from `$FSLDIR/etc/fslversion`, or "unknown".
    pub fn version(&self) -> String {
        let file = self.root.join("etc").join("fslversion");
        match std::fs::read_to_string(&file) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            _ => {
                log::debug!("No tool version at {:?}", file);
                "unknown".to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("etc"))?;
        std::fs::write(dir.path().join("etc/fslversion"), "6.0.4\n")?;
        assert_eq!(ToolEnv::new(dir.path()).version(), "6.0.4");
        Ok(())
    }

    #[test]
    fn test_version_unknown() {
        assert_eq!(ToolEnv::new(Path::new("/nonexistent")).version(), "unknown");
    }

    #[test]
    fn test_apply_prepends_bin() {
        let env = ToolEnv::new(Path::new("/opt/fsl"));
        let mut cmd = Command::new("true");
        env.apply(&mut cmd);
        let path = cmd
            .get_envs()
            .find(|(k, _)| *k == "PATH")
            .and_then(|(_, v)| v)
            .unwrap();
        assert!(path.to_string_lossy().starts_with("/opt/fsl/bin"));
    }
}

use std::borrow::Cow;
use std::path::Path;
use std::process::Command;

use crate::exec::{self, run_cmd, CancelFlag};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`{0}` exited with {1}: {2}")]
    Failed(String, String, String),
    #[error(transparent)]
    Exec(#[from] exec::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Exec(exec::Error::Cancelled))
    }
}

/// Access to the host holding the catalog.
///
/// Only ever reads from the remote side.
pub trait Remote {
    /// Copy `remote_path` on `host` to `local_path`.
    fn fetch(&self, host: &str, remote_path: &Path, local_path: &Path) -> Result<(), Error>;

    /// Run a shell script on `host` and return its stdout.
    fn exec(&self, host: &str, script: &str) -> Result<String, Error>;
}

/// `Remote` over `scp` and `ssh`.
pub struct SshRemote {
    cancel: CancelFlag,
}

impl SshRemote {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    /// `program` with options that keep a batch job from ever prompting.
    fn command(program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-q").arg("-o").arg("BatchMode=yes");
        cmd
    }

    fn run(&self, cmd: &mut Command, what: String) -> Result<String, Error> {
        let output = run_cmd(cmd, None, &self.cancel)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::Failed(what, output.status.to_string(), output.tail(10)))
        }
    }
}

impl Remote for SshRemote {
    fn fetch(&self, host: &str, remote_path: &Path, local_path: &Path) -> Result<(), Error> {
        // the remote side of scp is interpreted by the remote shell:
        let source = format!("{host}:{}", quote(remote_path));
        let mut cmd = Self::command("scp");
        cmd.arg(&source).arg(local_path);
        self.run(&mut cmd, format!("scp {source}"))?;
        Ok(())
    }

    fn exec(&self, host: &str, script: &str) -> Result<String, Error> {
        let mut cmd = Self::command("ssh");
        cmd.arg(host).arg(script);
        self.run(&mut cmd, format!("ssh {host}"))
    }
}

/// Quote a path for a POSIX shell.
pub fn quote(path: &Path) -> Cow<'_, str> {
    shell_escape::unix::escape(path.to_string_lossy())
}

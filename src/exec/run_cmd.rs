use std::fs::File;
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use super::{CancelFlag, Error};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last `n` lines of stderr (or stdout, if stderr is empty), for diagnostics.
    pub fn tail(&self, n: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Run a subprocess to completion, capturing stdout and stderr and
/// optionally teeing them into `logs` (stdout file, stderr file).
///
/// The child is killed if `cancel` is raised while it runs.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(
    cmd: &mut Command,
    logs: Option<(File, File)>,
    cancel: &CancelFlag,
) -> Result<CmdOutput, Error> {
    let program = format!("{:?}", cmd.get_program());
    log::debug!("Running {program} {:?}", cmd.get_args().collect::<Vec<_>>());

    if cancel.is_raised() {
        return Err(Error::Cancelled);
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Spawn(program.clone(), e))?;

    let (out_file, err_file) = match logs {
        Some((out, err)) => (Some(out), Some(err)),
        None => (None, None),
    };
    let child_out = child.stdout.take();
    let child_err = child.stderr.take();

    let thread_out = thread::spawn(move || communicate(child_out, out_file));
    let thread_err = thread::spawn(move || communicate(child_err, err_file));

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_raised() {
            log::warn!("Termination requested; killing {program}");
            // already-exited children make kill() fail, which is fine:
            let _ = child.kill();
            let _ = child.wait();
            // reader threads are detached: a grandchild may still hold the pipes.
            return Err(Error::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join(thread_out)?;
    let stderr = join(thread_err)?;

    log::debug!("{program} finished with {status}");
    Ok(CmdOutput {
        status,
        stdout,
        stderr,
    })
}

fn join(handle: thread::JoinHandle<std::io::Result<String>>) -> Result<String, Error> {
    handle
        .join()
        .map_err(|_| Error::Io(std::io::Error::other("output reader thread panicked")))?
        .map_err(Error::Io)
}

fn communicate<R: Read>(stream: Option<R>, mut file: Option<File>) -> std::io::Result<String> {
    let mut captured = Vec::with_capacity(1024);
    let Some(mut stream) = stream else {
        return Ok(String::new());
    };
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        if let Some(file) = file.as_mut() {
            file.write_all(buf)?;
        }
        captured.extend_from_slice(buf);
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}

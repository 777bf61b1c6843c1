use std::fs::File;
use std::path::Path;
use std::process::Command;

use pipeline::{Pipeline, Stage, Step, Vars};
use util::Timer;

use crate::fs::Fs;

use super::{run_cmd, CancelFlag, Error, ToolEnv};

/// Lines of tool output kept in a failure diagnostic.
const DIAGNOSTIC_LINES: usize = 20;

/// Why a stage stopped.
#[derive(Debug, thiserror::Error)]
pub enum Cause {
    #[error("bad stage template: {0}")]
    Template(#[from] pipeline::Error),
    #[error("`{step}` exited with {status}:\n{diagnostic}")]
    Exit {
        step: String,
        status: String,
        diagnostic: String,
    },
    #[error("{0}")]
    Io(String),
    #[error("cancelled by termination signal")]
    Cancelled,
}

/// The first stage that failed, and why.
#[derive(Debug, thiserror::Error)]
#[error("stage \"{stage}\" failed: {cause}")]
pub struct StageFailure {
    pub stage: String,
    #[source]
    pub cause: Cause,
}

impl StageFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, Cause::Cancelled)
    }
}

/// Runs a `Pipeline` inside one item's work directory.
///
/// Stages run in order and the first failure aborts the rest, since later
/// stages read files produced by earlier ones. Each stage's output is
/// kept under `<work dir>/logs/`.
pub struct StageRunner<'a> {
    fs: &'a Fs,
    env: &'a ToolEnv,
    cancel: &'a CancelFlag,
    timer: Timer,
}

impl<'a> StageRunner<'a> {
    pub fn new(fs: &'a Fs, env: &'a ToolEnv, cancel: &'a CancelFlag) -> Self {
        Self {
            fs,
            env,
            cancel,
            timer: Timer::now(),
        }
    }

    /// Run every stage of `pipeline` in `work_dir`, substituting `vars` into templates.
    pub fn run(
        &mut self,
        label: &str,
        pipeline: &Pipeline,
        vars: &Vars,
        work_dir: &Path,
    ) -> Result<(), StageFailure> {
        let total = pipeline.len();
        for (i, stage) in pipeline.stages().iter().enumerate() {
            log::info!("[{label}] Stage {}/{total}: {}", i + 1, stage.name);
            self.timer.reset();

            if let Err(cause) = self.run_stage(stage, vars, work_dir) {
                log::error!("[{label}] Stage {} failed: {cause}", stage.name);
                if let Some(hint) = &stage.hint {
                    log::warn!("[{label}] {hint}");
                }
                return Err(StageFailure {
                    stage: stage.name.clone(),
                    cause,
                });
            }

            self.timer.log_elapsed(&format!("[{label}] {}", stage.name));
        }
        Ok(())
    }

    fn run_stage(&self, stage: &Stage, vars: &Vars, work_dir: &Path) -> Result<(), Cause> {
        let (out_file, err_file) = self.make_log_files(work_dir, &stage.name)?;

        for step in &stage.steps {
            if self.cancel.is_raised() {
                return Err(Cause::Cancelled);
            }
            match step {
                Step::Write { file, contents } => {
                    let file = vars.render(file)?;
                    log::debug!("Writing {file}");
                    self.fs
                        .write_file(&file, contents)
                        .map_err(|e| Cause::Io(format!("{e:#}")))?;
                }
                Step::Run { program, args } => {
                    let mut cmd = Command::new(program);
                    for arg in args {
                        cmd.arg(vars.render(arg)?);
                    }
                    self.exec(&mut cmd, program, &out_file, &err_file, work_dir)?;
                }
                Step::Shell(line) => {
                    let line = vars.render_shell(line)?;
                    let mut cmd = Command::new("/usr/bin/env");
                    cmd.arg("bash").arg("-euo").arg("pipefail").arg("-c").arg(&line);
                    self.exec(&mut cmd, &line, &out_file, &err_file, work_dir)?;
                }
            }
        }
        Ok(())
    }

    fn exec(
        &self,
        cmd: &mut Command,
        step: &str,
        out_file: &File,
        err_file: &File,
        work_dir: &Path,
    ) -> Result<(), Cause> {
        cmd.current_dir(work_dir);
        self.env.apply(cmd);

        let logs = (
            out_file.try_clone().map_err(io_cause)?,
            err_file.try_clone().map_err(io_cause)?,
        );
        let output = match run_cmd(cmd, Some(logs), self.cancel) {
            Ok(output) => output,
            Err(Error::Cancelled) => return Err(Cause::Cancelled),
            Err(e) => return Err(Cause::Io(format!("{e:#}"))),
        };

        if output.success() {
            Ok(())
        } else {
            Err(Cause::Exit {
                step: step.to_owned(),
                status: output.status.to_string(),
                diagnostic: output.tail(DIAGNOSTIC_LINES),
            })
        }
    }

    fn make_log_files(&self, work_dir: &Path, stage: &str) -> Result<(File, File), Cause> {
        let (out, err) = self.fs.stage_logs(work_dir, stage);
        let io = |e: anyhow::Error| Cause::Io(format!("{e:#}"));
        self.fs.create_parent_dir(&out).map_err(io)?;
        Ok((
            self.fs.create_file(&out).map_err(io)?,
            self.fs.create_file(&err).map_err(io)?,
        ))
    }
}

fn io_cause(e: std::io::Error) -> Cause {
    Cause::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RunConfig;
    use anyhow::Result;
    use tempfile::tempdir;

    fn three_stages(second: Stage) -> Pipeline {
        Pipeline::new(vec![
            Stage::new("first").shell("echo one > {out}/one.txt"),
            second,
            Stage::new("third").shell("echo three > {out}/three.txt"),
        ])
    }

    fn setup(root: &Path) -> Result<(RunConfig, Fs, Vars)> {
        let config = RunConfig::for_tests(root);
        let fs = Fs::new(&config, false);
        let work_dir = fs.item_dir("sub-1_ses-01");
        fs.create_dir(&work_dir)?;
        let mut vars = Vars::default();
        vars.insert(pipeline::OUT_VAR, work_dir.to_string_lossy());
        Ok((config, fs, vars))
    }

    #[test]
    fn test_all_stages_run_in_order() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, vars) = setup(dir.path())?;
        let env = ToolEnv::new(&config.tool_root);
        let cancel = CancelFlag::default();
        let work_dir = fs.item_dir("sub-1_ses-01");

        let pipeline = three_stages(
            Stage::new("second")
                .write("{out}/params.txt", "0 1")
                .run("cp", ["{out}/params.txt", "{out}/two.txt"]),
        );
        StageRunner::new(&fs, &env, &cancel).run("sub-1", &pipeline, &vars, &work_dir)?;

        assert!(work_dir.join("one.txt").exists());
        assert_eq!(std::fs::read_to_string(work_dir.join("two.txt"))?, "0 1");
        assert!(work_dir.join("three.txt").exists());
        assert!(work_dir.join("logs/second.stderr.txt").exists());
        Ok(())
    }

    #[test]
    fn test_first_failure_aborts() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, vars) = setup(dir.path())?;
        let env = ToolEnv::new(&config.tool_root);
        let cancel = CancelFlag::default();
        let work_dir = fs.item_dir("sub-1_ses-01");

        let pipeline = three_stages(Stage::new("second").shell("echo broken input >&2; exit 2"));
        let failure = StageRunner::new(&fs, &env, &cancel)
            .run("sub-1", &pipeline, &vars, &work_dir)
            .unwrap_err();

        assert_eq!(failure.stage, "second");
        match &failure.cause {
            Cause::Exit { diagnostic, .. } => assert_eq!(diagnostic, "broken input"),
            other => panic!("unexpected cause {other:?}"),
        }
        assert!(work_dir.join("one.txt").exists());
        assert!(!work_dir.join("three.txt").exists());
        Ok(())
    }

    #[test]
    fn test_shell_steps_survive_spaces_in_paths() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("my data");
        let (config, fs, mut vars) = setup(&root)?;
        let env = ToolEnv::new(&config.tool_root);
        let cancel = CancelFlag::default();
        let work_dir = fs.item_dir("sub-1_ses-01");

        std::fs::create_dir_all(&config.catalog)?;
        let ap = config.catalog.join("dir-ap dwi.bvec");
        let pa = config.catalog.join("dir-pa dwi.bvec");
        std::fs::write(&ap, "1 0\n")?;
        std::fs::write(&pa, "0 1\n")?;
        vars.insert("bvec-ap", ap.to_string_lossy());
        vars.insert("bvec-pa", pa.to_string_lossy());

        let pipeline = Pipeline::new(vec![Stage::new("paste")
            .shell("paste -d ' ' {bvec-ap} {bvec-pa} > {out}/BVEC_concat_APPA.bvec")]);
        StageRunner::new(&fs, &env, &cancel).run("sub-1", &pipeline, &vars, &work_dir)?;

        assert_eq!(
            std::fs::read_to_string(work_dir.join("BVEC_concat_APPA.bvec"))?,
            "1 0 0 1\n"
        );
        Ok(())
    }

    #[test]
    fn test_unknown_placeholder_fails_before_running() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, vars) = setup(dir.path())?;
        let env = ToolEnv::new(&config.tool_root);
        let cancel = CancelFlag::default();
        let work_dir = fs.item_dir("sub-1_ses-01");

        let pipeline = Pipeline::new(vec![Stage::new("only").run("touch", ["{nope}"])]);
        let failure = StageRunner::new(&fs, &env, &cancel)
            .run("sub-1", &pipeline, &vars, &work_dir)
            .unwrap_err();
        assert!(matches!(failure.cause, Cause::Template(_)));
        Ok(())
    }

    #[test]
    fn test_raised_flag_cancels() -> Result<()> {
        let dir = tempdir()?;
        let (config, fs, vars) = setup(dir.path())?;
        let env = ToolEnv::new(&config.tool_root);
        let cancel = CancelFlag::default();
        cancel.raise();
        let work_dir = fs.item_dir("sub-1_ses-01");

        let pipeline = three_stages(Stage::new("second").run("true", Vec::<String>::new()));
        let failure = StageRunner::new(&fs, &env, &cancel)
            .run("sub-1", &pipeline, &vars, &work_dir)
            .unwrap_err();
        assert_eq!(failure.stage, "first");
        assert!(failure.is_cancelled());
        Ok(())
    }
}

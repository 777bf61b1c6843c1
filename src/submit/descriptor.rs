use std::borrow::Cow;
use std::fmt::Write;
use std::path::PathBuf;

/// Array indices `1..=size`, at most `max_parallel` running at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySpec {
    pub size: usize,
    pub max_parallel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// Start once the job has finished, whether or not its elements succeeded.
    AfterAny(String),
}

/// A batch script with its `#SBATCH` resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub job_name: &'static str,
    /// Log file template, may contain `%A`, `%a`, `%j`.
    pub log_template: PathBuf,
    pub partition: String,
    pub cpus: usize,
    pub mem: String,
    pub array: Option<ArraySpec>,
    pub dependency: Option<Dependency>,
    /// Program and args run by the job.
    pub command: Vec<String>,
}

impl Descriptor {
    pub fn render(&self) -> String {
        let mut script = String::with_capacity(512);
        script.push_str("#!/bin/bash\n");

        // writing to a String can't fail.
        let _ = writeln!(script, "#SBATCH --job-name={}", self.job_name);
        let _ = writeln!(script, "#SBATCH --output={}", self.log_template.display());
        let _ = writeln!(script, "#SBATCH --partition={}", self.partition);
        script.push_str("#SBATCH --nodes=1\n");
        script.push_str("#SBATCH --ntasks=1\n");
        let _ = writeln!(script, "#SBATCH --cpus-per-task={}", self.cpus);
        let _ = writeln!(script, "#SBATCH --mem={}", self.mem);
        if let Some(array) = &self.array {
            let _ = writeln!(script, "#SBATCH --array=1-{}%{}", array.size, array.max_parallel);
        }
        if let Some(Dependency::AfterAny(id)) = &self.dependency {
            let _ = writeln!(script, "#SBATCH --dependency=afterany:{id}");
        }

        script.push_str("\nset -euo pipefail\n\n");
        let command: Vec<Cow<str>> = self
            .command
            .iter()
            .map(|arg| shell_escape::unix::escape(Cow::Borrowed(arg.as_str())))
            .collect();
        let _ = writeln!(script, "exec {}", command.join(" "));
        script
    }
}

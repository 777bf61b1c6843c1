use clap::{ArgAction, Parser};

const CMD_NAME: &str = "dwiprep";
const DEFAULT_OUTPUT: &str = "output";
const DEFAULT_SESSION: &str = "ses-01";
const DEFAULT_TOOL_ROOT: &str = "/usr/local/fsl";
const DEFAULT_MAX_PARALLEL: &str = "9";
const DEFAULT_CPUS: &str = "4";
const DEFAULT_MEM: &str = "4G";
const DEFAULT_PARTITION: &str = "batch";
const DEFAULT_SUBMIT_DIR: &str = ".";
const DEFAULT_LOG_DIR: &str = "logs";

/// Stores our command-line args format.
///
/// With neither `--worker` nor `--report`, discovers items and submits
/// the array and report jobs.
#[derive(Parser, Debug, Clone)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Catalog (BIDS) root directory, local or on the remote host
    #[arg(short, long, value_name = "DIR")]
    #[arg(env = "DWIPREP_CATALOG")]
    pub catalog: String,

    /// Output directory for per-item work dirs, markers and manifests
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT)]
    #[arg(env = "DWIPREP_OUTPUT")]
    pub output: String,

    /// Directory checked for already-produced outputs (defaults to --output)
    #[arg(long, value_name = "DIR")]
    #[arg(env = "DWIPREP_DONE")]
    pub done_dir: Option<String>,

    /// Session tag
    #[arg(short, long, value_name = "SES", default_value = DEFAULT_SESSION)]
    pub session: String,

    /// Root of the external tool installation
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_TOOL_ROOT)]
    #[arg(env = "FSLDIR")]
    pub tool_root: String,

    /// Remote host holding the catalog (user@host)
    #[arg(short, long, value_name = "HOST")]
    #[arg(env = "DWIPREP_REMOTE")]
    pub remote: Option<String>,

    /// Re-fetch remote inputs even if a local copy exists
    #[arg(short, long)]
    pub force_remote: bool,

    /// Maximum number of array elements running at once
    #[arg(short = 'j', long, value_name = "N", default_value = DEFAULT_MAX_PARALLEL)]
    pub max_parallel: usize,

    /// CPUs requested per worker
    #[arg(long, value_name = "N", default_value = DEFAULT_CPUS)]
    pub cpus: usize,

    /// Memory requested per worker
    #[arg(long, value_name = "MEM", default_value = DEFAULT_MEM)]
    pub mem: String,

    /// Scheduler partition
    #[arg(long, value_name = "NAME", default_value = DEFAULT_PARTITION)]
    pub partition: String,

    /// Directory for work lists and generated submission scripts
    #[arg(long, value_name = "DIR", default_value = DEFAULT_SUBMIT_DIR)]
    pub submit_dir: String,

    /// Directory for scheduler job logs
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: String,

    /// Process one item of a work list (run by the scheduler)
    #[arg(long, conflicts_with = "report")]
    pub worker: bool,

    /// Reconcile a finished work list into a manifest (run by the scheduler)
    #[arg(long)]
    pub report: bool,

    /// Work-list file (required for --worker and --report)
    #[arg(short = 'l', long, value_name = "FILE")]
    pub work_list: Option<String>,

    /// 1-based index into the work list
    #[arg(short, long, value_name = "N")]
    #[arg(env = "SLURM_ARRAY_TASK_ID")]
    pub index: Option<usize>,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print additional debugging info (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Dry run; discover and print submission scripts but don't modify anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

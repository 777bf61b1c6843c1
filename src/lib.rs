/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Finding the items that still need processing
mod discover;
/// Running stages and work items
mod exec;
/// Filesystem operations
mod fs;
/// Completion markers
mod ledger;
/// Access to the host holding the catalog
mod remote;
/// Manifest generation after the array job finishes
mod report;
/// Combined command-line and environment run settings
mod settings;
/// Copying remote inputs into scratch space
mod staging;
/// Work lists, batch scripts and the scheduler
mod submit;
/// Text UI
mod ui;

// exported for tests:
pub use app::App;
pub use args::Args;
pub use exec::CancelFlag;
pub use remote::{Remote, SshRemote};
pub use settings::{Mode, RunConfig, Settings};
pub use submit::{Sbatch, Scheduler};

/// Error types that fakes of `Remote` and `Scheduler` need to construct.
pub mod errors {
    pub use crate::remote::Error as RemoteError;
    pub use crate::submit::Error as SubmitError;
}

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let mut log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // worker and report logs end up in scheduler log files:
    if settings.mode != Mode::Submit {
        log_level = log_level.max(log::LevelFilter::Info);
    }
    simple_logging::log_to_stderr(log_level);

    // SIGTERM/SIGINT cancel workers; other modes keep default signal handling:
    let cancel = match settings.mode {
        Mode::Worker { .. } => CancelFlag::from_signals()?,
        _ => CancelFlag::default(),
    };

    // RUN THE THING /////////////////
    let app = App::new(settings, cancel);
    app.run()?;

    Ok(())
}

use std::cell::RefCell;

use anyhow::Result;
use colored::Colorize;

use pipeline::WorkItem;

use crate::settings::Settings;
use crate::submit::Submission;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// -y setting, ignores all points where the user is prompted to enter 'y'
    override_confirmation: bool,
    /// buffer to hold strings internally when getting input
    strbuf: RefCell<String>,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose > 0,
            override_confirmation: settings.yes,
            // Refcell so we can call confirm() w/o needing a unique reference:
            strbuf: RefCell::new(String::with_capacity(16)),
        }
    }

    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.override_confirmation {
            return Ok(true);
        }
        eprintln!("{} (y/N)", prompt);

        let mut strbuf = self.strbuf.borrow_mut();

        strbuf.clear();
        std::io::stdin().read_line(&mut strbuf)?;
        match strbuf.chars().next() {
            Some('y') => Ok(true),
            _ => Ok(false),
        }
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }

    /// List the items about to be submitted.
    pub fn print_items(&self, items: &[WorkItem]) {
        eprintln!("\n{} items to process:", items.len().to_string().cyan());
        for item in items {
            eprintln!("  {}", item.id);
        }
        eprintln!();
    }

    pub fn print_submission(&self, submission: &Submission) {
        eprintln!(
            "{} array job {} and report job {}.",
            "Submitted".green(),
            submission.array_job.cyan(),
            submission.report_job.cyan(),
        );
        eprintln!("Work list: {:?}", submission.work_list);
    }
}

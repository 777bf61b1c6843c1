use std::path::{Path, PathBuf};

/// A logical input bound to its catalog path and to the path stages will read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    pub role: &'static str,
    pub required: bool,
    /// Path in the catalog (possibly on the remote host).
    pub canonical: PathBuf,
    /// Path the stages read; equals `canonical` unless the input was staged.
    pub local: PathBuf,
}

/// One subject/session pair with everything needed to process it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub session: String,
    pub inputs: Vec<InputRef>,
    /// Existence of this file means the item was already processed.
    pub output_target: PathBuf,
}

impl WorkItem {
    pub fn required_inputs(&self) -> impl Iterator<Item = &InputRef> {
        self.inputs.iter().filter(|input| input.required)
    }

    /// Point every input's local path into `dir`, keeping file names.
    pub fn rebase_inputs(&mut self, dir: &Path) {
        for input in &mut self.inputs {
            if let Some(name) = input.canonical.file_name() {
                input.local = dir.join(name);
            }
        }
    }
}

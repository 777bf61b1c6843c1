/// Where a work item's inputs and outputs live.
mod layout;
pub use layout::{CatalogLayout, InputRole};

/// A single unit of work and its resolved inputs.
mod item;
pub use item::{InputRef, WorkItem};

/// Ordered stage descriptors and argument templates.
mod stage;
pub use stage::{Pipeline, Stage, Step, Vars};

/// The fixed diffusion preprocessing layout and stage list.
pub mod dti;

/// Placeholder for the item's work directory in stage templates.
pub const OUT_VAR: &str = "out";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown placeholder \"{{{0}}}\" in \"{1}\"")]
    UnknownPlaceholder(String, String),
    #[error("Unterminated placeholder in \"{0}\"")]
    Unterminated(String),
}

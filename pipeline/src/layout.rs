use std::path::{Path, PathBuf};

use crate::{InputRef, WorkItem};

/// One logical input of a work item, e.g. the AP-encoded diffusion series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRole {
    /// Role name, also usable as a `{placeholder}` in stage templates.
    pub name: &'static str,
    /// Human-readable label used in discovery diagnostics.
    pub label: &'static str,
    /// Subdirectory under `<item>/<session>/`.
    pub category: &'static str,
    /// File name suffix after `<item>_<session>_`.
    pub suffix: &'static str,
    /// Required roles gate discovery; the others are only staged and consumed.
    pub required: bool,
}

/// Fixed path template for items in a catalog:
/// `<root>/<item>/<session>/<category>/<item>_<session>_<suffix>`.
#[derive(Debug, Clone)]
pub struct CatalogLayout {
    /// Catalog entries whose names start with this are candidate items.
    pub item_prefix: &'static str,
    pub roles: Vec<InputRole>,
    /// File inside `<done_root>/<item>_<session>/` whose presence means the item is done.
    pub output_target: &'static str,
}

impl CatalogLayout {
    /// $CATALOG/item/session/category/item_session_suffix
    pub fn input_path(&self, root: &Path, item: &str, session: &str, role: &InputRole) -> PathBuf {
        let mut path = PathBuf::with_capacity(256);
        path.push(root);
        path.push(item);
        path.push(session);
        path.push(role.category);
        path.push(format!("{item}_{session}_{}", role.suffix));
        path
    }

    /// item_session
    pub fn item_dir_name(&self, item: &str, session: &str) -> String {
        format!("{item}_{session}")
    }

    /// $DONE/item_session/<output target>
    pub fn output_target(&self, done_root: &Path, item: &str, session: &str) -> PathBuf {
        let mut path = done_root.join(self.item_dir_name(item, session));
        path.push(self.output_target);
        path
    }

    pub fn required_roles(&self) -> impl Iterator<Item = &InputRole> {
        self.roles.iter().filter(|role| role.required)
    }

    pub fn is_candidate(&self, name: &str) -> bool {
        name.starts_with(self.item_prefix)
    }

    /// Bind every role of `item` to its canonical catalog path.
    pub fn resolve(&self, root: &Path, done_root: &Path, item: &str, session: &str) -> WorkItem {
        let inputs = self
            .roles
            .iter()
            .map(|role| {
                let canonical = self.input_path(root, item, session, role);
                InputRef {
                    role: role.name,
                    required: role.required,
                    local: canonical.clone(),
                    canonical,
                }
            })
            .collect();
        WorkItem {
            id: item.to_owned(),
            session: session.to_owned(),
            inputs,
            output_target: self.output_target(done_root, item, session),
        }
    }
}

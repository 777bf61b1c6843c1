use std::io;
use std::path::PathBuf;

use colored::Colorize;

use pipeline::{CatalogLayout, WorkItem};

use crate::fs::Fs;
use crate::remote::{self, Remote};
use crate::settings::RunConfig;

/// Generating and parsing the one-round-trip remote catalog scan
mod remote_scan;
pub use remote_scan::{parse_scan_output, scan_script};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog {0:?} not found locally and no remote host configured")]
    CatalogMissing(PathBuf),
    #[error("unable to read catalog {0:?}")]
    CatalogUnreadable(PathBuf, #[source] io::Error),
    #[error("remote catalog scan on {0} failed")]
    RemoteScan(String, #[source] remote::Error),
}

/// How one catalog entry fared against the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Every required input present and no output yet.
    Eligible,
    /// Every required input present, but the output target already exists.
    OutputExists,
    /// Some required inputs absent; holds their labels.
    MissingSome(Vec<String>),
    /// No required input present, most likely a different session.
    MissingAll,
}

/// Finds the items that still need processing.
pub struct Discovery<'a> {
    config: &'a RunConfig,
    fs: &'a Fs,
    layout: &'a CatalogLayout,
    remote: &'a dyn Remote,
}

impl<'a> Discovery<'a> {
    pub fn new(
        config: &'a RunConfig,
        fs: &'a Fs,
        layout: &'a CatalogLayout,
        remote: &'a dyn Remote,
    ) -> Self {
        Self {
            config,
            fs,
            layout,
            remote,
        }
    }

    /// Eligible items, in catalog order (sorted by name).
    pub fn discover(&self) -> Result<Vec<WorkItem>, Error> {
        let config = self.config;
        let candidates = match (self.scan_local(), &config.remote) {
            (Ok(candidates), _) => candidates,
            (Err(e), Some(host)) => {
                log::info!(
                    "Catalog {:?} not readable locally; scanning {host} instead",
                    config.catalog
                );
                log::debug!("{e:?}");
                self.scan_remote(host)?
            }
            (Err(e), None) => return Err(e),
        };

        let total = candidates.len();
        let items: Vec<WorkItem> = candidates
            .into_iter()
            .filter_map(|(id, candidate)| {
                log_candidate(&id, &candidate);
                (candidate == Candidate::Eligible).then(|| {
                    self.layout
                        .resolve(&config.catalog, &config.done, &id, &config.session)
                })
            })
            .collect();

        log::info!("Found {} of {total} candidates to process", items.len());
        Ok(items)
    }

    /// Classify a single item against the local catalog.
    pub fn classify(&self, id: &str) -> Candidate {
        let config = self.config;
        let missing: Vec<String> = self
            .layout
            .required_roles()
            .filter(|role| {
                let path = self
                    .layout
                    .input_path(&config.catalog, id, &config.session, role);
                !self.fs.exists(path)
            })
            .map(|role| role.label.to_owned())
            .collect();

        if missing.is_empty() {
            let target = self.layout.output_target(&config.done, id, &config.session);
            if self.fs.exists(target) {
                Candidate::OutputExists
            } else {
                Candidate::Eligible
            }
        } else if missing.len() == self.layout.required_roles().count() {
            Candidate::MissingAll
        } else {
            Candidate::MissingSome(missing)
        }
    }

    fn scan_local(&self) -> Result<Vec<(String, Candidate)>, Error> {
        let catalog = &self.config.catalog;
        let unreadable = |e| Error::CatalogUnreadable(catalog.clone(), e);

        let entries = self.fs.read_dir(catalog).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::CatalogMissing(catalog.clone()),
            _ => unreadable(e),
        })?;

        let mut ids = Vec::with_capacity(256);
        for entry in entries {
            let entry = entry.map_err(unreadable)?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                log::warn!("Skipping non-UTF-8 catalog entry {:?}", entry.path());
                continue;
            };
            if self.layout.is_candidate(&name) && self.fs.is_dir(entry.path()) {
                ids.push(name);
            }
        }
        ids.sort_unstable();

        log::info!("Scanning {} candidates in {:?}", ids.len(), catalog);
        Ok(ids
            .into_iter()
            .map(|id| {
                let candidate = self.classify(&id);
                (id, candidate)
            })
            .collect())
    }

    fn scan_remote(&self, host: &str) -> Result<Vec<(String, Candidate)>, Error> {
        let config = self.config;
        let script = scan_script(self.layout, &config.catalog, &config.done, &config.session);
        let output = self
            .remote
            .exec(host, &script)
            .map_err(|e| Error::RemoteScan(host.to_owned(), e))?;
        Ok(parse_scan_output(&output))
    }
}

fn log_candidate(id: &str, candidate: &Candidate) {
    match candidate {
        Candidate::Eligible => log::debug!("{id}: eligible"),
        Candidate::OutputExists => log::debug!("Skipping {id}: output already exists"),
        Candidate::MissingAll => log::debug!("Skipping {id}: missing all inputs"),
        Candidate::MissingSome(labels) => log::warn!(
            "Skipping {}: missing inputs [{}]",
            id.yellow(),
            labels.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::DirRemote;
    use anyhow::Result;
    use pipeline::dti;
    use std::path::Path;
    use tempfile::tempdir;

    /// Create the required inputs of `item`, leaving out the roles named in `skip`.
    fn populate(
        config: &RunConfig,
        layout: &CatalogLayout,
        item: &str,
        skip: &[&str],
    ) -> Result<()> {
        std::fs::create_dir_all(config.catalog.join(item))?;
        for role in layout.required_roles() {
            if skip.contains(&role.name) {
                continue;
            }
            let path = layout.input_path(&config.catalog, item, &config.session, role);
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(&path, "")?;
        }
        Ok(())
    }

    fn ids(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    fn setup(root: &Path) -> (RunConfig, CatalogLayout) {
        (RunConfig::for_tests(root), dti::layout())
    }

    #[test]
    fn test_partial_inputs_are_excluded() -> Result<()> {
        let dir = tempdir()?;
        let (config, layout) = setup(dir.path());
        populate(&config, &layout, "sub-X", &[])?;
        populate(&config, &layout, "sub-Y", &["t1w"])?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let discovery = Discovery::new(&config, &fs, &layout, &remote);

        let items = discovery.discover()?;
        assert_eq!(ids(&items), ["sub-X"]);
        assert_eq!(
            discovery.classify("sub-Y"),
            Candidate::MissingSome(vec!["T1w".to_owned()])
        );
        for input in items[0].required_inputs() {
            assert!(input.canonical.exists());
        }
        assert!(!items[0].output_target.exists());
        Ok(())
    }

    #[test]
    fn test_existing_output_is_excluded() -> Result<()> {
        let dir = tempdir()?;
        let (config, layout) = setup(dir.path());
        populate(&config, &layout, "sub-X", &[])?;
        let target = layout.output_target(&config.done, "sub-X", &config.session);
        std::fs::create_dir_all(target.parent().unwrap())?;
        std::fs::write(&target, "")?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let discovery = Discovery::new(&config, &fs, &layout, &remote);

        assert!(discovery.discover()?.is_empty());
        assert_eq!(discovery.classify("sub-X"), Candidate::OutputExists);
        Ok(())
    }

    #[test]
    fn test_discovery_is_repeatable_and_ordered() -> Result<()> {
        let dir = tempdir()?;
        let (config, layout) = setup(dir.path());
        for item in ["sub-03", "sub-01", "sub-02"] {
            populate(&config, &layout, item, &[])?;
        }
        let all: Vec<&str> = layout.required_roles().map(|r| r.name).collect();
        populate(&config, &layout, "sub-04", &all)?;
        std::fs::create_dir_all(config.catalog.join("derivatives"))?;
        std::fs::write(config.catalog.join("sub-05"), "not a directory")?;

        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();
        let discovery = Discovery::new(&config, &fs, &layout, &remote);

        let first = discovery.discover()?;
        let second = discovery.discover()?;
        assert_eq!(ids(&first), ["sub-01", "sub-02", "sub-03"]);
        assert_eq!(first, second);
        assert_eq!(discovery.classify("sub-04"), Candidate::MissingAll);
        Ok(())
    }

    #[test]
    fn test_missing_catalog_without_remote_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let (config, layout) = setup(dir.path());
        let fs = Fs::new(&config, false);
        let remote = DirRemote::default();

        let err = Discovery::new(&config, &fs, &layout, &remote)
            .discover()
            .unwrap_err();
        assert!(matches!(err, Error::CatalogMissing(_)));
        assert_eq!(remote.scripts.get(), 0);
        Ok(())
    }

    #[test]
    fn test_unreadable_catalog_falls_back_to_remote() -> Result<()> {
        let dir = tempdir()?;
        let (mut config, layout) = setup(dir.path());
        std::fs::write(&config.catalog, "not a directory")?;
        let fs = Fs::new(&config, false);
        let remote = DirRemote {
            scan_output: "FOUND:sub-1\n".to_owned(),
            ..Default::default()
        };

        let err = Discovery::new(&config, &fs, &layout, &remote)
            .discover()
            .unwrap_err();
        assert!(matches!(err, Error::CatalogUnreadable(..)));
        assert_eq!(remote.scripts.get(), 0);

        config.remote = Some("user@host".to_owned());
        let items = Discovery::new(&config, &fs, &layout, &remote).discover()?;
        assert_eq!(ids(&items), ["sub-1"]);
        assert_eq!(remote.scripts.get(), 1);
        Ok(())
    }

    #[test]
    fn test_missing_catalog_falls_back_to_one_remote_scan() -> Result<()> {
        let dir = tempdir()?;
        let (mut config, layout) = setup(dir.path());
        config.remote = Some("user@host".to_owned());
        let fs = Fs::new(&config, false);
        let remote = DirRemote {
            scan_output: "FOUND:sub-1\nEXIST:sub-2\nMISSING:sub-3:T1w\nSKIP_ALL:sub-4\nFOUND:sub-5\n"
                .to_owned(),
            ..Default::default()
        };

        let items = Discovery::new(&config, &fs, &layout, &remote).discover()?;
        assert_eq!(ids(&items), ["sub-1", "sub-5"]);
        assert_eq!(remote.scripts.get(), 1);
        assert!(items[0].inputs[0].canonical.starts_with(&config.catalog));
        Ok(())
    }
}

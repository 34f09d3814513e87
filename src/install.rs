// src/install.rs

//! Package installation
//!
//! Each requested target goes through: skip-if-installed, acquire (fetch and
//! verify), apply (extract onto the root), ledger update, dependency
//! expansion, and post-install scripts. Targets are isolated from each other:
//! a failed target is reported and the next one proceeds. Dependencies are
//! best-effort: a dependency that cannot be installed is recorded on the
//! requesting package's outcome but does not fail it. Integrity failures are
//! the exception and stop the whole run.

use crate::archive;
use crate::catalog::{CatalogStore, PackageRecord};
use crate::config::Layout;
use crate::error::{Error, Result};
use crate::ledger::{LedgerEntry, LedgerStore};
use crate::repository::{Fetcher, Transport};
use crate::scripts;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Switches that change how targets are installed
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Reinstall targets that are already in the ledger
    pub upgrade: bool,
    /// Do not pull in required packages
    pub no_deps: bool,
    /// Do not run post-install scripts
    pub no_scripts: bool,
}

/// A dependency that could not be installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyFailure {
    pub name: String,
    pub required_by: String,
    pub reason: String,
}

/// Terminal state of a target that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Skipped,
    Installed {
        archive: String,
        dependencies: Vec<String>,
        failed_dependencies: Vec<DependencyFailure>,
    },
}

/// Result for one requested target
#[derive(Debug)]
pub struct TargetReport<T> {
    pub name: String,
    pub result: Result<T>,
}

impl<T> TargetReport<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct InstallEngine<'a, T: Transport> {
    catalog: &'a CatalogStore,
    fetcher: &'a Fetcher<T>,
    ledger: &'a LedgerStore,
    layout: &'a Layout,
    options: InstallOptions,
}

impl<'a, T: Transport> InstallEngine<'a, T> {
    pub fn new(
        catalog: &'a CatalogStore,
        fetcher: &'a Fetcher<T>,
        ledger: &'a LedgerStore,
        layout: &'a Layout,
        options: InstallOptions,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            ledger,
            layout,
            options,
        }
    }

    /// Install `targets` strictly in the order given
    pub fn install(&self, targets: &[String]) -> Result<Vec<TargetReport<InstallOutcome>>> {
        let mut reports = Vec::with_capacity(targets.len());
        for name in targets {
            let result = self.install_one(name, !self.options.no_scripts);
            match result {
                Err(e) if e.aborts_run() => return Err(e),
                Err(ref e) => warn!("Failed to install {}: {}", name, e),
                Ok(_) => {}
            }
            reports.push(TargetReport {
                name: name.clone(),
                result,
            });
        }
        Ok(reports)
    }

    /// Fetch and verify `targets` into the cache without installing them
    pub fn download(&self, targets: &[String]) -> Result<Vec<TargetReport<PathBuf>>> {
        let mut reports = Vec::with_capacity(targets.len());
        for name in targets {
            let result = self
                .catalog
                .resolve(name)
                .and_then(|record| self.fetcher.ensure_cached(record));
            match result {
                Err(e) if e.aborts_run() => return Err(e),
                Err(ref e) => warn!("Failed to download {}: {}", name, e),
                Ok(ref path) => info!("Downloaded {} to {}", name, path.display()),
            }
            reports.push(TargetReport {
                name: name.clone(),
                result,
            });
        }
        Ok(reports)
    }

    fn install_one(&self, name: &str, run_scripts: bool) -> Result<InstallOutcome> {
        if !self.options.upgrade && self.ledger.load()?.contains(name) {
            info!("Package {} is already installed, skipping", name);
            return Ok(InstallOutcome::Skipped);
        }

        let record = self.catalog.resolve(name)?;
        let archive_path = self.fetcher.ensure_cached(record)?;

        info!("Installing {}", name);
        let bytes = fs::read(&archive_path)?;
        archive::extract(&bytes, self.layout.root())?;

        self.ledger
            .insert(LedgerEntry::new(&record.name, &record.archive_name))?;
        debug!("Recorded {} ({}) in ledger", record.name, record.archive_name);

        let (dependencies, failed_dependencies) = if self.options.no_deps {
            (Vec::new(), Vec::new())
        } else {
            self.install_requirements(record)?
        };

        if run_scripts {
            scripts::run_postinstall(self.layout)?;
        }

        info!("Package {} installed", name);
        Ok(InstallOutcome::Installed {
            archive: record.archive_name.clone(),
            dependencies,
            failed_dependencies,
        })
    }

    /// Install what the freshly installed `record` itself declares it needs
    fn install_requirements(
        &self,
        record: &PackageRecord,
    ) -> Result<(Vec<String>, Vec<DependencyFailure>)> {
        let mut installed = Vec::new();
        let mut failed = Vec::new();

        for dep in &record.requires {
            if self.ledger.load()?.contains(dep) {
                continue;
            }
            info!("{} requires {}, installing", record.name, dep);
            match self.install_one(dep, false) {
                Ok(InstallOutcome::Installed {
                    dependencies,
                    failed_dependencies,
                    ..
                }) => {
                    installed.push(dep.clone());
                    installed.extend(dependencies);
                    failed.extend(failed_dependencies);
                }
                Ok(InstallOutcome::Skipped) => {}
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!("Dependency {} of {} not installed: {}", dep, record.name, e);
                    failed.push(DependencyFailure {
                        name: dep.clone(),
                        required_by: record.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok((installed, failed))
    }
}

/// Overall exit status for a batch of target reports
pub fn exit_code<T>(reports: &[TargetReport<T>]) -> i32 {
    reports
        .iter()
        .find_map(|r| r.result.as_ref().err().map(Error::exit_code))
        .unwrap_or(0)
}

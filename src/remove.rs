// src/remove.rs

//! Guarded package removal
//!
//! Before anything is deleted, the package's manifest is checked against the
//! essential set: every file owned by the packages that provide the tools
//! Pakt and its maintainer scripts rely on. The set is recomputed for every
//! package because the owning packages can change between runs. Files are
//! deleted first, then any manifest directories that ended up empty.

use crate::config::Layout;
use crate::error::{Error, Result};
use crate::install::TargetReport;
use crate::ledger::LedgerStore;
use crate::manifest::{ManifestStore, normalize, within_root};
use crate::scripts;
use std::collections::{HashMap, HashSet};
use std::fs;
use tracing::{debug, info, warn};

/// Tools whose owning packages must never lose files
pub const ESSENTIAL_TOOLS: &[&str] = &[
    "usr/bin/sh",
    "usr/bin/bash",
    "usr/bin/dash",
    "usr/bin/env",
    "usr/bin/mv",
    "usr/bin/rm",
    "usr/bin/cygwin1.dll",
];

/// Terminal state of a target that was not blocked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    NotInstalled,
    Removed { files: usize, directories: usize },
}

pub struct RemoveEngine<'a> {
    layout: &'a Layout,
    ledger: &'a LedgerStore,
    manifests: &'a ManifestStore,
    essential_tools: Vec<String>,
}

impl<'a> RemoveEngine<'a> {
    pub fn new(layout: &'a Layout, ledger: &'a LedgerStore, manifests: &'a ManifestStore) -> Self {
        Self {
            layout,
            ledger,
            manifests,
            essential_tools: ESSENTIAL_TOOLS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Replace the list of essential tool paths
    pub fn with_essential_tools(mut self, tools: Vec<String>) -> Self {
        self.essential_tools = tools;
        self
    }

    /// Essential file paths mapped to the package that owns them
    ///
    /// Each installed manifest is read once; a package that lists any of the
    /// tool paths contributes all of its files.
    pub fn essential_set(&self) -> Result<HashMap<String, String>> {
        let ledger = self.ledger.load()?;
        let tools: HashSet<String> = self
            .essential_tools
            .iter()
            .flat_map(|tool| [normalize(tool).to_string(), format!("{}.exe", normalize(tool))])
            .collect();

        let mut essential = HashMap::new();
        for entry in ledger.entries() {
            if !self.manifests.exists(&entry.name) {
                continue;
            }
            let manifest = self.manifests.read(&entry.name)?;
            if !manifest.iter().any(|p| tools.contains(normalize(p))) {
                continue;
            }
            debug!("{} provides essential tooling", entry.name);
            for path in manifest.iter().filter(|p| !p.ends_with('/')) {
                essential
                    .entry(normalize(path).to_string())
                    .or_insert_with(|| entry.name.clone());
            }
        }
        debug!("Essential set holds {} files", essential.len());
        Ok(essential)
    }

    /// Remove `targets` in order
    ///
    /// A missing manifest or an essential-file conflict stops the whole run.
    /// Any other failure is reported for its target and the next one proceeds.
    pub fn remove(&self, targets: &[String]) -> Result<Vec<TargetReport<RemoveOutcome>>> {
        let mut reports = Vec::with_capacity(targets.len());
        for name in targets {
            let result = self.remove_one(name);
            match result {
                Err(e) if e.aborts_run() => return Err(e),
                Err(ref e) => warn!("Failed to remove {}: {}", name, e),
                Ok(_) => {}
            }
            reports.push(TargetReport {
                name: name.clone(),
                result,
            });
        }
        Ok(reports)
    }

    fn remove_one(&self, name: &str) -> Result<RemoveOutcome> {
        if !self.ledger.load()?.contains(name) {
            info!("Package {} is not installed, skipping", name);
            return Ok(RemoveOutcome::NotInstalled);
        }
        if !self.manifests.exists(name) {
            return Err(Error::ManifestMissing(name.to_string()));
        }

        let manifest = self.manifests.read(name)?;
        let essential = self.essential_set()?;
        for path in manifest.iter().filter(|p| !p.ends_with('/')) {
            if let Some(owner) = essential.get(normalize(path)) {
                return Err(Error::EssentialFileConflict {
                    package: name.to_string(),
                    path: path.clone(),
                    owner: owner.clone(),
                });
            }
        }

        info!("Removing {}", name);
        scripts::run_preremove(self.layout, name)?;

        let root = self.layout.root();
        let mut files = 0;
        for path in manifest.iter().filter(|p| !p.ends_with('/')) {
            if !within_root(path) {
                warn!("Ignoring manifest entry {} of {} outside the root", path, name);
                continue;
            }
            let full = root.join(normalize(path));
            match fs::symlink_metadata(&full) {
                Ok(meta) if !meta.is_dir() => {
                    fs::remove_file(&full)?;
                    files += 1;
                }
                _ => debug!("{} already gone", full.display()),
            }
        }

        let mut dirs: Vec<&str> = manifest
            .iter()
            .filter(|p| p.ends_with('/'))
            .filter(|p| within_root(p))
            .map(|p| normalize(p).trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .collect();
        // Deepest first so nested empty directories collapse
        dirs.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));

        let mut directories = 0;
        for dir in dirs {
            let full = root.join(dir);
            if !full.is_dir() {
                continue;
            }
            match fs::remove_dir(&full) {
                Ok(()) => directories += 1,
                Err(_) => debug!("Leaving non-empty directory {}", full.display()),
            }
        }

        self.manifests.remove(name)?;
        let marker = scripts::postinstall_marker(self.layout, name);
        if marker.exists() {
            fs::remove_file(&marker)?;
        }
        if !self.ledger.remove(name)? {
            warn!("{} vanished from the ledger during removal", name);
        }

        info!("Package {} removed ({} files, {} directories)", name, files, directories);
        Ok(RemoveOutcome::Removed { files, directories })
    }
}

// src/manifest.rs

//! Per-package file manifests
//!
//! A manifest is the gzip-compressed, newline-delimited list of archive
//! entries a package placed under the install root. Directory entries end
//! with `/`. Manifests are written when an archive enters the cache, so
//! their existence says nothing about whether the package is installed;
//! the ledger alone decides that.

use crate::error::{Error, Result};
use crate::ledger::InstalledLedger;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lst.gz", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn write(&self, name: &str, entries: &[String]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for entry in entries {
            writeln!(encoder, "{}", entry)?;
        }
        fs::write(self.path(name), encoder.finish()?)?;
        debug!("Wrote manifest for {} ({} entries)", name, entries.len());
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<Vec<String>> {
        let path = self.path(name);
        if !path.exists() {
            return Err(Error::ManifestMissing(name.to_string()));
        }
        let compressed = fs::read(&path)?;
        let mut text = String::new();
        GzDecoder::new(compressed.as_slice()).read_to_string(&mut text)?;
        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path(name);
        if path.exists() {
            fs::remove_file(path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Installed package whose manifest lists `path`
    ///
    /// Only ledger entries are consulted; a stray manifest for a package
    /// that is not installed owns nothing.
    pub fn owner_of(&self, ledger: &InstalledLedger, path: &str) -> Result<Option<String>> {
        let wanted = normalize(path);
        for entry in ledger.entries() {
            if !self.exists(&entry.name) {
                continue;
            }
            if self.read(&entry.name)?.iter().any(|p| normalize(p) == wanted) {
                return Ok(Some(entry.name.clone()));
            }
        }
        Ok(None)
    }
}

/// Compare paths without leading `/` or `./`
pub fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Whether a manifest entry stays under the install root once joined onto it
pub fn within_root(path: &str) -> bool {
    !Path::new(normalize(path))
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerEntry;
    use tempfile::TempDir;

    fn entries(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_write_read() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        store.write("bash", &entries(&["usr/", "usr/bin/", "usr/bin/bash"])).unwrap();
        assert!(store.exists("bash"));
        assert!(store.path("bash").ends_with("bash.lst.gz"));
        assert_eq!(store.read("bash").unwrap(), vec!["usr/", "usr/bin/", "usr/bin/bash"]);

        assert!(store.remove("bash").unwrap());
        assert!(!store.remove("bash").unwrap());
        assert!(matches!(store.read("bash"), Err(Error::ManifestMissing(_))));
    }

    #[test]
    fn test_owner_of_only_considers_installed() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        store.write("bash", &entries(&["usr/bin/bash"])).unwrap();
        store.write("stray", &entries(&["usr/bin/stray"])).unwrap();

        let mut ledger = InstalledLedger::default();
        ledger.insert(LedgerEntry::new("bash", "bash-5.2.tar.xz"));

        assert_eq!(store.owner_of(&ledger, "/usr/bin/bash").unwrap().as_deref(), Some("bash"));
        assert_eq!(store.owner_of(&ledger, "usr/bin/stray").unwrap(), None);
    }

    #[test]
    fn test_within_root() {
        assert!(within_root("usr/bin/bash"));
        assert!(within_root("/usr/share/doc/"));
        assert!(within_root("./etc/postinstall/foo.sh"));
        assert!(!within_root("../etc/passwd"));
        assert!(!within_root("usr/../../etc/passwd"));
    }
}

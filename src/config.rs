// src/config.rs

//! On-disk layout and persisted settings
//!
//! Everything Pakt persists lives under the install root:
//! - `etc/setup/installed.db` - the installed-package ledger
//! - `etc/setup/<name>.lst.gz` - per-package file manifests
//! - `etc/setup/setup.rc` - mirror and cache settings
//! - `etc/postinstall`, `etc/preremove` - maintainer scripts

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Settings key holding the mirror URL
pub const MIRROR_KEY: &str = "last-mirror";

/// Settings key holding the cache directory
pub const CACHE_KEY: &str = "last-cache";

/// Default package architecture
pub const DEFAULT_ARCH: &str = "x86_64";

/// Paths of every persisted artifact, relative to one install root
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn setup_dir(&self) -> PathBuf {
        self.root.join("etc/setup")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.setup_dir().join("installed.db")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.setup_dir().join("setup.rc")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.setup_dir()
    }

    pub fn postinstall_dir(&self) -> PathBuf {
        self.root.join("etc/postinstall")
    }

    pub fn preremove_dir(&self) -> PathBuf {
        self.root.join("etc/preremove")
    }
}

/// Key/value settings stored as a key line followed by an indented value line
///
/// ```text
/// last-cache
/// 	/var/cache/pakt
/// last-mirror
/// 	https://mirrors.kernel.org/sourceware/cygwin/
/// ```
pub struct Settings {
    path: PathBuf,
}

impl Settings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_layout(layout: &Layout) -> Self {
        Self::new(layout.settings_path())
    }

    /// Write a skeleton settings file carrying every known key marker
    ///
    /// Existing files are left alone.
    pub fn init(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n\t\n{}\n\t\n", CACHE_KEY, MIRROR_KEY))?;
        info!("Created settings file {}", self.path.display());
        Ok(true)
    }

    /// Read the value line following `key`
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let mut lines = content.lines();
        while let Some(line) = lines.next() {
            if line.trim_end() == key {
                let value = lines.next().map(str::trim).unwrap_or_default();
                return Ok((!value.is_empty()).then(|| value.to_string()));
            }
        }
        Ok(None)
    }

    /// Rewrite the value line following an existing `key` marker
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {}", self.path.display(), e))
        })?;

        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let marker = lines
            .iter()
            .position(|l| l.trim_end() == key)
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "Key '{}' not present in {}",
                    key,
                    self.path.display()
                ))
            })?;

        let value_line = format!("\t{}", value);
        if marker + 1 < lines.len() {
            lines[marker + 1] = value_line;
        } else {
            lines.push(value_line);
        }

        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(&self.path, out)?;
        debug!("Set {} = {}", key, value);
        Ok(())
    }

    pub fn get_mirror(&self) -> Result<Option<String>> {
        self.get(MIRROR_KEY)
    }

    pub fn set_mirror(&self, url: &str) -> Result<()> {
        self.set(MIRROR_KEY, url)
    }

    pub fn get_cache_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self.get(CACHE_KEY)?.map(PathBuf::from))
    }

    pub fn set_cache_dir(&self, dir: &Path) -> Result<()> {
        self.set(CACHE_KEY, &dir.to_string_lossy())
    }
}

// src/ledger.rs

//! Installed-package ledger
//!
//! The ledger is a text file: one header line, then one
//! `<name> <archive> <status>` line per installed package, sorted by name.
//!
//! ```text
//! INSTALLED.DB 3
//! bash bash-5.2.21-1.tar.xz 0
//! coreutils coreutils-9.0-1.tar.xz 0
//! ```

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Header written into a freshly created ledger
pub const LEDGER_HEADER: &str = "INSTALLED.DB 3";

const HEADER_MAGIC: &str = "INSTALLED.DB";

/// One installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    pub archive: String,
    pub status: u32,
}

impl LedgerEntry {
    pub fn new(name: impl Into<String>, archive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archive: archive.into(),
            status: 0,
        }
    }
}

/// In-memory ledger, kept sorted by package name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledLedger {
    header: String,
    entries: Vec<LedgerEntry>,
}

impl Default for InstalledLedger {
    fn default() -> Self {
        Self {
            header: LEDGER_HEADER.to_string(),
            entries: Vec::new(),
        }
    }
}

impl InstalledLedger {
    /// Parse ledger text
    ///
    /// An empty file gets the current header. A file whose first line is
    /// not an `INSTALLED.DB` header is read as headerless, so that line is
    /// kept as an entry.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().peekable();
        let first = lines.peek().map(|(_, line)| line.trim_end().to_string());
        let header = match first {
            Some(line) if line.starts_with(HEADER_MAGIC) => {
                lines.next();
                line
            }
            Some(line) if !line.trim().is_empty() => {
                warn!("Ledger has no header, assuming {:?}", LEDGER_HEADER);
                LEDGER_HEADER.to_string()
            }
            _ => LEDGER_HEADER.to_string(),
        };
        let mut entries = Vec::new();

        for (number, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let (Some(name), Some(archive)) = (tokens.next(), tokens.next()) else {
                return Err(Error::ParseError(format!(
                    "Malformed ledger line {}: {:?}",
                    number + 1,
                    line
                )));
            };
            let status = tokens.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            entries.push(LedgerEntry {
                name: name.to_string(),
                archive: archive.to_string(),
                status,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.dedup_by(|later, earlier| later.name == earlier.name);
        Ok(Self { header, entries })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.header);
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!("{} {} {}\n", entry.name, entry.archive, entry.status));
        }
        out
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.position(name).ok().map(|i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Insert in sorted position, replacing an entry of the same name
    pub fn insert(&mut self, entry: LedgerEntry) {
        match self.position(&entry.name) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Remove exactly the entry named `name`
    pub fn remove(&mut self, name: &str) -> Option<LedgerEntry> {
        self.position(name).ok().map(|i| self.entries.remove(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
    }
}

/// Ledger file with backup-before-write semantics
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the ledger taken before the most recent rewrite
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Create an empty ledger if none exists
    pub fn init(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.write(&InstalledLedger::default())?;
        info!("Created ledger {}", self.path.display());
        Ok(true)
    }

    /// Load the ledger; a missing file is an empty ledger
    pub fn load(&self) -> Result<InstalledLedger> {
        if !self.path.exists() {
            return Ok(InstalledLedger::default());
        }
        InstalledLedger::parse(&fs::read_to_string(&self.path)?)
    }

    /// Back up the current file, then atomically replace it
    pub fn save(&self, ledger: &InstalledLedger) -> Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        self.write(ledger)?;
        debug!("Saved ledger with {} entries", ledger.len());
        Ok(())
    }

    fn write(&self, ledger: &InstalledLedger) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(ledger.render().as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Insert one entry and save
    pub fn insert(&self, entry: LedgerEntry) -> Result<()> {
        let mut ledger = self.load()?;
        ledger.insert(entry);
        self.save(&ledger)
    }

    /// Remove one entry and save; returns whether it was present
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut ledger = self.load()?;
        if ledger.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&ledger)?;
        Ok(true)
    }
}

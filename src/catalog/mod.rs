// src/catalog/mod.rs

//! Remote package catalog
//!
//! Parses setup.ini style catalogs into [`PackageRecord`]s. A catalog is a
//! header of `key: value` lines followed by records, each opened by an
//! `@ <name>` line:
//!
//! ```text
//! setup-timestamp: 1700000000
//!
//! @ bash
//! sdesc: "The GNU Bourne Again SHell"
//! category: Base Shells
//! requires: cygwin libiconv2
//! version: 5.2.21-1
//! install: x86_64/release/bash/bash-5.2.21-1.tar.xz 1508348 <sha512>
//! [prev]
//! install: x86_64/release/bash/bash-5.2.15-3.tar.xz 1498120 <sha512>
//! ```
//!
//! Catalogs list the newest archive first, so the first `install:` line of a
//! record is authoritative, and the first record with a given name wins.

pub mod graph;

use crate::error::{Error, Result};
use crate::repository::{CacheStore, Transport, mirror_url};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};
use xz2::read::XzDecoder;

pub use graph::DependencyGraph;

const RECORD_MARKER: &str = "@ ";

/// One installable package as described by the catalog
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub summary: Option<String>,
    pub version: Option<String>,
    pub category: Vec<String>,
    pub requires: Vec<String>,
    /// Archive path relative to the mirror root
    pub install_path: String,
    pub archive_name: String,
    pub size: u64,
    pub digest: String,
    /// Raw record text, kept for display
    pub description: String,
}

/// Catalog-wide metadata from the lines before the first record
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogHeader {
    pub release: Option<String>,
    pub arch: Option<String>,
    pub setup_version: Option<String>,
    pub timestamp: Option<i64>,
}

impl CatalogHeader {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Parsed catalog, owned for the duration of one invocation
pub struct CatalogStore {
    header: CatalogHeader,
    records: Vec<PackageRecord>,
    index: HashMap<String, usize>,
    graph: OnceCell<DependencyGraph>,
}

impl CatalogStore {
    /// Parse raw catalog text
    pub fn load(text: &str) -> Result<Self> {
        let mut header = CatalogHeader::default();
        let mut records = Vec::new();
        let mut index = HashMap::new();

        let mut blocks = split_records(text);
        if let Some(preamble) = blocks.next() {
            parse_header(preamble, &mut header);
        }

        for block in blocks {
            let record = parse_record(block)?;
            if index.contains_key(&record.name) {
                debug!("Ignoring later duplicate record for {}", record.name);
            } else {
                index.insert(record.name.clone(), records.len());
            }
            records.push(record);
        }

        debug!("Loaded catalog with {} records", records.len());
        Ok(Self {
            header,
            records,
            index,
            graph: OnceCell::new(),
        })
    }

    /// Load the locally cached catalog copy, refreshing it first if asked
    pub fn open<T: Transport>(
        cache: &CacheStore,
        transport: &T,
        mirror: &str,
        arch: &str,
        refresh: bool,
    ) -> Result<Self> {
        let path = cache.catalog_path(mirror, arch);
        if refresh {
            Self::refresh(transport, mirror, arch, &path)?;
        }
        if !path.exists() {
            return Err(Error::CatalogUnavailable(path));
        }
        let text = fs::read_to_string(&path)?;
        Self::load(&text)
    }

    /// Download the catalog from the mirror into `dest`
    ///
    /// Prefers the xz-compressed `setup.xz`, falling back to `setup.ini`.
    pub fn refresh<T: Transport>(transport: &T, mirror: &str, arch: &str, dest: &Path) -> Result<()> {
        let xz_url = mirror_url(mirror, &format!("{}/setup.xz", arch));
        let text = match transport.fetch(&xz_url) {
            Ok(bytes) => {
                let mut text = String::new();
                XzDecoder::new(bytes.as_slice())
                    .read_to_string(&mut text)
                    .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", xz_url, e)))?;
                text
            }
            Err(e) => {
                warn!("{} unavailable ({}), falling back to setup.ini", xz_url, e);
                let ini_url = mirror_url(mirror, &format!("{}/setup.ini", arch));
                let bytes = transport.fetch(&ini_url)?;
                String::from_utf8(bytes)
                    .map_err(|e| Error::ParseError(format!("Catalog is not UTF-8: {}", e)))?
            }
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, text)?;
        info!("Catalog refreshed into {}", dest.display());
        Ok(())
    }

    pub fn header(&self) -> &CatalogHeader {
        &self.header
    }

    /// Look up the most current record for `name`
    pub fn lookup(&self, name: &str) -> Option<&PackageRecord> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// Like [`lookup`](Self::lookup) but a missing record is an error
    pub fn resolve(&self, name: &str) -> Result<&PackageRecord> {
        self.lookup(name)
            .ok_or_else(|| Error::PackageNotFound(name.to_string()))
    }

    /// Unique package records in catalog order
    pub fn packages(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(i, r)| self.index.get(&r.name) == Some(i))
            .map(|(_, r)| r)
    }

    /// Names whose category field contains `pattern` (case-sensitive)
    pub fn find_by_category(&self, pattern: &str) -> Vec<String> {
        self.packages()
            .filter(|r| r.category.join(" ").contains(pattern))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Names containing `pattern`, regardless of installed state
    pub fn search(&self, pattern: &str) -> Vec<String> {
        self.packages()
            .filter(|r| r.name.contains(pattern))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Dependency graph, built on first use
    pub fn graph(&self) -> &DependencyGraph {
        self.graph
            .get_or_init(|| DependencyGraph::build(self.packages()))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Split catalog text at record markers; the first block is the header
fn split_records(text: &str) -> impl Iterator<Item = &str> {
    let mut starts = vec![0];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with(RECORD_MARKER) {
            starts.push(offset);
        }
        offset += line.len();
    }
    starts.push(text.len());
    starts.dedup();

    let mut bounds: Vec<(usize, usize)> = starts.windows(2).map(|w| (w[0], w[1])).collect();
    // Keep an empty header slot when the text opens directly with a record
    if text.starts_with(RECORD_MARKER) {
        bounds.insert(0, (0, 0));
    }
    bounds.into_iter().map(move |(a, b)| &text[a..b])
}

fn parse_header(block: &str, header: &mut CatalogHeader) {
    for (key, value) in fields(block) {
        match key {
            "release" => header.release = Some(value.to_string()),
            "arch" => header.arch = Some(value.to_string()),
            "setup-version" => header.setup_version = Some(value.to_string()),
            "setup-timestamp" => header.timestamp = value.parse().ok(),
            _ => {}
        }
    }
}

fn parse_record(block: &str) -> Result<PackageRecord> {
    let first = block.lines().next().unwrap_or_default();
    let name = first
        .strip_prefix(RECORD_MARKER)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::ParseError(format!("Record without a name: {:?}", first)))?;

    let mut record = PackageRecord {
        name: name.to_string(),
        description: block.trim_end().to_string(),
        ..Default::default()
    };
    let mut requires: Option<Vec<String>> = None;
    let mut depends2: Option<Vec<String>> = None;
    let mut have_install = false;

    for (key, value) in fields(block) {
        match key {
            "sdesc" if record.summary.is_none() => {
                record.summary = Some(value.trim_matches('"').to_string());
            }
            "version" if record.version.is_none() => record.version = Some(value.to_string()),
            "category" if record.category.is_empty() => {
                record.category = value.split_whitespace().map(str::to_string).collect();
            }
            "requires" if requires.is_none() => {
                requires = Some(value.split_whitespace().map(str::to_string).collect());
            }
            "depends2" if depends2.is_none() => depends2 = Some(parse_depends2(value)),
            "install" if !have_install => {
                let mut tokens = value.split_whitespace();
                let (Some(path), Some(size), Some(digest)) =
                    (tokens.next(), tokens.next(), tokens.next())
                else {
                    return Err(Error::ParseError(format!(
                        "Malformed install line for {}: {}",
                        record.name, value
                    )));
                };
                record.install_path = path.to_string();
                record.archive_name = path.rsplit('/').next().unwrap_or(path).to_string();
                record.size = size.parse().map_err(|_| {
                    Error::ParseError(format!("Invalid size for {}: {}", record.name, size))
                })?;
                record.digest = digest.to_ascii_lowercase();
                have_install = true;
            }
            _ => {}
        }
    }

    record.requires = requires.or(depends2).unwrap_or_default();
    Ok(record)
}

/// `depends2: cygwin, libfoo1 (>= 1.2)` -> `["cygwin", "libfoo1"]`
fn parse_depends2(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|dep| dep.split_whitespace().next())
        .map(|name| name.split('(').next().unwrap_or(name).to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Yield `key: value` pairs, skipping continuation lines of quoted values
fn fields(block: &str) -> impl Iterator<Item = (&str, &str)> {
    let mut in_quote = false;
    block.lines().filter_map(move |line| {
        if in_quote {
            if line.contains('"') {
                in_quote = false;
            }
            return None;
        }
        let (key, value) = line.split_once(':')?;
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        let value = value.trim();
        if value.starts_with('"') && value.matches('"').count() == 1 {
            in_quote = true;
        }
        Some((key, value))
    })
}

// src/repository/mod.rs

//! Mirror access and the local archive cache
//!
//! This module provides functionality for:
//! - Fetching catalog and archive bytes from a mirror (HTTP or `file://`)
//! - Laying out cached archives per mirror
//! - Verifying archives against the catalog digest
//! - Recording each fetched archive's file manifest

pub mod digest;

use crate::archive;
use crate::catalog::PackageRecord;
use crate::error::{Error, Result};
use crate::manifest::ManifestStore;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use digest::DigestClass;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Retrieves the bytes behind a URL
pub trait Transport {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP client wrapper with retry support; `file://` URLs are read from disk
pub struct MirrorClient {
    client: Client,
    max_retries: u32,
}

impl MirrorClient {
    /// Create a new mirror client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::FetchError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::FetchError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let bytes = response
                        .bytes()
                        .map_err(|e| Error::FetchError(format!("Failed to read {}: {}", url, e)))?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::FetchError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Transport for MirrorClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        match url.strip_prefix("file://") {
            Some(path) => fs::read(path)
                .map_err(|e| Error::FetchError(format!("Failed to read {}: {}", url, e))),
            None => self.fetch_http(url),
        }
    }
}

/// Cache directory name for a mirror; distinct mirrors never collide
pub fn mirror_id(mirror: &str) -> String {
    urlencoding::encode(mirror).into_owned()
}

/// Join a mirror base URL and a catalog-relative path
pub fn mirror_url(mirror: &str, path: &str) -> String {
    format!(
        "{}/{}",
        mirror.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Content cache rooted at one directory, partitioned by mirror
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mirror_dir(&self, mirror: &str) -> PathBuf {
        self.root.join(mirror_id(mirror))
    }

    /// Local copy of the catalog for `arch`
    pub fn catalog_path(&self, mirror: &str, arch: &str) -> PathBuf {
        self.mirror_dir(mirror).join(arch).join("setup.ini")
    }

    /// Cached location of an archive named by its catalog install path
    pub fn archive_path(&self, mirror: &str, install_path: &str) -> PathBuf {
        self.mirror_dir(mirror)
            .join(install_path.trim_start_matches('/'))
    }
}

/// Brings archives into the cache and vouches for their integrity
pub struct Fetcher<T: Transport> {
    transport: T,
    mirror: String,
    cache: CacheStore,
    manifests: ManifestStore,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, mirror: String, cache: CacheStore, manifests: ManifestStore) -> Self {
        Self {
            transport,
            mirror,
            cache,
            manifests,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mirror(&self) -> &str {
        &self.mirror
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Return the path of a verified cached archive for `record`
    ///
    /// A cached file is reused only when its digest matches. Otherwise the
    /// archive is fetched again; a mismatch after fetching is an
    /// [`Error::IntegrityFailure`] and nothing is written to the cache.
    /// The package manifest is (re)written whenever it is absent.
    pub fn ensure_cached(&self, record: &PackageRecord) -> Result<PathBuf> {
        let class = DigestClass::for_declared(&record.name, &record.digest)?;
        if record.install_path.is_empty() {
            return Err(Error::FetchError(format!(
                "Package {} has no installable archive",
                record.name
            )));
        }

        let path = self.cache.archive_path(&self.mirror, &record.install_path);
        if path.exists() {
            let actual = class.digest_file(&path)?;
            if actual.eq_ignore_ascii_case(&record.digest) {
                debug!("Using cached {}", path.display());
                if !self.manifests.exists(&record.name) {
                    let bytes = fs::read(&path)?;
                    self.record_manifest(record, &bytes)?;
                }
                return Ok(path);
            }
            warn!(
                "Cached {} does not match catalog digest, fetching again",
                record.archive_name
            );
        }

        let url = mirror_url(&self.mirror, &record.install_path);
        info!("Downloading {}", url);
        let bytes = self.transport.fetch(&url)?;

        let actual = class.digest(&bytes);
        if !actual.eq_ignore_ascii_case(&record.digest) {
            if path.exists() {
                fs::remove_file(&path)?;
            }
            return Err(Error::IntegrityFailure {
                package: record.name.clone(),
                expected: record.digest.clone(),
                actual,
            });
        }
        debug!("Digest verified for {}", record.archive_name);

        store_atomically(&path, &bytes)?;
        self.record_manifest(record, &bytes)?;
        info!("Cached {}", path.display());
        Ok(path)
    }

    fn record_manifest(&self, record: &PackageRecord, bytes: &[u8]) -> Result<()> {
        let entries = archive::list_entries(bytes)?;
        self.manifests.write(&record.name, &entries)
    }
}

/// Write to a sibling temporary file, then rename over the destination
fn store_atomically(dest_path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = dest_path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, dest_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapTransport {
        files: HashMap<String, Vec<u8>>,
        calls: Cell<usize>,
    }

    impl Transport for MapTransport {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| Error::FetchError(format!("404 {}", url)))
        }
    }

    fn tarball() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, "usr/bin/hello", &data[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    fn setup(bytes: Vec<u8>, declared: Option<String>) -> (TempDir, Fetcher<MapTransport>, PackageRecord) {
        let dir = TempDir::new().unwrap();
        let digest = declared.unwrap_or_else(|| DigestClass::Md5.digest(&bytes));
        let mut files = HashMap::new();
        files.insert("http://mirror/x86_64/release/hello/hello.tar".to_string(), bytes);

        let fetcher = Fetcher::new(
            MapTransport {
                files,
                calls: Cell::new(0),
            },
            "http://mirror/".to_string(),
            CacheStore::new(dir.path().join("cache")),
            ManifestStore::new(dir.path().join("setup")),
        );
        let record = PackageRecord {
            name: "hello".to_string(),
            install_path: "x86_64/release/hello/hello.tar".to_string(),
            archive_name: "hello.tar".to_string(),
            digest,
            ..Default::default()
        };
        (dir, fetcher, record)
    }

    #[test]
    fn test_mirror_id_is_deterministic_and_flat() {
        let a = mirror_id("https://mirror.example.com/cygwin/");
        assert_eq!(a, mirror_id("https://mirror.example.com/cygwin/"));
        assert!(!a.contains('/'));
        assert_ne!(a, mirror_id("https://other.example.com/cygwin/"));
    }

    #[test]
    fn test_mirror_url_join() {
        assert_eq!(mirror_url("http://m/", "x/a.tar"), "http://m/x/a.tar");
        assert_eq!(mirror_url("http://m", "/x/a.tar"), "http://m/x/a.tar");
    }

    #[test]
    fn test_fetch_then_reuse_cache() {
        let (_dir, fetcher, record) = setup(tarball(), None);

        let path = fetcher.ensure_cached(&record).unwrap();
        assert!(path.ends_with("x86_64/release/hello/hello.tar"));
        assert!(path.exists());
        assert_eq!(
            fetcher.manifests().read("hello").unwrap(),
            vec!["usr/bin/hello"]
        );
        assert_eq!(fetcher.transport().calls.get(), 1);

        fetcher.ensure_cached(&record).unwrap();
        assert_eq!(fetcher.transport().calls.get(), 1);
    }

    #[test]
    fn test_corrupt_cache_is_refetched() {
        let (_dir, fetcher, record) = setup(tarball(), None);
        let path = fetcher.cache().archive_path(fetcher.mirror(), &record.install_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"garbage").unwrap();

        fetcher.ensure_cached(&record).unwrap();
        assert_eq!(fetcher.transport().calls.get(), 1);
        assert_eq!(fs::read(&path).unwrap(), tarball());
    }

    #[test]
    fn test_mismatch_after_fetch_is_integrity_failure() {
        let (_dir, fetcher, record) = setup(tarball(), Some("0".repeat(32)));

        let err = fetcher.ensure_cached(&record).unwrap_err();
        assert!(matches!(err, Error::IntegrityFailure { ref package, .. } if package == "hello"));
        assert!(!fetcher
            .cache()
            .archive_path(fetcher.mirror(), &record.install_path)
            .exists());
        assert!(!fetcher.manifests().exists("hello"));
    }

    #[test]
    fn test_unknown_digest_length_fails_loudly() {
        let (_dir, fetcher, record) = setup(tarball(), Some("abcd".to_string()));

        assert!(matches!(
            fetcher.ensure_cached(&record),
            Err(Error::UnsupportedDigest { length: 4, .. })
        ));
        assert_eq!(fetcher.transport().calls.get(), 0);
    }

    #[test]
    fn test_file_transport() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blob");
        fs::write(&file, b"bytes").unwrap();

        let client = MirrorClient::new().unwrap();
        let url = format!("file://{}", file.display());
        assert_eq!(client.fetch(&url).unwrap(), b"bytes");
        assert!(matches!(
            client.fetch("file:///nonexistent/blob"),
            Err(Error::FetchError(_))
        ));
    }
}

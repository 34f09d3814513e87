// tests/integration_test.rs

//! Integration tests for Pakt
//!
//! These tests drive whole install/download/remove runs against a
//! `file://` mirror built in a temporary directory.

use flate2::Compression;
use flate2::write::GzEncoder;
use pakt::Error;
use pakt::catalog::CatalogStore;
use pakt::config::{Layout, Settings};
use pakt::install::{self, InstallEngine, InstallOptions, InstallOutcome};
use pakt::ledger::LedgerStore;
use pakt::manifest::ManifestStore;
use pakt::remove::{RemoveEngine, RemoveOutcome};
use pakt::repository::{CacheStore, DigestClass, Fetcher, MirrorClient};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Build a gzip-compressed tarball from (path, contents); paths ending in
/// `/` become directories
fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(0o755);
        } else {
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
        }
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}

struct Package<'a> {
    name: &'a str,
    requires: &'a str,
    files: Vec<(&'a str, &'a str)>,
}

struct Env {
    _dir: TempDir,
    mirror_dir: PathBuf,
    layout: Layout,
    fetcher: Fetcher<MirrorClient>,
    ledger: LedgerStore,
}

impl Env {
    /// Publish `packages` on a local mirror and prepare an empty root
    fn new(packages: &[Package]) -> Self {
        let dir = TempDir::new().unwrap();
        let mirror_dir = dir.path().join("mirror");
        let mut catalog = String::from("release: test\narch: x86_64\nsetup-timestamp: 1700000000\n\n");

        for pkg in packages {
            let bytes = tarball(&pkg.files);
            let rel = format!("x86_64/release/{0}/{0}-1.0-1.tar.gz", pkg.name);
            let dest = mirror_dir.join(&rel);
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(&dest, &bytes).unwrap();
            catalog.push_str(&format!(
                "@ {}\nsdesc: \"{} package\"\ncategory: Test\nrequires: {}\nversion: 1.0-1\ninstall: {} {} {}\n\n",
                pkg.name,
                pkg.name,
                pkg.requires,
                rel,
                bytes.len(),
                DigestClass::Md5.digest(&bytes)
            ));
        }
        fs::create_dir_all(mirror_dir.join("x86_64")).unwrap();
        fs::write(mirror_dir.join("x86_64/setup.ini"), catalog).unwrap();

        let layout = Layout::new(dir.path().join("root"));
        let ledger = LedgerStore::new(layout.ledger_path());
        ledger.init().unwrap();

        let fetcher = Fetcher::new(
            MirrorClient::new().unwrap(),
            format!("file://{}", mirror_dir.display()),
            CacheStore::new(dir.path().join("cache")),
            ManifestStore::new(layout.manifest_dir()),
        );

        Env {
            _dir: dir,
            mirror_dir,
            layout,
            fetcher,
            ledger,
        }
    }

    fn catalog(&self, refresh: bool) -> pakt::Result<CatalogStore> {
        CatalogStore::open(
            self.fetcher.cache(),
            self.fetcher.transport(),
            self.fetcher.mirror(),
            "x86_64",
            refresh,
        )
    }

    fn root(&self) -> &Path {
        self.layout.root()
    }

    fn installed(&self) -> Vec<String> {
        self.ledger
            .load()
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

fn no_scripts() -> InstallOptions {
    InstallOptions {
        no_scripts: true,
        ..Default::default()
    }
}

fn foo_bar() -> Vec<Package<'static>> {
    vec![
        Package {
            name: "foo",
            requires: "bar",
            files: vec![("usr/", ""), ("usr/bin/", ""), ("usr/bin/foo", "foo binary")],
        },
        Package {
            name: "bar",
            requires: "",
            files: vec![("usr/", ""), ("usr/lib/", ""), ("usr/lib/libbar.so", "bar library")],
        },
    ]
}

#[test]
fn test_catalog_requires_refresh_first() {
    let env = Env::new(&foo_bar());
    assert!(matches!(env.catalog(false), Err(Error::CatalogUnavailable(_))));

    let catalog = env.catalog(true).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.header().timestamp().unwrap().timestamp(), 1_700_000_000);

    // The local copy is now used without refreshing
    assert!(env.catalog(false).is_ok());
}

#[test]
fn test_install_pulls_dependencies_in_sorted_ledger() {
    let env = Env::new(&foo_bar());
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());

    let reports = engine.install(&["foo".to_string()]).unwrap();
    assert_eq!(install::exit_code(&reports), 0);

    assert_eq!(
        fs::read_to_string(env.ledger.path()).unwrap(),
        "INSTALLED.DB 3\nbar bar-1.0-1.tar.gz 0\nfoo foo-1.0-1.tar.gz 0\n"
    );
    assert!(env.fetcher.manifests().exists("foo"));
    assert!(env.fetcher.manifests().exists("bar"));
    assert_eq!(
        fs::read_to_string(env.root().join("usr/bin/foo")).unwrap(),
        "foo binary"
    );
    assert!(env.root().join("usr/lib/libbar.so").exists());
    // Backup holds the ledger as it was before the last write
    assert_eq!(
        fs::read_to_string(env.ledger.backup_path()).unwrap(),
        "INSTALLED.DB 3\nfoo foo-1.0-1.tar.gz 0\n"
    );
}

#[test]
fn test_reinstall_is_idempotent() {
    let env = Env::new(&foo_bar());
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());
    engine.install(&["foo".to_string()]).unwrap();

    let before = fs::read(env.ledger.path()).unwrap();
    let reports = engine.install(&["foo".to_string()]).unwrap();
    assert!(matches!(reports[0].result, Ok(InstallOutcome::Skipped)));
    assert_eq!(fs::read(env.ledger.path()).unwrap(), before);
}

#[test]
fn test_tampered_mirror_is_integrity_failure() {
    let env = Env::new(&foo_bar());
    let catalog = env.catalog(true).unwrap();
    fs::write(
        env.mirror_dir.join("x86_64/release/foo/foo-1.0-1.tar.gz"),
        b"tampered",
    )
    .unwrap();
    let before = fs::read(env.ledger.path()).unwrap();

    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());
    let err = engine
        .install(&["foo".to_string(), "bar".to_string()])
        .unwrap_err();

    assert!(matches!(err, Error::IntegrityFailure { ref package, .. } if package == "foo"));
    assert_eq!(err.exit_code(), 3);
    // The run stopped: bar was never reached
    assert_eq!(fs::read(env.ledger.path()).unwrap(), before);
    assert!(!env.root().join("usr/bin/foo").exists());
}

#[test]
fn test_download_only_then_install_from_cache() {
    let env = Env::new(&foo_bar());
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());

    let reports = engine.download(&["bar".to_string()]).unwrap();
    assert!(reports[0].is_ok());
    assert!(env.fetcher.manifests().exists("bar"));
    assert!(env.installed().is_empty());

    // Mirror goes away; the verified cached copy is enough
    fs::remove_dir_all(env.mirror_dir.join("x86_64/release/bar")).unwrap();
    engine.install(&["bar".to_string()]).unwrap();
    assert_eq!(env.installed(), vec!["bar"]);
}

#[test]
fn test_install_then_remove_round_trip() {
    let env = Env::new(&foo_bar());
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());
    engine.install(&["foo".to_string()]).unwrap();

    let manifests = ManifestStore::new(env.layout.manifest_dir());
    let remover = RemoveEngine::new(&env.layout, &env.ledger, &manifests);
    let reports = remover.remove(&["foo".to_string()]).unwrap();
    assert_eq!(
        reports[0].result.as_ref().unwrap(),
        &RemoveOutcome::Removed {
            files: 1,
            directories: 1
        }
    );

    assert!(!env.root().join("usr/bin").exists());
    // usr/ still holds bar's files
    assert!(env.root().join("usr/lib/libbar.so").exists());
    assert_eq!(env.installed(), vec!["bar"]);
    assert!(!manifests.exists("foo"));
}

#[test]
fn test_remove_not_installed_touches_nothing() {
    let env = Env::new(&foo_bar());
    let manifests = ManifestStore::new(env.layout.manifest_dir());
    let before = fs::read(env.ledger.path()).unwrap();

    let remover = RemoveEngine::new(&env.layout, &env.ledger, &manifests);
    let reports = remover.remove(&["foo".to_string()]).unwrap();

    assert_eq!(reports[0].result.as_ref().unwrap(), &RemoveOutcome::NotInstalled);
    assert_eq!(fs::read(env.ledger.path()).unwrap(), before);
    assert!(!env.ledger.backup_path().exists());
}

#[test]
fn test_remove_refuses_essential_files() {
    let env = Env::new(&[
        Package {
            name: "dash",
            requires: "",
            files: vec![("usr/bin/sh", "#!")],
        },
        Package {
            name: "shim",
            requires: "",
            files: vec![("usr/bin/sh", "#! overwritten"), ("usr/bin/shim", "x")],
        },
    ]);
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(&catalog, &env.fetcher, &env.ledger, &env.layout, no_scripts());
    engine
        .install(&["dash".to_string(), "shim".to_string()])
        .unwrap();
    let ledger_before = fs::read(env.ledger.path()).unwrap();

    let manifests = ManifestStore::new(env.layout.manifest_dir());
    let remover = RemoveEngine::new(&env.layout, &env.ledger, &manifests);
    let err = remover.remove(&["shim".to_string()]).unwrap_err();

    assert!(matches!(err, Error::EssentialFileConflict { ref path, .. } if path == "usr/bin/sh"));
    assert_eq!(fs::read(env.ledger.path()).unwrap(), ledger_before);
    assert!(manifests.exists("shim"));
    assert!(env.root().join("usr/bin/shim").exists());
    assert!(env.root().join("usr/bin/sh").exists());
}

#[test]
fn test_postinstall_scripts_run_for_whole_tree() {
    let env = Env::new(&[
        Package {
            name: "app",
            requires: "lib",
            files: vec![("etc/postinstall/app.sh", "echo app >> marks\n")],
        },
        Package {
            name: "lib",
            requires: "",
            files: vec![("etc/postinstall/lib.sh", "echo lib >> marks\n")],
        },
    ]);
    let catalog = env.catalog(true).unwrap();
    let engine = InstallEngine::new(
        &catalog,
        &env.fetcher,
        &env.ledger,
        &env.layout,
        InstallOptions::default(),
    );

    engine.install(&["app".to_string()]).unwrap();
    assert_eq!(fs::read_to_string(env.root().join("marks")).unwrap(), "app\nlib\n");
    assert!(env.root().join("etc/postinstall/app.sh.done").exists());
    assert!(env.root().join("etc/postinstall/lib.sh.done").exists());
}

#[test]
fn test_settings_round_trip_under_root() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path());
    let settings = Settings::for_layout(&layout);
    settings.init().unwrap();

    settings.set_mirror("https://mirror.example.com/").unwrap();
    settings.set_cache_dir(Path::new("/var/cache/pakt")).unwrap();

    assert_eq!(
        settings.get_mirror().unwrap().as_deref(),
        Some("https://mirror.example.com/")
    );
    assert_eq!(
        settings.get_cache_dir().unwrap(),
        Some(PathBuf::from("/var/cache/pakt"))
    );
}

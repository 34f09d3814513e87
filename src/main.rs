// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use pakt::catalog::CatalogStore;
use pakt::config::{Layout, Settings};
use pakt::install::{self, InstallEngine, InstallOptions, InstallOutcome};
use pakt::ledger::LedgerStore;
use pakt::manifest::ManifestStore;
use pakt::remove::{RemoveEngine, RemoveOutcome};
use pakt::repository::{CacheStore, Fetcher, MirrorClient};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Resolved locations shared by the subcommands
struct Session {
    layout: Layout,
    settings: Settings,
    mirror: Option<String>,
    cache: Option<PathBuf>,
    arch: String,
}

impl Session {
    fn new(cli: &Cli) -> Self {
        let layout = Layout::new(&cli.root);
        let settings = Settings::for_layout(&layout);
        Self {
            layout,
            settings,
            mirror: cli.mirror.clone(),
            cache: cli.cache.clone(),
            arch: cli.arch.clone(),
        }
    }

    fn mirror(&self) -> Result<String> {
        match &self.mirror {
            Some(mirror) => Ok(mirror.clone()),
            None => self
                .settings
                .get_mirror()?
                .context("No mirror configured; pass --mirror or run `pakt mirror <url>`"),
        }
    }

    fn cache_store(&self) -> Result<CacheStore> {
        let dir = match &self.cache {
            Some(dir) => dir.clone(),
            None => self
                .settings
                .get_cache_dir()?
                .context("No cache directory configured; pass --cache or run `pakt cache <dir>`")?,
        };
        Ok(CacheStore::new(dir))
    }

    fn ledger(&self) -> LedgerStore {
        LedgerStore::new(self.layout.ledger_path())
    }

    fn manifests(&self) -> ManifestStore {
        ManifestStore::new(self.layout.manifest_dir())
    }

    fn fetcher(&self) -> Result<Fetcher<MirrorClient>> {
        Ok(Fetcher::new(
            MirrorClient::new()?,
            self.mirror()?,
            self.cache_store()?,
            self.manifests(),
        ))
    }

    fn catalog(&self, fetcher: &Fetcher<MirrorClient>, refresh: bool) -> Result<CatalogStore> {
        Ok(CatalogStore::open(
            fetcher.cache(),
            fetcher.transport(),
            fetcher.mirror(),
            &self.arch,
            refresh,
        )?)
    }
}

fn run(cli: Cli) -> Result<i32> {
    let ctx = Session::new(&cli);

    let Some(command) = cli.command else {
        println!("Pakt Package Manager v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'pakt --help' for usage information");
        return Ok(0);
    };

    match command {
        Commands::Init => {
            info!("Initializing {}", ctx.layout.root().display());
            let created_ledger = ctx.ledger().init()?;
            let created_settings = ctx.settings.init()?;
            if !created_ledger && !created_settings {
                println!("Already initialized at {}", ctx.layout.setup_dir().display());
            } else {
                println!("Initialized {}", ctx.layout.setup_dir().display());
            }
            Ok(0)
        }
        Commands::Update => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, true)?;
            println!("Catalog updated: {} packages", catalog.len());
            if let Some(ts) = catalog.header().timestamp() {
                println!("  Timestamp: {}", ts.to_rfc3339());
            }
            Ok(0)
        }
        Commands::Install {
            packages,
            no_deps,
            no_scripts,
            upgrade,
        } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            let ledger = ctx.ledger();
            let options = InstallOptions {
                upgrade,
                no_deps,
                no_scripts,
            };
            let engine = InstallEngine::new(&catalog, &fetcher, &ledger, &ctx.layout, options);
            let reports = engine.install(&packages)?;

            for report in &reports {
                match &report.result {
                    Ok(InstallOutcome::Skipped) => {
                        println!("{}: already installed", report.name)
                    }
                    Ok(InstallOutcome::Installed {
                        archive,
                        dependencies,
                        failed_dependencies,
                    }) => {
                        println!("{}: installed from {}", report.name, archive);
                        for dep in dependencies {
                            println!("  dependency installed: {}", dep);
                        }
                        for failure in failed_dependencies {
                            println!(
                                "  dependency NOT installed: {} (required by {}): {}",
                                failure.name, failure.required_by, failure.reason
                            );
                        }
                    }
                    Err(e) => eprintln!("{}: {}", report.name, e),
                }
            }
            Ok(install::exit_code(&reports))
        }
        Commands::Remove { packages } => {
            let ledger = ctx.ledger();
            let manifests = ctx.manifests();
            let engine = RemoveEngine::new(&ctx.layout, &ledger, &manifests);
            let reports = engine.remove(&packages)?;
            for report in &reports {
                match &report.result {
                    Ok(RemoveOutcome::NotInstalled) => println!("{}: not installed", report.name),
                    Ok(RemoveOutcome::Removed { files, directories }) => println!(
                        "{}: removed ({} files, {} directories)",
                        report.name, files, directories
                    ),
                    Err(e) => eprintln!("{}: {}", report.name, e),
                }
            }
            Ok(install::exit_code(&reports))
        }
        Commands::Download { packages } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            let ledger = ctx.ledger();
            let engine = InstallEngine::new(
                &catalog,
                &fetcher,
                &ledger,
                &ctx.layout,
                InstallOptions::default(),
            );
            let reports = engine.download(&packages)?;
            for report in &reports {
                match &report.result {
                    Ok(path) => println!("{}: {}", report.name, path.display()),
                    Err(e) => eprintln!("{}: {}", report.name, e),
                }
            }
            Ok(install::exit_code(&reports))
        }
        Commands::Show { packages, json } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            let mut status = 0;
            for name in &packages {
                match catalog.resolve(name) {
                    Ok(record) if json => println!("{}", serde_json::to_string_pretty(record)?),
                    Ok(record) => println!("{}\n", record.description),
                    Err(e) => {
                        eprintln!("{}", e);
                        status = e.exit_code();
                    }
                }
            }
            Ok(status)
        }
        Commands::Depends { package } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            for line in catalog.graph().depends(&package) {
                println!("{}", line);
            }
            Ok(0)
        }
        Commands::Rdepends { package } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            for line in catalog.graph().rdepends(&package) {
                println!("{}", line);
            }
            Ok(0)
        }
        Commands::List { pattern } => {
            let ledger = ctx.ledger().load()?;
            for entry in ledger.entries() {
                if pattern.as_deref().is_none_or(|p| entry.name.contains(p)) {
                    println!("{} {}", entry.name, entry.archive);
                }
            }
            Ok(0)
        }
        Commands::Listfiles { packages } => {
            let manifests = ctx.manifests();
            for name in &packages {
                for path in manifests.read(name)? {
                    println!("{}", path);
                }
            }
            Ok(0)
        }
        Commands::Category { pattern } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            for name in catalog.find_by_category(&pattern) {
                println!("{}", name);
            }
            Ok(0)
        }
        Commands::Search { pattern } => {
            let fetcher = ctx.fetcher()?;
            let catalog = ctx.catalog(&fetcher, false)?;
            for name in catalog.search(&pattern) {
                println!("{}", name);
            }
            Ok(0)
        }
        Commands::Owner { path } => {
            let ledger = ctx.ledger().load()?;
            match ctx.manifests().owner_of(&ledger, &path)? {
                Some(owner) => {
                    println!("{}", owner);
                    Ok(0)
                }
                None => {
                    eprintln!("No installed package owns {}", path);
                    Ok(1)
                }
            }
        }
        Commands::Mirror { url } => {
            match url {
                Some(url) => {
                    ctx.settings.set_mirror(&url)?;
                    println!("Mirror set to {}", url);
                }
                None => match ctx.settings.get_mirror()? {
                    Some(mirror) => println!("{}", mirror),
                    None => println!("No mirror configured"),
                },
            }
            Ok(0)
        }
        Commands::Cache { dir } => {
            match dir {
                Some(dir) => {
                    ctx.settings.set_cache_dir(&dir)?;
                    println!("Cache directory set to {}", dir.display());
                }
                None => match ctx.settings.get_cache_dir()? {
                    Some(dir) => println!("{}", dir.display()),
                    None => println!("No cache directory configured"),
                },
            }
            Ok(0)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pakt", &mut std::io::stdout());
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e.downcast_ref::<pakt::Error>().map_or(1, pakt::Error::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

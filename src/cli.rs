// src/cli.rs
//
// Command-line definition, shared with build.rs for the man page.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pakt")]
#[command(author, version, about = "Package manager for setup.ini style mirrors", long_about = None)]
pub struct Cli {
    /// Install root directory
    #[arg(short, long, global = true, env = "PAKT_ROOT", default_value = "/")]
    pub root: PathBuf,

    /// Mirror URL (overrides the persisted setting)
    #[arg(short, long, global = true, env = "PAKT_MIRROR")]
    pub mirror: Option<String>,

    /// Package cache directory (overrides the persisted setting)
    #[arg(short, long, global = true, env = "PAKT_CACHE")]
    pub cache: Option<PathBuf>,

    /// Package architecture
    #[arg(long, global = true, default_value = "x86_64")]
    pub arch: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty ledger and settings file under the root
    Init,
    /// Download a fresh copy of the catalog
    Update,
    /// Install packages and their requirements
    Install {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Do not install required packages
        #[arg(long)]
        no_deps: bool,
        /// Do not run post-install scripts
        #[arg(long)]
        no_scripts: bool,
        /// Reinstall packages that are already installed
        #[arg(short, long)]
        upgrade: bool,
    },
    /// Remove installed packages
    Remove {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Fetch and verify packages into the cache without installing
    Download {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Show catalog records
    Show {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the dependency tree of a package
    Depends {
        /// Package name
        package: String,
    },
    /// Show what requires a package, transitively
    Rdepends {
        /// Package name
        package: String,
    },
    /// List installed packages
    List {
        /// Substring filter on package names
        pattern: Option<String>,
    },
    /// List the files an installed package owns
    Listfiles {
        /// Package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// List catalog packages in a category
    Category {
        /// Category substring
        pattern: String,
    },
    /// Search catalog package names
    Search {
        /// Name substring
        pattern: String,
    },
    /// Find the installed package owning a path
    Owner {
        /// Path relative to the root
        path: String,
    },
    /// Show or set the persisted mirror
    Mirror {
        /// New mirror URL
        url: Option<String>,
    },
    /// Show or set the persisted cache directory
    Cache {
        /// New cache directory
        dir: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

// src/lib.rs

//! Pakt Package Manager
//!
//! Installs and removes packages described by a remote setup.ini style
//! catalog onto a filesystem root, keeping a plain-text ledger of what is
//! installed.
//!
//! # Architecture
//!
//! - Catalog: parsed per run, never mutated; first record and first
//!   `install:` line win
//! - Ledger: sorted text file, backed up before every rewrite
//! - Manifests: one compressed file list per package, written when the
//!   archive is cached
//! - Install is best-effort over dependencies; removal is fail-fast and
//!   refuses to touch files owned by essential tooling

pub mod archive;
pub mod catalog;
pub mod config;
mod error;
pub mod install;
pub mod ledger;
pub mod manifest;
pub mod remove;
pub mod repository;
pub mod scripts;

pub use error::{Error, Result};

// src/scripts.rs

//! Maintainer scripts
//!
//! Post-install scripts are `etc/postinstall/*.sh`; once run they are renamed
//! to `*.sh.done` so they never run again. A package's pre-remove script is
//! `etc/preremove/<name>.sh` and is deleted after it runs.

use crate::config::Layout;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const SCRIPT_SUFFIX: &str = ".sh";
const DONE_SUFFIX: &str = ".done";

/// Post-install scripts that have not run yet, in discovery order
pub fn pending_postinstall(layout: &Layout) -> Result<Vec<PathBuf>> {
    let dir = layout.postinstall_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut scripts = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let is_script = path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(SCRIPT_SUFFIX))
            .unwrap_or(false);
        if is_script && path.is_file() {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// Run every pending post-install script once
///
/// A failing script stops the loop and is reported; scripts that already
/// completed stay marked done.
pub fn run_postinstall(layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut completed = Vec::new();
    for script in pending_postinstall(layout)? {
        run_script(&script, layout.root())?;
        let done = done_marker(&script);
        fs::rename(&script, &done)?;
        completed.push(done);
    }
    if !completed.is_empty() {
        info!("Ran {} post-install script(s)", completed.len());
    }
    Ok(completed)
}

/// Run and delete the pre-remove script of `package`, if it has one
pub fn run_preremove(layout: &Layout, package: &str) -> Result<bool> {
    let script = layout
        .preremove_dir()
        .join(format!("{}{}", package, SCRIPT_SUFFIX));
    if !script.exists() {
        return Ok(false);
    }
    run_script(&script, layout.root())?;
    fs::remove_file(&script)?;
    Ok(true)
}

/// Marker left behind by a completed post-install script of `package`
pub fn postinstall_marker(layout: &Layout, package: &str) -> PathBuf {
    layout
        .postinstall_dir()
        .join(format!("{}{}{}", package, SCRIPT_SUFFIX, DONE_SUFFIX))
}

fn done_marker(script: &Path) -> PathBuf {
    let mut name = script.as_os_str().to_owned();
    name.push(DONE_SUFFIX);
    PathBuf::from(name)
}

fn run_script(script: &Path, root: &Path) -> Result<()> {
    debug!("Running {}", script.display());
    let status = Command::new("sh")
        .arg(script)
        .current_dir(root)
        .status()
        .map_err(|e| Error::ScriptExecutionError {
            script: script.display().to_string(),
            status: e.to_string(),
        })?;

    if !status.success() {
        return Err(Error::ScriptExecutionError {
            script: script.display().to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}

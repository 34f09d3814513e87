// src/archive.rs

//! Package archive handling
//!
//! Archives are tarballs, optionally compressed with gzip, xz, or zstd.
//! Compression is detected from magic bytes rather than the file name.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Package compression format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x1F, 0x8B]) {
            Compression::Gzip
        } else if bytes.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
            Compression::Xz
        } else if bytes.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

fn open_archive(bytes: &[u8]) -> Result<Archive<Box<dyn Read + '_>>> {
    let reader: Box<dyn Read + '_> = match Compression::detect(bytes) {
        Compression::None => Box::new(bytes),
        Compression::Gzip => Box::new(GzDecoder::new(bytes)),
        Compression::Xz => Box::new(XzDecoder::new(bytes)),
        Compression::Zstd => Box::new(
            zstd::Decoder::new(bytes)
                .map_err(|e| Error::ArchiveError(format!("Failed to create zstd decoder: {}", e)))?,
        ),
    };
    Ok(Archive::new(reader))
}

/// Entry paths of an archive, in archive order
///
/// Directory entries keep a trailing `/` so they can be told apart from files.
pub fn list_entries(bytes: &[u8]) -> Result<Vec<String>> {
    let mut archive = open_archive(bytes)?;
    let mut entries = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| Error::ArchiveError(format!("Failed to read archive entries: {}", e)))?
    {
        let entry =
            entry.map_err(|e| Error::ArchiveError(format!("Failed to read archive entry: {}", e)))?;

        let mut path = entry
            .path()
            .map_err(|e| Error::ArchiveError(format!("Failed to get entry path: {}", e)))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();

        if path.is_empty() {
            continue;
        }
        if entry.header().entry_type().is_dir() && !path.ends_with('/') {
            path.push('/');
        }
        entries.push(path);
    }

    debug!("Archive lists {} entries", entries.len());
    Ok(entries)
}

/// Unpack an archive onto `dest`, overwriting whatever is already there
pub fn extract(bytes: &[u8], dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = open_archive(bytes)?;
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| Error::ArchiveError(format!("Failed to extract into {}: {}", dest.display(), e)))?;
    Ok(())
}

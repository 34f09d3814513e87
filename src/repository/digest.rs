// src/repository/digest.rs

//! Archive digests
//!
//! The catalog does not name its checksum algorithm; it is implied by the
//! length of the hex string.

use crate::error::{Error, Result};
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io;
use std::path::Path;

/// Checksum algorithm implied by a declared digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestClass {
    /// 32 hex chars (legacy, not for security)
    Md5,
    /// 64 hex chars
    Sha256,
    /// 128 hex chars
    Sha512,
}

impl DigestClass {
    /// Pick the algorithm for a declared digest of `package`
    pub fn for_declared(package: &str, declared: &str) -> Result<Self> {
        match declared.len() {
            32 => Ok(DigestClass::Md5),
            64 => Ok(DigestClass::Sha256),
            128 => Ok(DigestClass::Sha512),
            length => Err(Error::UnsupportedDigest {
                package: package.to_string(),
                length,
            }),
        }
    }

    /// Lowercase hex digest of `bytes`
    pub fn digest(self, bytes: &[u8]) -> String {
        match self {
            DigestClass::Md5 => hex::encode(Md5::digest(bytes)),
            DigestClass::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestClass::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }

    /// Lowercase hex digest of a file, streamed
    pub fn digest_file(self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let hash = match self {
            DigestClass::Md5 => {
                let mut hasher = Md5::new();
                io::copy(&mut file, &mut hasher)?;
                hex::encode(hasher.finalize())
            }
            DigestClass::Sha256 => {
                let mut hasher = Sha256::new();
                io::copy(&mut file, &mut hasher)?;
                hex::encode(hasher.finalize())
            }
            DigestClass::Sha512 => {
                let mut hasher = Sha512::new();
                io::copy(&mut file, &mut hasher)?;
                hex::encode(hasher.finalize())
            }
        };
        Ok(hash)
    }
}

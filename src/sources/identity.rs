// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Point-in-time file identity: size, identity token and permission bits.
//!
//! The identity token is the inode on unix. Platforms without inodes get a
//! best-effort surrogate (last-modified time in nanoseconds), which is good
//! enough to notice a file being replaced but will also change on writes.

use chrono::{DateTime, Local};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

/// Whether the identity token survives writes (true inode numbers).
pub const STABLE_TOKEN: bool = cfg!(unix);

/// Snapshot of one file's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub identity_token: u64,
    pub permission_bits: u32,
    pub observed_at: DateTime<Local>,
}

impl FileIdentity {
    /// Stat `path` (following symlinks) and capture its identity.
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &meta))
    }

    /// Build an identity from metadata already obtained for `path`.
    pub fn from_metadata(path: &Path, meta: &Metadata) -> Self {
        Self {
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            identity_token: identity_token(meta),
            permission_bits: permission_bits(meta),
            observed_at: Local::now(),
        }
    }

    /// Same underlying file (identity token unchanged).
    pub fn same_file(&self, other: &FileIdentity) -> bool {
        self.identity_token == other.identity_token
    }

    /// Percentage by which `newer` is smaller than `self`, or `None` when it
    /// did not shrink or there was nothing to shrink from.
    pub fn size_drop_percent(&self, newer: &FileIdentity) -> Option<f64> {
        if self.size_bytes == 0 || newer.size_bytes >= self.size_bytes {
            return None;
        }
        let dropped = (self.size_bytes - newer.size_bytes) as f64;
        Some(dropped / self.size_bytes as f64 * 100.0)
    }
}

#[cfg(unix)]
fn identity_token(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn identity_token(meta: &Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o666 }
}

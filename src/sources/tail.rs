// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Rotation-safe log tail reader.
//!
//! [`TailReader`] follows a growing log file starting at its current end.
//! It keeps working across the three things that break a naive tail:
//! - **Rotation**: the path now names a different file (identity token
//!   changed). Remaining complete lines of the old handle are drained, then
//!   the new file is read from offset 0.
//! - **Truncation**: same file, but shorter than what we have already read.
//!   The file is reopened and read from offset 0.
//! - **Transient absence**: the path cannot be stat'ed for a moment during an
//!   atomic rotation. Nothing happens until the next check.
//!
//! EOF is never terminal. Only the cancellation token ends the sequence, and
//! the file handle is released when the reader is dropped.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::identity::{FileIdentity, STABLE_TOKEN};
use crate::core::error::WatchError;

/// A partial line longer than this is dropped rather than buffered forever.
const MAX_PARTIAL_LINE: usize = 1024 * 1024;

/// Timing knobs for [`TailReader`].
#[derive(Debug, Clone, Copy)]
pub struct TailConfig {
    /// Sleep between reads when no new data is available.
    pub poll_interval: Duration,
    /// How often the path is re-stat'ed for rotation/truncation.
    pub rotation_check: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            rotation_check: Duration::from_secs(5),
        }
    }
}

/// Per-file read state: handle, offset, last known identity, partial line.
struct TailCursor {
    reader: BufReader<File>,
    offset: u64,
    identity: FileIdentity,
    partial: Vec<u8>,
}

impl TailCursor {
    /// Open `path` positioned at `start`.
    fn open(path: &Path, start: SeekFrom) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let offset = file.seek(start)?;
        let identity = FileIdentity::from_metadata(path, &file.metadata()?);
        Ok(Self {
            reader: BufReader::new(file),
            offset,
            identity,
            partial: Vec::new(),
        })
    }

    /// Read the next complete line, if one is available right now.
    fn read_line(&mut self, path: &Path) -> Option<String> {
        match self.reader.read_until(b'\n', &mut self.partial) {
            Ok(0) => None,
            Ok(n) => {
                self.offset += n as u64;
                if self.partial.last() == Some(&b'\n') {
                    let raw = std::mem::take(&mut self.partial);
                    return Some(decode_line(&raw));
                }
                if self.partial.len() > MAX_PARTIAL_LINE {
                    warn!(
                        path = %path.display(),
                        bytes = self.partial.len(),
                        "discarding oversized unterminated line"
                    );
                    self.partial.clear();
                }
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "error reading log file");
                None
            }
        }
    }
}

/// Strip the line terminator and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && raw[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Follows one log file, yielding complete lines appended after it was opened.
pub struct TailReader {
    path: PathBuf,
    config: TailConfig,
    cursor: TailCursor,
    /// Lines drained from a rotated-away handle, yielded before new reads.
    pending: VecDeque<String>,
    last_check: Instant,
}

impl TailReader {
    /// Open `path` and position at end-of-file. Existing content is skipped.
    pub fn open(path: &Path, config: TailConfig) -> Result<Self, WatchError> {
        let cursor = TailCursor::open(path, SeekFrom::End(0)).map_err(|source| WatchError::OpenLog {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), offset = cursor.offset, "tailing log file");
        Ok(Self {
            path: path.to_path_buf(),
            config,
            cursor,
            pending: VecDeque::new(),
            last_check: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread byte in the current file.
    #[cfg(test)]
    pub fn offset(&self) -> u64 {
        self.cursor.offset
    }

    /// Wait for the next complete line. Returns `None` only once `cancel`
    /// has fired.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Option<String> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            if let Some(line) = self.cursor.read_line(&self.path) {
                return Some(line);
            }
            if self.last_check.elapsed() >= self.config.rotation_check {
                self.last_check = Instant::now();
                if self.check_rotation() {
                    continue;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Re-stat the path and reopen on rotation or truncation.
    /// Returns true when the cursor was replaced.
    fn check_rotation(&mut self) -> bool {
        let current = match FileIdentity::capture(&self.path) {
            Ok(id) => id,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "log file not statable, retrying next check");
                return false;
            }
        };

        let replaced = !self.cursor.identity.same_file(&current)
            && (STABLE_TOKEN || current.size_bytes < self.cursor.offset);
        if replaced {
            // Lines written to the old file before the rename are still ours.
            while let Some(line) = self.cursor.read_line(&self.path) {
                self.pending.push_back(line);
            }
            if !self.cursor.partial.is_empty() {
                debug!(
                    path = %self.path.display(),
                    bytes = self.cursor.partial.len(),
                    "rotated file ended with an unterminated line"
                );
            }
            return self.reopen("rotated", &current);
        }

        if current.size_bytes < self.cursor.offset {
            return self.reopen("truncated", &current);
        }

        self.cursor.identity = current;
        false
    }

    fn reopen(&mut self, reason: &str, current: &FileIdentity) -> bool {
        match TailCursor::open(&self.path, SeekFrom::Start(0)) {
            Ok(cursor) => {
                info!(
                    path = %self.path.display(),
                    old_token = self.cursor.identity.identity_token,
                    new_token = current.identity_token,
                    "log file {}, reopening from start",
                    reason
                );
                self.cursor = cursor;
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reopen {} log file", reason);
                false
            }
        }
    }
}

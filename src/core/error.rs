// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Setup failures of the detection engine.
//!
//! Everything that happens after the watch loop starts is handled locally
//! (logged, skipped or retried). Only these errors ever reach `main`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot determine hostname")]
    Hostname,

    #[error("cannot open log source {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start log stream `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid classification pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("log stream `{0}` exited unexpectedly")]
    StreamEnded(String),

    #[error("no login watcher available for platform `{0}`")]
    UnsupportedPlatform(String),
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Platform login watchers.
//!
//! Every platform has one [`Watcher`] implementation. The variant is picked
//! once at startup by [`for_platform`]; all variants compile everywhere so
//! their parsing can be tested on any host.

pub mod linux;
pub mod macos;
pub mod windows;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::WatchError;
use crate::core::event::LoginEvent;
use crate::sources::classify::HostContext;
use crate::sources::tail::TailConfig;

pub use linux::LinuxWatcher;
pub use macos::MacosWatcher;
pub use windows::WindowsWatcher;

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Lookback for the historical scan, zero for live events only.
    pub since: Duration,
}

/// Everything a watcher needs to know about the host.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub host: HostContext,
    /// Overrides the platform's default log files when non-empty.
    pub log_paths: Vec<PathBuf>,
    pub tail: TailConfig,
}

/// Produces login events for one platform until cancelled.
#[async_trait]
pub trait Watcher: Send + Sync {
    fn name(&self) -> &str;

    /// Live events only.
    async fn watch(&self, tx: mpsc::Sender<LoginEvent>, cancel: CancellationToken) -> Result<(), WatchError> {
        self.watch_with_history(WatchOptions::default(), tx, cancel).await
    }

    /// Scan the last `opts.since` first, then watch live events.
    async fn watch_with_history(
        &self,
        opts: WatchOptions,
        tx: mpsc::Sender<LoginEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError>;

    /// Files worth integrity monitoring. Empty when the platform log is not
    /// a plain file.
    fn log_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// The watcher for the running OS.
pub fn for_platform(settings: WatcherSettings) -> Result<Box<dyn Watcher>, WatchError> {
    for_os(std::env::consts::OS, settings)
}

pub fn for_os(os: &str, settings: WatcherSettings) -> Result<Box<dyn Watcher>, WatchError> {
    let watcher: Box<dyn Watcher> = match os {
        "linux" => Box::new(LinuxWatcher::new(settings)?),
        "macos" => Box::new(MacosWatcher::new(settings)?),
        "windows" => Box::new(WindowsWatcher::new(settings)?),
        other => return Err(WatchError::UnsupportedPlatform(other.to_string())),
    };
    Ok(watcher)
}

/// Send `event` unless cancelled first. False means the producer should stop.
pub(crate) async fn forward(
    tx: &mpsc::Sender<LoginEvent>,
    event: LoginEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        res = tx.send(event) => res.is_ok(),
    }
}
